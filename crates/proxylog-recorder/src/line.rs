// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The durable JSON line written for each exchange.

use chrono::{DateTime, Utc};
use proxylog_core::{Cost, CostSnapshot, ExchangeRecord, ProxylogError, TokenUsage};
use proxylog_vault::{EncryptedBlob, FieldCodec};
use serde::{Deserialize, Serialize};

/// One exchange as stored on disk, payloads sealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(with = "micros_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub endpoint: String,
    pub method: String,
    pub deployment: String,
    pub request_encrypted: EncryptedBlob,
    #[serde(default)]
    pub response_encrypted: Option<EncryptedBlob>,
    #[serde(default)]
    pub tokens: Option<TokenUsage>,
    pub cost_eur: Cost,
    pub cumulative_cost_eur: Cost,
    pub duration_ms: u64,
    pub stream: bool,
    pub status_code: u16,
    #[serde(default)]
    pub error: Option<String>,
}

impl StoredRecord {
    /// Seal the record's payloads with `codec`.
    pub fn seal(record: ExchangeRecord, codec: &FieldCodec) -> Result<Self, ProxylogError> {
        let request_encrypted = codec.encrypt(&record.request)?;
        let response_encrypted = record
            .response
            .as_deref()
            .map(|body| codec.encrypt(body))
            .transpose()?;

        Ok(Self {
            timestamp: record.timestamp,
            user: record.identity,
            endpoint: record.endpoint,
            method: record.method,
            deployment: record.deployment,
            request_encrypted,
            response_encrypted,
            tokens: record.tokens,
            cost_eur: record.cost,
            cumulative_cost_eur: record.cumulative_cost,
            duration_ms: record.duration_ms,
            stream: record.stream,
            status_code: record.status_code,
            error: record.error,
        })
    }

    /// Serialize as one JSON line, without the trailing newline.
    pub fn to_line(&self) -> Result<String, ProxylogError> {
        serde_json::to_string(self)
            .map_err(|e| ProxylogError::Internal(format!("failed to serialize log line: {e}")))
    }

    pub fn from_line(line: &str) -> Result<Self, ProxylogError> {
        serde_json::from_str(line)
            .map_err(|e| ProxylogError::Codec(format!("invalid log line: {e}")))
    }

    /// The cost-ledger view of this record.
    pub fn cost_snapshot(&self) -> CostSnapshot {
        CostSnapshot {
            timestamp: self.timestamp,
            cumulative: self.cumulative_cost_eur,
        }
    }
}

/// RFC 3339 UTC timestamps with exactly six fractional digits.
pub(crate) mod micros_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::Value;

    use super::*;

    fn codec() -> FieldCodec {
        FieldCodec::new(&[3u8; 32]).unwrap()
    }

    fn record() -> ExchangeRecord {
        let ts = Utc.with_ymd_and_hms(2026, 10, 16, 9, 15, 2).unwrap()
            + chrono::Duration::microseconds(123_456);
        ExchangeRecord::new(
            "alice",
            "/openai/deployments/gpt-4o/chat/completions",
            "gpt-4o",
            br#"{"messages":[{"role":"user","content":"hi"}]}"#.to_vec(),
        )
        .at(ts)
        .with_response(br#"{"choices":[]}"#.to_vec())
        .with_tokens(TokenUsage::new(10, 5))
        .with_cost(Cost::from_micros(123), Cost::from_micros(1_234_567))
        .with_duration_ms(812)
    }

    #[test]
    fn line_matches_wire_schema() {
        let stored = StoredRecord::seal(record(), &codec()).unwrap();
        let value: Value = serde_json::from_str(&stored.to_line().unwrap()).unwrap();

        assert_eq!(value["timestamp"], "2026-10-16T09:15:02.123456Z");
        assert_eq!(value["user"], "alice");
        assert_eq!(value["method"], "POST");
        assert_eq!(value["deployment"], "gpt-4o");
        assert!(value["request_encrypted"].as_str().unwrap().starts_with("$enc:"));
        assert!(value["response_encrypted"].as_str().unwrap().starts_with("$enc:"));
        assert_eq!(value["tokens"]["prompt"], 10);
        assert_eq!(value["tokens"]["completion"], 5);
        assert_eq!(value["tokens"]["total"], 15);
        assert_eq!(value["cost_eur"], 0.000123);
        assert_eq!(value["cumulative_cost_eur"], 1.234567);
        assert_eq!(value["duration_ms"], 812);
        assert_eq!(value["stream"], false);
        assert_eq!(value["status_code"], 200);
        assert!(value["error"].is_null());
    }

    #[test]
    fn payloads_decrypt_back() {
        let codec = codec();
        let original = record();
        let stored = StoredRecord::seal(original.clone(), &codec).unwrap();
        assert_eq!(codec.decrypt(&stored.request_encrypted).unwrap(), original.request);
        assert_eq!(
            codec.decrypt(stored.response_encrypted.as_ref().unwrap()).unwrap(),
            original.response.unwrap()
        );
    }

    #[test]
    fn absent_response_serializes_as_null() {
        let mut rec = record();
        rec.response = None;
        let line = StoredRecord::seal(rec, &codec()).unwrap().to_line().unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert!(value["response_encrypted"].is_null());
    }

    #[test]
    fn line_parses_back_with_snapshot() {
        let stored = StoredRecord::seal(record(), &codec()).unwrap();
        let parsed = StoredRecord::from_line(&stored.to_line().unwrap()).unwrap();
        assert_eq!(parsed, stored);
        let snapshot = parsed.cost_snapshot();
        assert_eq!(snapshot.cumulative, Cost::from_micros(1_234_567));
        assert_eq!(snapshot.date(), chrono::NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
    }

    #[test]
    fn offset_timestamps_are_accepted() {
        let stored = StoredRecord::seal(record(), &codec()).unwrap();
        let mut value: Value = serde_json::from_str(&stored.to_line().unwrap()).unwrap();
        value["timestamp"] = Value::from("2026-10-16T09:15:02.123456+00:00");
        let parsed = StoredRecord::from_line(&value.to_string()).unwrap();
        assert_eq!(parsed.timestamp, stored.timestamp);
    }

    #[test]
    fn garbage_line_is_codec_error() {
        assert!(matches!(
            StoredRecord::from_line("{\"timestamp\": 3"),
            Err(ProxylogError::Codec(_))
        ));
    }
}
