// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An exchange from the moment it is admitted until its response is known.

use std::time::Instant;

use chrono::{DateTime, Utc};
use proxylog_core::{ExchangeRecord, TokenUsage};
use proxylog_cost::{extract_embedding_tokens, extract_token_counts};
use serde_json::Value;
use strum::{Display, EnumString};

/// The upstream API family an exchange belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ExchangeKind {
    ChatCompletions,
    Responses,
    Embeddings,
}

impl ExchangeKind {
    /// Whether the response body is stored. Embedding vectors are large and
    /// carry nothing worth auditing, so only their request is kept.
    pub fn records_response(self) -> bool {
        !matches!(self, ExchangeKind::Embeddings)
    }

    /// Token counts from a successful (non-streamed) response body.
    pub fn usage_from(self, body: &Value) -> TokenUsage {
        match self {
            ExchangeKind::Embeddings => extract_embedding_tokens(body),
            ExchangeKind::ChatCompletions | ExchangeKind::Responses => extract_token_counts(body),
        }
    }
}

/// An admitted exchange awaiting its upstream response.
///
/// Created right after [`admit`](crate::ExchangeContext::admit) allows the
/// call; the start time becomes the record's timestamp.
#[derive(Debug, Clone)]
pub struct PendingExchange {
    kind: ExchangeKind,
    endpoint: String,
    deployment: String,
    method: String,
    request: Vec<u8>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl PendingExchange {
    pub fn new(
        kind: ExchangeKind,
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        request: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            deployment: deployment.into(),
            method: "POST".to_string(),
            request: request.into(),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn kind(&self) -> ExchangeKind {
        self.kind
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Milliseconds since the exchange was admitted.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Attach the upstream status and body.
    pub fn finish(self, status_code: u16, response: impl Into<Vec<u8>>) -> Completion {
        Completion {
            exchange: self,
            status_code,
            response: response.into(),
        }
    }

    /// Start the durable record, stamped with the admission time.
    pub(crate) fn into_record(self, identity: &str) -> ExchangeRecord {
        let duration_ms = self.elapsed_ms();
        ExchangeRecord::new(identity, self.endpoint, self.deployment, self.request)
            .at(self.started_at)
            .with_method(self.method)
            .with_duration_ms(duration_ms)
    }
}

/// A non-streamed exchange with its upstream response.
#[derive(Debug, Clone)]
pub struct Completion {
    pub exchange: PendingExchange,
    pub status_code: u16,
    pub response: Vec<u8>,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}
