// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for proxylog.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Top-level proxylog configuration.
///
/// Every section is optional. Note that `logging.encryption_key` has no
/// default, so a config without it loads but fails validation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProxylogConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Durable exchange log settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Spending limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Per-model prices, keyed by model or deployment name.
    #[serde(default)]
    pub pricing: BTreeMap<String, PricingTier>,
}

/// Process-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Identity used to partition log files. Defaults to the OS user name.
    #[serde(default)]
    pub identity: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            identity: None,
        }
    }
}

impl AgentConfig {
    /// Resolve the identity: configured value, then `$USER`/`$USERNAME`,
    /// then `unknown`.
    pub fn resolved_identity(&self) -> String {
        self.identity
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| std::env::var("USER").ok().filter(|s| !s.is_empty()))
            .or_else(|| std::env::var("USERNAME").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Compression applied to payloads before encryption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Compression {
    /// gzip when it pays off (payloads of 100 bytes or more that shrink).
    #[default]
    Gzip,
    /// Never compress.
    None,
}

/// Durable exchange log configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Root directory for `<YYYYMMDD>/<identity>_<YYYYMMDD>.jsonl` files.
    #[serde(default = "default_directory")]
    pub directory: String,

    /// Base64-encoded 32-byte AES-256 key. Required.
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// Payload compression mode.
    #[serde(default)]
    pub compression: Compression,

    /// Maximum records per batch write.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum wait after the first record of a batch before flushing.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,

    /// Maximum records held in memory awaiting write. Extra records are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl LoggingConfig {
    /// Batch timeout as a `Duration`.
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            encryption_key: None,
            compression: Compression::default(),
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

// Hand-written so the key never reaches a log line.
impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("directory", &self.directory)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("compression", &self.compression)
            .field("batch_size", &self.batch_size)
            .field("batch_timeout_ms", &self.batch_timeout_ms)
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

fn default_directory() -> String {
    "logs".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_timeout_ms() -> u64 {
    1000
}

fn default_queue_capacity() -> usize {
    4096
}

/// Spending limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Daily spending cap in EUR. Resets at UTC midnight.
    #[serde(default = "default_daily_cost_cap_eur")]
    pub daily_cost_cap_eur: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            daily_cost_cap_eur: default_daily_cost_cap_eur(),
        }
    }
}

fn default_daily_cost_cap_eur() -> f64 {
    5.0
}

/// Price of one model in EUR per 1000 tokens.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PricingTier {
    /// Price per 1000 prompt tokens.
    pub input: f64,
    /// Price per 1000 completion tokens.
    #[serde(default)]
    pub output: f64,
}
