// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` opens a real [`ExchangeContext`] over a temporary log root.
//! Tests drive exchanges through `harness.context`, then flush and read the
//! resulting JSONL back with [`TestHarness::read_log`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use proxylog_config::model::{AgentConfig, LimitsConfig, LoggingConfig, PricingTier};
use proxylog_config::ProxylogConfig;
use proxylog_core::ProxylogError;
use proxylog_exchange::ExchangeContext;
use proxylog_recorder::StoredRecord;
use proxylog_vault::EncryptedBlob;
use serde_json::Value;

use crate::fixtures::{TEST_DEPLOYMENT, TEST_KEY};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    identity: String,
    daily_cap_eur: f64,
    batch_size: usize,
    batch_timeout_ms: u64,
    queue_capacity: usize,
    pricing: BTreeMap<String, PricingTier>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut pricing = BTreeMap::new();
        pricing.insert(
            TEST_DEPLOYMENT.to_string(),
            PricingTier {
                input: 0.0025,
                output: 0.01,
            },
        );
        Self {
            identity: "test-user".to_string(),
            daily_cap_eur: 5.0,
            batch_size: 10,
            batch_timeout_ms: 50,
            queue_capacity: 1024,
            pricing,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Set the daily cost cap in EUR.
    pub fn with_cap(mut self, daily_cap_eur: f64) -> Self {
        self.daily_cap_eur = daily_cap_eur;
        self
    }

    pub fn with_batching(mut self, batch_size: usize, batch_timeout_ms: u64) -> Self {
        self.batch_size = batch_size;
        self.batch_timeout_ms = batch_timeout_ms;
        self
    }

    /// Price a deployment in EUR per 1000 prompt/completion tokens.
    pub fn with_price(mut self, deployment: impl Into<String>, input: f64, output: f64) -> Self {
        self.pricing
            .insert(deployment.into(), PricingTier { input, output });
        self
    }

    /// Build the harness and open its exchange context.
    pub async fn build(self) -> Result<TestHarness, ProxylogError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ProxylogError::Storage { source: e.into() })?;

        let config = ProxylogConfig {
            agent: AgentConfig {
                identity: Some(self.identity),
                ..AgentConfig::default()
            },
            logging: LoggingConfig {
                directory: temp_dir.path().display().to_string(),
                encryption_key: Some(TEST_KEY.to_string()),
                batch_size: self.batch_size,
                batch_timeout_ms: self.batch_timeout_ms,
                queue_capacity: self.queue_capacity,
                ..LoggingConfig::default()
            },
            limits: LimitsConfig {
                daily_cost_cap_eur: self.daily_cap_eur,
            },
            pricing: self.pricing,
        };

        let context = Arc::new(ExchangeContext::open(&config).await?);
        Ok(TestHarness {
            context,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A live exchange context writing into a temporary directory.
pub struct TestHarness {
    /// The context under test.
    pub context: Arc<ExchangeContext>,
    /// Configuration the context was opened with.
    pub config: ProxylogConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Simulate a restart: flush and stop the current context, then open a
    /// fresh one over the same log root and configuration.
    pub async fn restart(self) -> Result<TestHarness, ProxylogError> {
        self.context.shutdown().await?;
        let context = Arc::new(ExchangeContext::open(&self.config).await?);
        Ok(TestHarness {
            context,
            config: self.config,
            _temp_dir: self._temp_dir,
        })
    }

    /// Flush every queued record to disk. The recorder is stopped afterwards,
    /// so later exchanges are counted as dropped.
    pub async fn flush(&self) -> Result<(), ProxylogError> {
        self.context.shutdown().await
    }

    /// Records in the harness identity's file for `date`, in file order.
    pub async fn read_log_for(&self, date: NaiveDate) -> Result<Vec<StoredRecord>, ProxylogError> {
        let path = self
            .context
            .layout()
            .path_for(self.context.identity(), date);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ProxylogError::Storage { source: e.into() }),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(StoredRecord::from_line)
            .collect()
    }

    /// Records in today's file.
    pub async fn read_log(&self) -> Result<Vec<StoredRecord>, ProxylogError> {
        self.read_log_for(Utc::now().date_naive()).await
    }

    /// Decrypt a sealed payload into JSON (or a JSON string for plain text).
    pub fn open_payload(&self, blob: &EncryptedBlob) -> Result<Value, ProxylogError> {
        Ok(self.context.codec().decrypt_field(blob)?.into_value())
    }
}
