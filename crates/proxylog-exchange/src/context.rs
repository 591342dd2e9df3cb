// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The process-wide exchange context.
//!
//! One `ExchangeContext` is built at startup and shared (`Arc`) with every
//! request task. A request task:
//!
//! 1. calls [`admit`](ExchangeContext::admit) and answers `429` with
//!    [`CapDecision::error_body`] when it is blocked;
//! 2. forwards the call upstream;
//! 3. hands the result to [`complete`](ExchangeContext::complete) or, for a
//!    streamed call, its [`StreamBuffer`] to
//!    [`complete_stream`](ExchangeContext::complete_stream).
//!
//! Completion prices the tokens, adds the cost to the ledger and enqueues the
//! record. It never fails the request: recording is best-effort.

use std::sync::Arc;

use chrono::Utc;
use proxylog_config::ProxylogConfig;
use proxylog_core::{Cost, ProxylogError};
use proxylog_cost::{CapDecision, CostLedger, PriceTable};
use proxylog_recorder::{BatchRecorder, LogLayout, RecorderSettings, last_record_for_date};
use proxylog_stream::StreamBuffer;
use proxylog_vault::FieldCodec;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::pending::{Completion, PendingExchange};

/// Shared state for accounting and recording exchanges.
#[derive(Debug)]
pub struct ExchangeContext {
    identity: String,
    codec: Arc<FieldCodec>,
    ledger: CostLedger,
    prices: PriceTable,
    recorder: BatchRecorder,
    layout: LogLayout,
}

impl ExchangeContext {
    /// Build every component from configuration and start the recorder.
    ///
    /// Today's spend is recovered from the last line of today's log file for
    /// the resolved identity. Must be called inside a Tokio runtime.
    pub async fn open(config: &ProxylogConfig) -> Result<Self, ProxylogError> {
        let codec = Arc::new(FieldCodec::from_config(&config.logging)?);
        let ledger = CostLedger::from_config(&config.limits)?;
        let prices = PriceTable::from_config(&config.pricing)?;
        let layout = LogLayout::new(&config.logging.directory);
        let identity = config.agent.resolved_identity();

        let snapshot = {
            let layout = layout.clone();
            let identity = identity.clone();
            tokio::task::spawn_blocking(move || {
                last_record_for_date(&layout, &identity, Utc::now().date_naive())
            })
            .await
            .map_err(|e| ProxylogError::Internal(format!("history lookup failed: {e}")))?
        };
        let recovered = ledger.restore(snapshot).await;

        proxylog_recorder::telemetry::register_metrics();
        let recorder = BatchRecorder::start(
            RecorderSettings::from_config(&config.logging),
            Arc::clone(&codec),
            layout.clone(),
        );

        info!(
            identity = %identity,
            recovered = %recovered,
            cap = %ledger.cap(),
            priced_models = prices.len(),
            "exchange context ready"
        );

        Ok(Self {
            identity,
            codec,
            ledger,
            prices,
            recorder,
            layout,
        })
    }

    /// Check the daily cap before forwarding a call upstream.
    pub async fn admit(&self) -> CapDecision {
        self.ledger.check_cap().await
    }

    /// Account for and record a non-streamed exchange. Returns its cost.
    ///
    /// Only a `200` whose body parses as JSON is priced. Any other status is
    /// recorded with an `HTTP <status>` error and no response body.
    pub async fn complete(&self, completion: Completion) -> Cost {
        let Completion {
            exchange,
            status_code,
            response,
        } = completion;
        let kind = exchange.kind();
        let deployment = exchange.deployment().to_string();
        let record = exchange.into_record(&self.identity).with_status(status_code);

        if status_code != 200 {
            let current = self.ledger.current_cost().await;
            debug!(status_code, deployment = %deployment, "upstream call failed");
            self.recorder.write(
                record
                    .with_cost(Cost::ZERO, current)
                    .with_error(format!("HTTP {status_code}")),
            );
            return Cost::ZERO;
        }

        let body: Value = match serde_json::from_slice(&response) {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    deployment = %deployment,
                    error = %e,
                    "failed to parse upstream response for cost tracking"
                );
                let current = self.ledger.current_cost().await;
                let record = record.with_cost(Cost::ZERO, current);
                let record = if kind.records_response() {
                    record.with_response(response)
                } else {
                    record
                };
                self.recorder.write(record);
                return Cost::ZERO;
            }
        };

        let usage = kind.usage_from(&body);
        let cost = self.prices.cost_for(&deployment, &usage);
        let cumulative = self.ledger.add_cost(cost).await;

        let record = record.with_tokens(usage).with_cost(cost, cumulative);
        let record = if kind.records_response() {
            record.with_response(response)
        } else {
            record
        };
        self.recorder.write(record);
        cost
    }

    /// Account for and record a streamed exchange. Returns its cost.
    ///
    /// The buffer is finalized here; whatever usage it carries is charged
    /// even when the stream was cut short. A stream that ended with an error
    /// is recorded with status `500` and that error.
    pub async fn complete_stream(&self, exchange: PendingExchange, buffer: StreamBuffer) -> Cost {
        let outcome = buffer.finalize();
        let cost = self.prices.cost_for(exchange.deployment(), &outcome.usage);
        let cumulative = self.ledger.add_cost(cost).await;

        let status_code = if outcome.error.is_some() { 500 } else { 200 };
        let mut record = exchange
            .into_record(&self.identity)
            .with_response(outcome.response_bytes())
            .with_tokens(outcome.usage)
            .with_cost(cost, cumulative)
            .with_stream(true)
            .with_status(status_code);
        if let Some(error) = outcome.error {
            debug!(error = %error, "stream finished with error");
            record = record.with_error(error);
        }

        self.recorder.write(record);
        cost
    }

    /// Today's spend so far.
    pub async fn current_cost(&self) -> Cost {
        self.ledger.current_cost().await
    }

    /// Flush every queued record and stop the recorder.
    pub async fn shutdown(&self) -> Result<(), ProxylogError> {
        self.recorder.stop().await?;
        info!(total = %self.ledger.current_cost().await, "exchange context shut down");
        Ok(())
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn codec(&self) -> &FieldCodec {
        &self.codec
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    pub fn recorder(&self) -> &BatchRecorder {
        &self.recorder
    }

    pub fn layout(&self) -> &LogLayout {
        &self.layout
    }
}
