// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exchange records and token counts shared across the workspace.

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::Cost;

/// Token counts reported by the upstream API for one exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt (input) tokens.
    pub prompt: u64,
    /// Completion (output) tokens. Zero for embeddings.
    pub completion: u64,
    /// Total tokens as reported upstream.
    pub total: u64,
}

impl TokenUsage {
    /// Build a usage whose total is the sum of prompt and completion.
    pub fn new(prompt: u64, completion: u64) -> Self {
        Self {
            prompt,
            completion,
            total: prompt.saturating_add(completion),
        }
    }
}

/// The cumulative-spend snapshot carried by a durable record.
///
/// This is all the cost ledger needs from history to seed itself at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostSnapshot {
    /// When the record carrying the snapshot was produced.
    pub timestamp: DateTime<Utc>,
    /// Cumulative spend for that UTC day at write time.
    pub cumulative: Cost,
}

impl CostSnapshot {
    /// UTC calendar date of the snapshot.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// One finished proxied exchange, ready to be recorded.
///
/// Payloads are held in plaintext here; they are sealed by the recorder's
/// writer task when the record is serialized. A record is moved into the
/// recorder on write and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRecord {
    /// UTC time the exchange started, truncated to microseconds.
    pub timestamp: DateTime<Utc>,
    /// Resolved caller identity; partitions the durable files.
    pub identity: String,
    /// Request path, e.g. `/openai/deployments/gpt-4o/chat/completions`.
    pub endpoint: String,
    /// HTTP method of the proxied request.
    pub method: String,
    /// Model or deployment name.
    pub deployment: String,
    /// Raw request body.
    pub request: Vec<u8>,
    /// Response body. `None` for payloads deliberately excluded (embeddings).
    pub response: Option<Vec<u8>>,
    /// Token counts, when the upstream reported them.
    pub tokens: Option<TokenUsage>,
    /// Cost of this exchange.
    pub cost: Cost,
    /// Cumulative spend for the day after this exchange was added.
    pub cumulative_cost: Cost,
    /// Wall time from admission to completion.
    pub duration_ms: u64,
    /// Whether the response was streamed.
    pub stream: bool,
    /// HTTP status returned to the client.
    pub status_code: u16,
    /// Error description (upstream failure, interrupted stream).
    pub error: Option<String>,
}

impl ExchangeRecord {
    /// Start a record for a `POST` exchange timestamped now.
    pub fn new(
        identity: impl Into<String>,
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        request: Vec<u8>,
    ) -> Self {
        Self {
            timestamp: Utc::now().trunc_subsecs(6),
            identity: identity.into(),
            endpoint: endpoint.into(),
            method: "POST".to_string(),
            deployment: deployment.into(),
            request,
            response: None,
            tokens: None,
            cost: Cost::ZERO,
            cumulative_cost: Cost::ZERO,
            duration_ms: 0,
            stream: false,
            status_code: 200,
            error: None,
        }
    }

    /// Override the timestamp (truncated to microseconds).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(6);
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_response(mut self, response: Vec<u8>) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_tokens(mut self, tokens: TokenUsage) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Set this exchange's cost and the cumulative total it produced.
    pub fn with_cost(mut self, cost: Cost, cumulative_cost: Cost) -> Self {
        self.cost = cost;
        self.cumulative_cost = cumulative_cost;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// UTC calendar date the record belongs to.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// The cumulative-spend snapshot carried by this record.
    pub fn cost_snapshot(&self) -> CostSnapshot {
        CostSnapshot {
            timestamp: self.timestamp,
            cumulative: self.cumulative_cost,
        }
    }
}
