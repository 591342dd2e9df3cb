// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exchange accounting for proxylog.
//!
//! Ties the cost ledger, price table, field codec and batch recorder together
//! behind [`ExchangeContext`], the single object an HTTP layer needs to
//! enforce the daily cap and record every proxied exchange.

pub mod context;
pub mod pending;

pub use context::ExchangeContext;
pub use pending::{Completion, ExchangeKind, PendingExchange};

// Re-exported so callers can drive a context without naming every crate.
pub use proxylog_cost::CapDecision;
pub use proxylog_stream::StreamBuffer;
