// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost tracking for the proxylog exchange pipeline.
//!
//! This crate provides:
//! - **Cost ledger**: today's cumulative spend under one lock, with lazy UTC
//!   rollover and a strict `>=` daily cap check
//! - **Pricing**: per-deployment EUR prices and token-count extraction from
//!   upstream response bodies

pub mod ledger;
pub mod pricing;

pub use ledger::{seconds_until_reset, CapDecision, CostLedger};
pub use pricing::{
    calculate_cost, extract_embedding_tokens, extract_token_counts, ModelPrice, PriceTable,
};
