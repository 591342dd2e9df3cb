// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for proxylog.
//!
//! Holds the types every other crate in the workspace agrees on: the error
//! enum, the fixed-point [`Cost`] amount, token counts, and the
//! [`ExchangeRecord`] produced for every proxied exchange.

pub mod cost;
pub mod error;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use cost::Cost;
pub use error::ProxylogError;
pub use types::{CostSnapshot, ExchangeRecord, TokenUsage};
