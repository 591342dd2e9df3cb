// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for proxylog integration tests.
//!
//! # Components
//!
//! - [`TestHarness`] - an [`ExchangeContext`](proxylog_exchange::ExchangeContext)
//!   over a temporary log root, plus helpers to read back what it wrote
//! - [`fixtures`] - canned request, response and SSE bodies

pub mod fixtures;
pub mod harness;

pub use harness::{TestHarness, TestHarnessBuilder};
