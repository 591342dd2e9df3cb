// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for proxylog.

use thiserror::Error;

/// The primary error type used across the proxylog crates.
#[derive(Debug, Error)]
pub enum ProxylogError {
    /// Configuration errors (wrong-length key, invalid cap). Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// AEAD tag mismatch while opening an encrypted field.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Malformed encrypted field or compression failure.
    #[error("codec error: {0}")]
    Codec(String),

    /// Durable storage errors (file creation, append, read).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Background recorder lifecycle errors (task stopped, join failure).
    #[error("recorder error: {0}")]
    Recorder(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
