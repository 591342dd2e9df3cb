// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks the constraints serde cannot express: the encryption key decodes to
//! exactly 32 bytes, the cap and prices are finite and non-negative, and the
//! batching parameters are coherent. A config that fails here must not serve
//! traffic.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use zeroize::Zeroize;

use crate::diagnostic::ConfigError;
use crate::model::ProxylogConfig;

/// Required length of the AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &ProxylogConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    match config.logging.encryption_key.as_deref().map(str::trim) {
        None | Some("") => errors.push(ConfigError::Validation {
            message: "logging.encryption_key is required (generate one with `proxylog keygen`)"
                .to_string(),
        }),
        Some(encoded) => {
            if let Err(message) = check_key(encoded) {
                errors.push(ConfigError::Validation { message });
            }
        }
    }

    if config.logging.directory.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "logging.directory must not be empty".to_string(),
        });
    }

    if config.logging.batch_size < 1 {
        errors.push(ConfigError::Validation {
            message: "logging.batch_size must be at least 1".to_string(),
        });
    }

    if config.logging.batch_timeout_ms < 1 {
        errors.push(ConfigError::Validation {
            message: "logging.batch_timeout_ms must be at least 1".to_string(),
        });
    }

    if config.logging.queue_capacity < config.logging.batch_size {
        errors.push(ConfigError::Validation {
            message: format!(
                "logging.queue_capacity ({}) must be at least logging.batch_size ({})",
                config.logging.queue_capacity, config.logging.batch_size
            ),
        });
    }

    let cap = config.limits.daily_cost_cap_eur;
    if !cap.is_finite() || cap < 0.0 {
        errors.push(ConfigError::Validation {
            message: format!("limits.daily_cost_cap_eur must be a non-negative number, got {cap}"),
        });
    }

    for (model, tier) in &config.pricing {
        for (side, price) in [("input", tier.input), ("output", tier.output)] {
            if !price.is_finite() || price < 0.0 {
                errors.push(ConfigError::Validation {
                    message: format!(
                        "pricing.{model}.{side} must be a non-negative number, got {price}"
                    ),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check that `encoded` is base64 for exactly [`KEY_LEN`] bytes.
fn check_key(encoded: &str) -> Result<(), String> {
    let mut bytes = STANDARD
        .decode(encoded)
        .map_err(|e| format!("logging.encryption_key must be valid base64: {e}"))?;
    let len = bytes.len();
    bytes.zeroize();
    if len != KEY_LEN {
        return Err(format!(
            "logging.encryption_key must decode to exactly {KEY_LEN} bytes (got {len})"
        ));
    }
    Ok(())
}
