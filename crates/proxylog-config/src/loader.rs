// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./proxylog.toml` > `~/.config/proxylog/proxylog.toml`
//! > `/etc/proxylog/proxylog.toml`, with environment variable overrides via the
//! `PROXYLOG_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ProxylogConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/proxylog/proxylog.toml`
/// 3. `~/.config/proxylog/proxylog.toml`
/// 4. `./proxylog.toml`
/// 5. `PROXYLOG_*` environment variables
pub fn load_config() -> Result<ProxylogConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<ProxylogConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ProxylogConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ProxylogConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ProxylogConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for the XDG lookup, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ProxylogConfig::default()))
        .merge(Toml::file("/etc/proxylog/proxylog.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("proxylog/proxylog.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("proxylog.toml"))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `PROXYLOG_LOGGING_ENCRYPTION_KEY` must map to
/// `logging.encryption_key`, not `logging.encryption.key`. Keys reach the
/// mapper in their original (upper) case, so they are lowercased first.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("PROXYLOG_").map(|key| {
        let key_str = key.as_str().to_ascii_lowercase();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("logging_", "logging.", 1)
            .replacen("limits_", "limits.", 1);
        mapped.into()
    })
}
