// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `proxylog decrypt` command implementation.
//!
//! Rewrites a JSONL log with selected `*_encrypted` fields replaced by their
//! plaintext (`request_encrypted` becomes `request`). Decrypted payloads are
//! embedded as JSON when they parse, as strings otherwise. Lines that are not
//! JSON objects are passed through unchanged; every problem is reported as a
//! warning and counted, never fatal.

use std::fs;
use std::io::Write;
use std::path::Path;

use proxylog_core::ProxylogError;
use proxylog_vault::{EncryptedBlob, FieldCodec};
use serde_json::{Map, Value};
use tracing::warn;

/// Fields decrypted when none are named on the command line.
pub const DEFAULT_FIELDS: [&str; 2] = ["request_encrypted", "response_encrypted"];

/// Totals for one decrypt run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecryptReport {
    /// Non-blank lines written.
    pub lines: usize,
    /// Lines passed through or fields left encrypted.
    pub warnings: usize,
}

/// Decrypt `input` and write the result to `output`, or stdout if `None`.
pub fn run_decrypt(
    input: &Path,
    output: Option<&Path>,
    codec: &FieldCodec,
    fields: &[String],
) -> Result<DecryptReport, ProxylogError> {
    let contents = fs::read_to_string(input).map_err(|e| ProxylogError::Storage {
        source: format!("failed to read {}: {e}", input.display()).into(),
    })?;

    let (lines, report) = decrypt_lines(&contents, codec, fields);
    let mut rendered = lines.join("\n");
    rendered.push('\n');

    match output {
        Some(path) => {
            fs::write(path, rendered).map_err(|e| ProxylogError::Storage {
                source: format!("failed to write {}: {e}", path.display()).into(),
            })?;
            eprintln!("Decrypted {} entries to {}", report.lines, path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(rendered.as_bytes())
                .map_err(|e| ProxylogError::Storage { source: e.into() })?;
        }
    }

    if report.warnings > 0 {
        eprintln!("Completed with {} warnings", report.warnings);
    }
    Ok(report)
}

/// Decrypt every non-blank line of a log.
pub fn decrypt_lines(
    contents: &str,
    codec: &FieldCodec,
    fields: &[String],
) -> (Vec<String>, DecryptReport) {
    let mut report = DecryptReport::default();
    let mut lines = Vec::new();

    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (rendered, warnings) = decrypt_line(line, index + 1, codec, fields);
        lines.push(rendered);
        report.lines += 1;
        report.warnings += warnings;
    }
    (lines, report)
}

/// Decrypt one line. Returns the rewritten line and its warning count.
fn decrypt_line(
    line: &str,
    line_no: usize,
    codec: &FieldCodec,
    fields: &[String],
) -> (String, usize) {
    let mut entry: Map<String, Value> = match serde_json::from_str(line) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(line = line_no, error = %e, "not a JSON object, passing through");
            return (line.to_string(), 1);
        }
    };

    let mut warnings = 0;
    for field in fields {
        let decrypted = match entry.get(field.as_str()) {
            Some(Value::String(raw)) if EncryptedBlob::is_encrypted(raw) => {
                EncryptedBlob::parse(raw.as_str()).and_then(|blob| codec.decrypt_field(&blob))
            }
            _ => continue,
        };
        match decrypted {
            Ok(value) => {
                entry.remove(field.as_str());
                entry.insert(plaintext_name(field), value.into_value());
            }
            Err(e) => {
                warn!(line = line_no, field = %field, error = %e, "failed to decrypt field");
                warnings += 1;
            }
        }
    }

    (Value::Object(entry).to_string(), warnings)
}

fn plaintext_name(field: &str) -> String {
    field.strip_suffix("_encrypted").unwrap_or(field).to_string()
}
