// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Field-level encryption with optional compression.
//!
//! `encrypt`: compress when the payload is at least [`COMPRESSION_THRESHOLD`]
//! bytes and gzip output is strictly smaller, then seal under a fresh nonce.
//! `decrypt`: authenticate first, then decompress if flag bit 0 is set.
//!
//! The flags byte is passed to GCM as associated data, so flipping the
//! compression bit fails authentication like any other tampered byte.

use std::io::{Read, Write};

use flate2::Compression as GzLevel;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use proxylog_config::model::{Compression, LoggingConfig};
use proxylog_core::ProxylogError;
use serde_json::Value;

use crate::blob::{EncryptedBlob, FLAG_COMPRESSED};
use crate::crypto::AeadKey;
use crate::keys::decode_key;

/// Payloads shorter than this are never compressed.
pub const COMPRESSION_THRESHOLD: usize = 100;

const GZIP_LEVEL: u32 = 6;

/// Encrypts and decrypts individual log fields.
///
/// Built once at startup and shared by reference; it holds no mutable state.
#[derive(Debug)]
pub struct FieldCodec {
    key: AeadKey,
    compression: Compression,
}

/// A decrypted field rendered for humans: JSON when it parses, text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum DecryptedField {
    Json(Value),
    Text(String),
}

impl DecryptedField {
    /// Convert into a JSON value (text becomes a JSON string).
    pub fn into_value(self) -> Value {
        match self {
            DecryptedField::Json(value) => value,
            DecryptedField::Text(text) => Value::String(text),
        }
    }
}

impl FieldCodec {
    /// Build a codec from raw key bytes with gzip enabled.
    ///
    /// The key must be exactly 32 bytes; anything else is a configuration error.
    pub fn new(key: &[u8]) -> Result<Self, ProxylogError> {
        Ok(Self {
            key: AeadKey::new(key)?,
            compression: Compression::Gzip,
        })
    }

    /// Build a codec from the `[logging]` config section.
    pub fn from_config(config: &LoggingConfig) -> Result<Self, ProxylogError> {
        let encoded = config.encryption_key.as_deref().ok_or_else(|| {
            ProxylogError::Config("logging.encryption_key is not set".to_string())
        })?;
        let key = decode_key(encoded)?;
        Ok(Self::new(&key)?.with_compression(config.compression))
    }

    /// Choose the compression mode used by `encrypt`. Decryption always
    /// honours the flag in the blob.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Seal a payload into an [`EncryptedBlob`].
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedBlob, ProxylogError> {
        let compressed = match self.compression {
            Compression::Gzip if plaintext.len() >= COMPRESSION_THRESHOLD => {
                Some(gzip(plaintext)?).filter(|c| c.len() < plaintext.len())
            }
            _ => None,
        };

        let (flags, payload) = match &compressed {
            Some(bytes) => (FLAG_COMPRESSED, bytes.as_slice()),
            None => (0, plaintext),
        };

        let (nonce, sealed) = self.key.seal(&[flags], payload)?;
        Ok(EncryptedBlob::assemble(flags, &nonce, &sealed))
    }

    /// Open a blob and return the original payload bytes.
    ///
    /// Fails with [`ProxylogError::Authentication`] if the tag does not verify.
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<Vec<u8>, ProxylogError> {
        let parts = blob.parts()?;
        let payload = self.key.open(&[parts.flags], &parts.nonce, &parts.sealed)?;

        if parts.flags & FLAG_COMPRESSED != 0 {
            gunzip(&payload)
        } else {
            Ok(payload)
        }
    }

    /// Seal a JSON value in its compact serialization.
    pub fn encrypt_json(&self, value: &Value) -> Result<EncryptedBlob, ProxylogError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| ProxylogError::Internal(format!("failed to serialize JSON field: {e}")))?;
        self.encrypt(&bytes)
    }

    /// Decrypt a field and interpret it as JSON, falling back to text.
    pub fn decrypt_field(&self, blob: &EncryptedBlob) -> Result<DecryptedField, ProxylogError> {
        let bytes = self.decrypt(blob)?;
        if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
            return Ok(DecryptedField::Json(value));
        }
        String::from_utf8(bytes)
            .map(DecryptedField::Text)
            .map_err(|_| ProxylogError::Codec("decrypted field is not valid UTF-8".to_string()))
    }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, ProxylogError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), GzLevel::new(GZIP_LEVEL));
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| ProxylogError::Codec(format!("compression failed: {e}")))
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>, ProxylogError> {
    let mut out = Vec::with_capacity(data.len() * 4);
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| ProxylogError::Codec(format!("decompression failed: {e}")))?;
    Ok(out)
}
