// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The textual `$enc:` envelope for sealed fields.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use proxylog_core::ProxylogError;
use serde::{Deserialize, Serialize};

use crate::crypto::{NONCE_LEN, TAG_LEN};

/// Prefix that marks a JSON string field as encrypted.
pub const ENCRYPTED_PREFIX: &str = "$enc:";

/// Flag bit 0: payload was gzip-compressed before encryption.
pub const FLAG_COMPRESSED: u8 = 0x01;

/// Smallest decoded blob: flags + nonce + empty ciphertext + tag.
const MIN_BLOB_LEN: usize = 1 + NONCE_LEN + TAG_LEN;

/// An encrypted field: `$enc:` + base64(`flags ‖ nonce ‖ ciphertext ‖ tag`).
///
/// Serializes as a plain JSON string so it drops straight into a log line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncryptedBlob(String);

/// The binary pieces of a decoded blob.
#[derive(Debug)]
pub(crate) struct BlobParts {
    pub flags: u8,
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the trailing tag.
    pub sealed: Vec<u8>,
}

impl EncryptedBlob {
    /// Assemble a blob from its binary pieces.
    pub(crate) fn assemble(flags: u8, nonce: &[u8; NONCE_LEN], sealed: &[u8]) -> Self {
        let mut raw = Vec::with_capacity(1 + NONCE_LEN + sealed.len());
        raw.push(flags);
        raw.extend_from_slice(nonce);
        raw.extend_from_slice(sealed);
        Self(format!("{ENCRYPTED_PREFIX}{}", STANDARD.encode(raw)))
    }

    /// Wrap a string read from a log line. Only the prefix is checked here;
    /// structural errors surface on decrypt.
    pub fn parse(value: impl Into<String>) -> Result<Self, ProxylogError> {
        let value = value.into();
        if !Self::is_encrypted(&value) {
            return Err(ProxylogError::Codec(format!(
                "invalid encrypted format: missing {ENCRYPTED_PREFIX} prefix"
            )));
        }
        Ok(Self(value))
    }

    /// Whether `value` carries the encrypted-field prefix.
    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(ENCRYPTED_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the compressed flag bit is set.
    pub fn is_compressed(&self) -> Result<bool, ProxylogError> {
        Ok(self.parts()?.flags & FLAG_COMPRESSED != 0)
    }

    /// Decode the base64 body and split it into flags, nonce and sealed bytes.
    pub(crate) fn parts(&self) -> Result<BlobParts, ProxylogError> {
        let encoded = &self.0[ENCRYPTED_PREFIX.len()..];
        let raw = STANDARD
            .decode(encoded)
            .map_err(|e| ProxylogError::Codec(format!("invalid base64 in encrypted field: {e}")))?;
        if raw.len() < MIN_BLOB_LEN {
            return Err(ProxylogError::Codec(format!(
                "encrypted blob too short: {} bytes, need at least {MIN_BLOB_LEN}",
                raw.len()
            )));
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&raw[1..1 + NONCE_LEN]);
        Ok(BlobParts {
            flags: raw[0],
            nonce,
            sealed: raw[1 + NONCE_LEN..].to_vec(),
        })
    }
}

impl TryFrom<String> for EncryptedBlob {
    type Error = ProxylogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EncryptedBlob> for String {
    fn from(blob: EncryptedBlob) -> String {
        blob.0
    }
}

impl fmt::Display for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_then_split() {
        let nonce = [9u8; NONCE_LEN];
        let sealed = vec![1u8; 20];
        let blob = EncryptedBlob::assemble(FLAG_COMPRESSED, &nonce, &sealed);
        assert!(blob.as_str().starts_with("$enc:"));

        let parts = blob.parts().unwrap();
        assert_eq!(parts.flags, FLAG_COMPRESSED);
        assert_eq!(parts.nonce, nonce);
        assert_eq!(parts.sealed, sealed);
        assert!(blob.is_compressed().unwrap());
    }

    #[test]
    fn parse_requires_prefix() {
        assert!(EncryptedBlob::parse("aGVsbG8=").is_err());
        assert!(EncryptedBlob::parse("$enc:aGVsbG8=").is_ok());
    }

    #[test]
    fn short_blob_is_rejected_on_split() {
        let blob = EncryptedBlob::parse(format!("$enc:{}", STANDARD.encode([0u8; 20]))).unwrap();
        let err = blob.parts().unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn bad_base64_is_rejected_on_split() {
        let blob = EncryptedBlob::parse("$enc:!!!not-base64").unwrap();
        assert!(matches!(blob.parts(), Err(ProxylogError::Codec(_))));
    }

    #[test]
    fn serde_uses_plain_string() {
        let blob = EncryptedBlob::assemble(0, &[0u8; NONCE_LEN], &[0u8; TAG_LEN]);
        let json = serde_json::to_string(&blob).unwrap();
        assert!(json.starts_with("\"$enc:"));
        let back: EncryptedBlob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, blob);
        assert!(serde_json::from_str::<EncryptedBlob>("\"plaintext\"").is_err());
    }
}
