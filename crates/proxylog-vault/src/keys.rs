// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encryption key generation and decoding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use proxylog_core::ProxylogError;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::KEY_LEN;

/// Generate a fresh 256-bit key, base64-encoded for the config file.
pub fn generate_key() -> Result<String, ProxylogError> {
    let mut key = [0u8; KEY_LEN];
    SystemRandom::new()
        .fill(&mut key)
        .map_err(|_| ProxylogError::Internal("failed to generate random key".to_string()))?;
    let encoded = STANDARD.encode(key);
    key.zeroize();
    Ok(encoded)
}

/// Decode a base64 key. The decoded bytes are wiped on drop.
pub fn decode_key(encoded: &str) -> Result<Zeroizing<Vec<u8>>, ProxylogError> {
    let bytes = Zeroizing::new(
        STANDARD
            .decode(encoded.trim())
            .map_err(|e| ProxylogError::Config(format!("encryption key is not valid base64: {e}")))?,
    );
    if bytes.len() != KEY_LEN {
        return Err(ProxylogError::Config(format!(
            "encryption key must decode to exactly {KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_decodes_to_32_bytes() {
        let encoded = generate_key().unwrap();
        assert_eq!(encoded.len(), 44);
        assert_eq!(decode_key(&encoded).unwrap().len(), KEY_LEN);
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(generate_key().unwrap(), generate_key().unwrap());
    }

    #[test]
    fn decode_trims_whitespace() {
        let key = decode_key("  AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=\n").unwrap();
        assert_eq!(key.as_slice(), &[0u8; KEY_LEN]);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = decode_key("AAAAAAAAAAAAAAAAAAAAAA==").unwrap_err();
        assert!(matches!(err, ProxylogError::Config(_)));
        assert!(err.to_string().contains("got 16"));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode_key("%%%"), Err(ProxylogError::Config(_))));
    }
}
