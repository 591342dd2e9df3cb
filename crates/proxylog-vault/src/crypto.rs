// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Low-level AES-256-GCM seal/open operations.
//!
//! Every call to [`AeadKey::seal`] draws a fresh random 96-bit nonce from the
//! system CSPRNG. Nonce reuse under one key would be catastrophic for GCM.
//! Callers pass associated data that must match byte-for-byte on open.

use std::fmt;

use proxylog_core::ProxylogError;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// A prepared AES-256-GCM key plus the CSPRNG used for nonces.
pub struct AeadKey {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl AeadKey {
    /// Prepare a key. Anything other than 32 bytes is a configuration error.
    pub fn new(key: &[u8]) -> Result<Self, ProxylogError> {
        if key.len() != KEY_LEN {
            return Err(ProxylogError::Config(format!(
                "encryption key must be exactly {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, key)
            .map_err(|_| ProxylogError::Config("failed to create AES-256-GCM key".to_string()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt `plaintext` under a fresh random nonce, authenticating `aad`.
    ///
    /// Returns `(nonce, ciphertext_with_tag)`.
    pub fn seal(
        &self,
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<([u8; NONCE_LEN], Vec<u8>), ProxylogError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| ProxylogError::Internal("failed to generate random nonce".to_string()))?;

        let mut in_out = Vec::with_capacity(plaintext.len() + TAG_LEN);
        in_out.extend_from_slice(plaintext);
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(aad),
                &mut in_out,
            )
            .map_err(|_| ProxylogError::Internal("AES-256-GCM encryption failed".to_string()))?;

        Ok((nonce_bytes, in_out))
    }

    /// Authenticate and decrypt `ciphertext` (which must end with the tag).
    ///
    /// A tag mismatch yields [`ProxylogError::Authentication`]; no plaintext
    /// is ever returned for a blob that fails authentication.
    pub fn open(
        &self,
        aad: &[u8],
        nonce_bytes: &[u8; NONCE_LEN],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, ProxylogError> {
        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(
                Nonce::assume_unique_for_key(*nonce_bytes),
                Aad::from(aad),
                &mut in_out,
            )
            .map_err(|_| {
                ProxylogError::Authentication(
                    "AES-256-GCM tag mismatch -- wrong key or corrupted data".to_string(),
                )
            })?;
        let len = plaintext.len();
        in_out.truncate(len);
        Ok(in_out)
    }
}

impl fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AeadKey").field("algorithm", &"AES-256-GCM").finish()
    }
}
