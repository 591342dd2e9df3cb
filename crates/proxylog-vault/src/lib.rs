// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM field codec for proxylog.
//!
//! Request and response payloads are sealed one field at a time into
//! [`EncryptedBlob`]s: `$enc:` followed by base64 of
//! `flags(1) ‖ nonce(12) ‖ ciphertext ‖ tag(16)`. Payloads of 100 bytes or
//! more are gzip-compressed first when that makes them smaller.

pub mod blob;
pub mod codec;
pub mod crypto;
pub mod keys;

pub use blob::{EncryptedBlob, ENCRYPTED_PREFIX, FLAG_COMPRESSED};
pub use codec::{DecryptedField, FieldCodec, COMPRESSION_THRESHOLD};
pub use keys::{decode_key, generate_key};
