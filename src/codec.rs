//! Reading codec: serialize, then seal with AES-256-GCM.
//!
//! Wire layout of a sealed blob is byte-exact and shared with every
//! consumer:
//!
//! ```text
//! +-----------+-------------------+----------+
//! | nonce(12) | ciphertext(n)     | tag(16)  |
//! +-----------+-------------------+----------+
//! ```
//!
//! No separators or length prefixes. The plaintext is the compact JSON form
//! of a [`Reading`].

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::CodecError;
use crate::reading::Reading;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Shortest well-formed blob (empty ciphertext).
pub const MIN_BLOB_LEN: usize = NONCE_LEN + TAG_LEN;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// A validated 256-bit symmetric key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Build a key from raw bytes, rejecting anything but 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CodecError::Encryption(format!(
                "key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    /// Build a key from standard base64 text.
    pub fn from_base64(text: &str) -> Result<Self, CodecError> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| CodecError::Encryption(format!("key is not valid base64: {e}")))?;
        Self::from_slice(&bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Serialize and seal a reading.
///
/// A fresh random nonce is drawn for every call, so sealing the same
/// reading twice yields different blobs.
///
/// # Errors
///
/// Returns [`CodecError::Encryption`] if the key is not exactly 32 bytes or
/// the reading cannot be serialized.
pub fn encrypt(reading: &Reading, key: &[u8]) -> Result<Vec<u8>, CodecError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
        CodecError::Encryption(format!("key must be {KEY_LEN} bytes, got {}", key.len()))
    })?;

    let plaintext = serde_json::to_vec(reading)
        .map_err(|e| CodecError::Encryption(format!("failed to serialize reading: {e}")))?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    // aes-gcm appends the tag to the ciphertext
    let sealed = cipher
        .encrypt(&nonce, plaintext.as_slice())
        .map_err(|e| CodecError::Encryption(e.to_string()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&sealed);
    Ok(blob)
}

/// Open and deserialize a blob produced by [`encrypt`].
///
/// # Errors
///
/// - [`CodecError::Authentication`] if the blob is shorter than
///   [`MIN_BLOB_LEN`], the tag does not verify, or the key has the wrong
///   length.
/// - [`CodecError::Decode`] if the plaintext is not a serialized reading.
pub fn decrypt(blob: &[u8], key: &[u8]) -> Result<Reading, CodecError> {
    if blob.len() < MIN_BLOB_LEN {
        return Err(CodecError::Authentication(format!(
            "blob is {} bytes, minimum is {MIN_BLOB_LEN}",
            blob.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
        CodecError::Authentication(format!("key must be {KEY_LEN} bytes, got {}", key.len()))
    })?;

    let (nonce, sealed) = blob.split_at(NONCE_LEN);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CodecError::Authentication("tag verification failed".to_string()))?;

    serde_json::from_slice(&plaintext).map_err(|e| CodecError::Decode(e.to_string()))
}
