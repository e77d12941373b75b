//! AES-256-GCM message decryption.
//!
//! Blob layout: `iv (12 bytes) || ciphertext || tag (16 bytes)`.

use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, Result};

pub(crate) const KEY_LEN: usize = 32;

/// AES-GCM IV length at the head of every blob.
pub const IV_LEN: usize = 12;

/// AES-GCM authentication tag length at the tail of every blob.
pub const TAG_LEN: usize = 16;

/// Decrypt-only AES-256 key for one message. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MessageKey([u8; KEY_LEN]);

impl MessageKey {
    pub(crate) fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    #[cfg(test)]
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Decrypt an `iv || ciphertext || tag` blob.
    ///
    /// Every failure (short blob, wrong key, tampered bytes) is the same
    /// [`CryptoError::DecryptionFailed`].
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < IV_LEN + TAG_LEN {
            return Err(CryptoError::DecryptionFailed);
        }

        let (iv, ciphertext) = blob.split_at(IV_LEN);
        let cipher =
            Aes256Gcm::new_from_slice(&self.0).map_err(|_| CryptoError::DecryptionFailed)?;

        cipher
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Decrypt an optional transcript blob into text.
    ///
    /// Absent transcript yields an empty string. Non-UTF-8 plaintext counts
    /// as a failed decryption.
    pub fn decrypt_transcript(&self, blob: Option<&[u8]>) -> Result<String> {
        match blob {
            None => Ok(String::new()),
            Some(blob) => {
                let plaintext = self.decrypt(blob)?;
                String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
            }
        }
    }
}

impl fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageKey")
            .field("key_bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt `plaintext` under `key` into the blob layout `decrypt` accepts.
#[cfg(any(test, feature = "test-util"))]
pub fn seal(key: &MessageKey, plaintext: &[u8]) -> Vec<u8> {
    use aes_gcm::aead::{rand_core::RngCore, OsRng};

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let cipher = Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(&key.0));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .unwrap_or_default();

    let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    blob
}
