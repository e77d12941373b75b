//! Error types for key derivation and message decryption.

use thiserror::Error;

/// Crypto errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Tag serial is not valid hex after separators are stripped.
    #[error("Invalid tag serial: {0}")]
    InvalidSerial(String),

    /// Authentication failed, the key is wrong, or the blob is truncated.
    ///
    /// Deliberately carries no detail.
    #[error("Decryption failed")]
    DecryptionFailed,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
