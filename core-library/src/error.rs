use core_crypto::CryptoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Invalid tag: {0}")]
    InvalidTag(#[from] CryptoError),

    #[error("Invalid content hash: {0:?}")]
    InvalidContentHash(String),

    #[error("Tag carries no content hash")]
    MissingContentHash,

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
