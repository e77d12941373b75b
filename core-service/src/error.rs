use bridge_traits::BridgeError;
use core_crypto::CryptoError;
use core_library::LibraryError;
use core_playback::PlaybackError;
use provider_ipfs::IpfsError;
use thiserror::Error;

/// Shown for every fatal load failure. Details go to the log.
pub const GENERIC_LOAD_FAILURE: &str = "We couldn't load these messages. Please try again.";

#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed tag serial, URL, content hash or manifest.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Wrong key or corrupted ciphertext. The two are not distinguished.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Every gateway failed.
    #[error("Fetch failed: {0}")]
    FetchFailed(#[from] IpfsError),

    /// Persistence disabled by device mode or failing.
    #[error("Offline storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn storage(error: BridgeError) -> Self {
        CoreError::StorageUnavailable(error.to_string())
    }

    /// Per-message failures that skip one track instead of failing a load.
    pub fn is_skippable(&self) -> bool {
        matches!(self, CoreError::DecryptionFailed | CoreError::FetchFailed(_))
    }

    /// Listener-facing text. Never includes error details.
    pub fn user_message(&self) -> &'static str {
        GENERIC_LOAD_FAILURE
    }
}

impl From<CryptoError> for CoreError {
    fn from(error: CryptoError) -> Self {
        match error {
            CryptoError::DecryptionFailed => CoreError::DecryptionFailed,
            CryptoError::InvalidSerial(_) => CoreError::Validation(error.to_string()),
        }
    }
}

impl From<LibraryError> for CoreError {
    fn from(error: LibraryError) -> Self {
        match error {
            LibraryError::InvalidTag(crypto) => crypto.into(),
            other => CoreError::Validation(other.to_string()),
        }
    }
}

impl From<core_runtime::Error> for CoreError {
    fn from(error: core_runtime::Error) -> Self {
        match error {
            core_runtime::Error::CapabilityMissing {
                capability,
                message,
            } => CoreError::CapabilityMissing {
                capability,
                message,
            },
            other => CoreError::Configuration(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
