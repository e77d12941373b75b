//! # Playback Error Types

use bridge_traits::BridgeError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`PlaybackEngine`](crate::PlaybackEngine) controls.
///
/// Faults reported asynchronously by the audio output never come back as
/// errors; they end the current track instead.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Attempted operation when no track is loaded.
    #[error("No track loaded")]
    NoTrackLoaded,

    /// Index outside the current playlist.
    #[error("Track index {index} out of range (playlist has {len} tracks)")]
    TrackIndexOutOfRange { index: usize, len: usize },

    /// The track is date-gated and cannot be played today.
    #[error("Track {track_id} is {status}")]
    TrackLocked { track_id: String, status: String },

    /// The host refused to start output, typically because no user gesture
    /// has permitted playback yet.
    #[error("Playback blocked by host: {0}")]
    PlaybackBlocked(String),

    /// Invalid volume value (must be in range [0.0, 1.0]).
    #[error("Invalid volume: {0} (must be between 0.0 and 1.0)")]
    InvalidVolume(f32),

    /// Seek position is past the known track duration.
    #[error("Seek position out of bounds: {0:?}")]
    SeekOutOfBounds(Duration),

    /// A control call on the audio output failed.
    #[error("Audio output error: {0}")]
    Output(#[from] BridgeError),
}

impl PlaybackError {
    /// Returns `true` if a later user-initiated attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlaybackError::PlaybackBlocked(_) | PlaybackError::Output(_)
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
