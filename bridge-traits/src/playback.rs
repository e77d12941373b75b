//! Audio output bridge.
//!
//! The host owns the actual audio device (an `<audio>` element, a native
//! sink, ...). The core sees it as one [`AudioOutput`] resource that only the
//! playback engine mutates. Progress and faults flow back as
//! [`OutputEvent`]s which the host forwards to the engine.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::error::Result;

/// Audio payload handed to the output.
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Decrypted audio held in memory.
    MemoryBuffer {
        data: Bytes,
        /// Container hint, e.g. `audio/webm`, when known.
        mime_type: Option<String>,
    },
}

impl AudioSource {
    pub fn memory(data: Bytes) -> Self {
        AudioSource::MemoryBuffer {
            data,
            mime_type: None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AudioSource::MemoryBuffer { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Notifications raised by the host audio output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// The loaded source played to its end. Not raised while looping.
    Ended,
    /// The source failed (decode failure, stall, device loss).
    Error { message: String },
    /// Current playback position.
    TimeUpdate(Duration),
    /// Total duration became known after the source was parsed.
    DurationKnown(Duration),
}

/// The single audio output resource.
///
/// Methods are fast control calls; none of them wait for the audio to finish.
/// `play` may be rejected by the platform when playback has not yet been
/// permitted by a user gesture; that rejection surfaces as an `Err`.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Replace the current source. Position resets to zero, output is paused.
    async fn load(&self, source: AudioSource) -> Result<()>;

    /// Start or resume output.
    async fn play(&self) -> Result<()>;

    /// Pause output, keeping the position.
    async fn pause(&self) -> Result<()>;

    /// Seek to an absolute position in the current source.
    async fn seek(&self, position: Duration) -> Result<()>;

    /// Current position in the current source.
    async fn position(&self) -> Result<Duration>;

    /// Loop the current source natively. While looping, `Ended` is not raised.
    async fn set_looping(&self, looping: bool) -> Result<()>;

    /// Volume normalised to `0.0..=1.0`.
    async fn set_volume(&self, volume: f32) -> Result<()>;

    /// Release the current source.
    async fn unload(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_reports_length() {
        let source = AudioSource::memory(Bytes::from_static(&[1, 2, 3]));
        assert_eq!(source.len(), 3);
        assert!(!source.is_empty());
        assert!(AudioSource::memory(Bytes::new()).is_empty());
    }
}
