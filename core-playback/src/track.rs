//! Playable tracks.

use bridge_traits::playback::AudioSource;
use bytes::Bytes;
use chrono::NaiveDate;
use core_availability::{Availability, AvailabilityWindow};
use std::fmt;
use std::time::Duration;

/// One decrypted message, ready for the audio output.
///
/// Built once per message after decryption. Only `availability` and
/// `duration` change afterwards.
#[derive(Clone)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub audio: Bytes,
    pub duration: Option<Duration>,
    pub transcript: Option<String>,
    pub window: AvailabilityWindow,
    pub availability: Availability,
}

impl Track {
    /// An ungated track.
    pub fn new(id: impl Into<String>, title: impl Into<String>, audio: Bytes) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            audio,
            duration: None,
            transcript: None,
            window: AvailabilityWindow::default(),
            availability: Availability::Unlocked {
                days_remaining: None,
            },
        }
    }

    /// Attach an availability window and classify it against `today`.
    pub fn with_window(mut self, window: AvailabilityWindow, today: NaiveDate) -> Self {
        self.window = window;
        self.availability = window.classify(today);
        self
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    /// Empty transcripts are dropped.
    pub fn with_transcript(mut self, transcript: Option<String>) -> Self {
        self.transcript = transcript.filter(|text| !text.is_empty());
        self
    }

    pub fn is_playable(&self) -> bool {
        self.availability.is_playable()
    }

    /// Re-classify against `today`. Returns `true` when the status changed.
    pub fn reclassify(&mut self, today: NaiveDate) -> bool {
        let next = self.window.classify(today);
        let changed = !next.same_status(&self.availability);
        self.availability = next;
        changed
    }

    /// Whether a later day can still change this track's status.
    pub fn is_gated(&self) -> bool {
        self.window.needs_recheck(&self.availability)
    }

    pub(crate) fn source(&self) -> AudioSource {
        AudioSource::memory(self.audio.clone())
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("audio_len", &self.audio.len())
            .field("duration", &self.duration)
            .field("availability", &self.availability)
            .finish()
    }
}
