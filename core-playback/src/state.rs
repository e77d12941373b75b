//! Repeat policy and engine state snapshots.

use core_availability::Availability;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::track::Track;

/// What happens when a track ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Advance; stop after the last track.
    #[default]
    Off,
    /// Loop the current track on the output itself.
    One,
    /// Advance, wrapping from the last track to the first.
    All,
}

impl RepeatMode {
    /// off -> one -> all -> off
    pub fn cycle(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::One,
            RepeatMode::One => RepeatMode::All,
            RepeatMode::All => RepeatMode::Off,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-level status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    #[default]
    NoTrack,
    /// A track is loaded on the output and not playing.
    Loaded,
    Playing,
    Paused,
}

/// Track fields a host needs to render a playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub id: String,
    pub title: String,
    pub duration: Option<Duration>,
    pub availability: Availability,
    pub has_transcript: bool,
}

impl From<&Track> for TrackSummary {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            title: track.title.clone(),
            duration: track.duration,
            availability: track.availability,
            has_transcript: track.transcript.is_some(),
        }
    }
}

/// Point-in-time copy of the engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub tracks: Vec<TrackSummary>,
    pub current_index: Option<usize>,
    pub repeat_mode: RepeatMode,
    pub status: PlayerStatus,
    pub position: Duration,
    /// The host has permitted output at least once this session.
    pub unlocked: bool,
    /// A sleep timer will stop playback when the current track ends.
    pub stop_after_current: bool,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.status == PlayerStatus::Playing
    }

    pub fn track_ids(&self) -> Vec<&str> {
        self.tracks.iter().map(|t| t.id.as_str()).collect()
    }

    pub fn current_track(&self) -> Option<&TrackSummary> {
        self.current_index.and_then(|i| self.tracks.get(i))
    }
}
