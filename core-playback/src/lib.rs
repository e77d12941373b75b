//! # Playback Module
//!
//! Track sequencing over the host's single audio output.
//!
//! ## Overview
//!
//! This module handles:
//! - The ordered playlist, current index and repeat policy ([`PlaybackEngine`])
//! - The autoplay unlock handshake with the host
//! - Turning output faults into skipped tracks
//! - Re-classifying date-gated tracks when the availability monitor ticks
//! - An owned [`SleepTimer`]

pub mod engine;
pub mod error;
pub mod sleep_timer;
pub mod state;
pub mod track;

pub use engine::PlaybackEngine;
pub use error::{PlaybackError, Result};
pub use sleep_timer::{SleepTimer, SleepTimerMode};
pub use state::{PlaybackState, PlayerStatus, RepeatMode, TrackSummary};
pub use track::Track;
