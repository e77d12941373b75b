//! # Playback Engine
//!
//! Owns the ordered track list, the current index, the repeat policy and the
//! single [`AudioOutput`]. Nothing else touches the output; other components
//! observe the engine through [`PlaybackEvent`]s on the event bus.
//!
//! ## State machine
//!
//! ```text
//!  NoTrack --load_playlist--> Loaded --play--> Playing <--play/pause--> Paused
//!     ^                         ^                 |
//!     |                         +---end of list---+
//!     +------------teardown / empty playlist-------+
//! ```
//!
//! ## Output faults
//!
//! The host forwards [`OutputEvent`]s to [`PlaybackEngine::on_output_event`].
//! An `Error` ends the current track with [`EndReason::Error`] and advances,
//! exactly like a normal end. It is never returned to a caller.

use async_trait::async_trait;
use bridge_traits::playback::{AudioOutput, OutputEvent};
use chrono::NaiveDate;
use core_availability::{AvailabilityTarget, CountdownFormatter, EnglishCountdown};
use core_runtime::config::DEFAULT_RESTART_THRESHOLD;
use core_runtime::events::{AvailabilityEvent, CoreEvent, EndReason, EventBus, PlaybackEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{PlaybackError, Result};
use crate::state::{PlaybackState, PlayerStatus, RepeatMode, TrackSummary};
use crate::track::Track;

#[derive(Default)]
struct EngineState {
    tracks: Vec<Track>,
    current: Option<usize>,
    repeat: RepeatMode,
    status: PlayerStatus,
    position: Duration,
    volume: Option<f32>,
    unlocked: bool,
    unlock_attempted: bool,
    stop_after_current: bool,
    /// Played through to the end of the list. The next appended track
    /// resumes playback.
    ran_out: bool,
}

impl EngineState {
    fn current_track(&self) -> Result<(usize, &Track)> {
        let index = self.current.ok_or(PlaybackError::NoTrackLoaded)?;
        let track = self
            .tracks
            .get(index)
            .ok_or(PlaybackError::NoTrackLoaded)?;
        Ok((index, track))
    }

    fn current_id(&self) -> Option<String> {
        self.current_track().ok().map(|(_, t)| t.id.clone())
    }

    /// Native looping, unless an end-of-track stop needs the `Ended` event.
    fn wants_looping(&self) -> bool {
        self.repeat == RepeatMode::One && !self.stop_after_current
    }
}

/// Playlist sequencing over one audio output.
pub struct PlaybackEngine {
    output: Arc<dyn AudioOutput>,
    events: EventBus,
    restart_threshold: Duration,
    countdown: Arc<dyn CountdownFormatter>,
    state: Mutex<EngineState>,
}

impl PlaybackEngine {
    pub fn new(output: Arc<dyn AudioOutput>, events: EventBus) -> Self {
        Self {
            output,
            events,
            restart_threshold: DEFAULT_RESTART_THRESHOLD,
            countdown: Arc::new(EnglishCountdown),
            state: Mutex::new(EngineState::default()),
        }
    }

    /// `previous()` restarts the current track when past this position.
    pub fn with_restart_threshold(mut self, threshold: Duration) -> Self {
        self.restart_threshold = threshold;
        self
    }

    /// Wording for availability changes.
    pub fn with_countdown_formatter(mut self, formatter: Arc<dyn CountdownFormatter>) -> Self {
        self.countdown = formatter;
        self
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events.emit(CoreEvent::Playback(event));
    }

    // ------------------------------------------------------------------
    // Playlist
    // ------------------------------------------------------------------

    /// Replace the playlist. The first track, if any, is loaded but not
    /// started.
    #[instrument(skip(self, tracks), fields(track_count = tracks.len()))]
    pub async fn load_playlist(&self, tracks: Vec<Track>) -> Result<()> {
        let mut state = self.state.lock().await;

        state.tracks = tracks;
        state.current = None;
        state.position = Duration::ZERO;
        state.stop_after_current = false;
        state.ran_out = false;

        let track_count = state.tracks.len();
        self.emit(PlaybackEvent::PlaylistLoaded { track_count });

        if track_count == 0 {
            state.status = PlayerStatus::NoTrack;
            self.output.unload().await?;
            return Ok(());
        }

        self.load_index(&mut state, 0).await
    }

    /// Append to the live playlist without interrupting playback. Loads the
    /// track when the playlist was empty, and starts it when playback had
    /// already run past the previous last track. Returns its index.
    pub async fn append_track(&self, track: Track) -> Result<usize> {
        let mut state = self.state.lock().await;

        let track_id = track.id.clone();
        state.tracks.push(track);
        let index = state.tracks.len() - 1;

        self.emit(PlaybackEvent::TrackAppended {
            track_id,
            index,
            track_count: state.tracks.len(),
        });

        if state.current.is_none() {
            self.load_index(&mut state, index).await?;
        } else if state.ran_out {
            debug!(index, "Resuming playback on appended track");
            self.go_to(&mut state, index, true).await?;
        }
        Ok(index)
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Start or resume the current track.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::TrackLocked`] for a locked or expired track
    /// - [`PlaybackError::PlaybackBlocked`] when the host refuses output
    pub async fn play(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.start_current(&mut state).await
    }

    pub async fn pause(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let (_, track) = state.current_track()?;
        let track_id = track.id.clone();

        if state.status != PlayerStatus::Playing {
            return Ok(());
        }

        self.output.pause().await?;
        let position = self.output.position().await.unwrap_or(state.position);
        state.position = position;
        state.status = PlayerStatus::Paused;

        self.emit(PlaybackEvent::Paused {
            track_id,
            position_ms: position.as_millis() as u64,
        });
        Ok(())
    }

    pub async fn toggle(&self) -> Result<()> {
        let playing = self.state.lock().await.status == PlayerStatus::Playing;
        if playing {
            self.pause().await
        } else {
            self.play().await
        }
    }

    /// Pause and rewind the current track.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.current_track()?;
        state.ran_out = false;
        self.halt(&mut state).await
    }

    /// Advance to the next track.
    ///
    /// At the end of the list this wraps under [`RepeatMode::All`] and
    /// otherwise stops with [`PlaybackEvent::PlaylistEnded`], returning
    /// `None`. The new track starts if the engine was playing; a refusal
    /// to start is reported through events only.
    pub async fn next(&self) -> Result<Option<usize>> {
        let mut state = self.state.lock().await;
        let autoplay = state.status == PlayerStatus::Playing;
        self.advance(&mut state, autoplay).await
    }

    /// Restart the current track when past the restart threshold, else go
    /// back one track. Wraps to the last track only under
    /// [`RepeatMode::All`]; on the first track otherwise it restarts.
    pub async fn previous(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let (current, _) = state.current_track()?;
        let position = self.output.position().await.unwrap_or(state.position);

        let target = if position > self.restart_threshold {
            None
        } else if current > 0 {
            Some(current - 1)
        } else if state.repeat == RepeatMode::All {
            Some(state.tracks.len() - 1)
        } else {
            None
        };

        match target {
            Some(index) => {
                let autoplay = state.status == PlayerStatus::Playing;
                self.go_to(&mut state, index, autoplay).await?;
                Ok(index)
            }
            None => {
                self.seek_locked(&mut state, Duration::ZERO).await?;
                Ok(current)
            }
        }
    }

    /// Jump to `index` and start it.
    pub async fn select(&self, index: usize) -> Result<()> {
        let mut state = self.state.lock().await;
        let len = state.tracks.len();
        if index >= len {
            return Err(PlaybackError::TrackIndexOutOfRange { index, len });
        }
        self.go_to(&mut state, index, true).await
    }

    pub async fn seek(&self, position: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        let (_, track) = state.current_track()?;
        if let Some(duration) = track.duration {
            if position > duration {
                return Err(PlaybackError::SeekOutOfBounds(position));
            }
        }
        self.seek_locked(&mut state, position).await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(PlaybackError::InvalidVolume(volume));
        }
        let mut state = self.state.lock().await;
        self.output.set_volume(volume).await?;
        state.volume = Some(volume);
        Ok(())
    }

    /// off -> one -> all -> off. `One` loops the output natively.
    pub async fn cycle_repeat_mode(&self) -> Result<RepeatMode> {
        let mut state = self.state.lock().await;
        let mode = state.repeat.cycle();
        state.repeat = mode;

        if state.current.is_some() {
            self.output.set_looping(state.wants_looping()).await?;
        }

        debug!(mode = %mode, "Repeat mode changed");
        self.emit(PlaybackEvent::RepeatModeChanged {
            mode: mode.as_str().to_string(),
        });
        Ok(mode)
    }

    pub async fn repeat_mode(&self) -> RepeatMode {
        self.state.lock().await.repeat
    }

    // ------------------------------------------------------------------
    // Unlock handshake
    // ------------------------------------------------------------------

    /// One silent play/pause cycle to obtain output permission from the
    /// host. Call right after a user gesture.
    ///
    /// Attempted at most once per engine; failure is silent and the next
    /// real [`play`](Self::play) is the retry. Returns whether output is
    /// known to be permitted.
    pub async fn unlock(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.unlocked {
            return true;
        }
        if state.unlock_attempted {
            return false;
        }
        state.unlock_attempted = true;

        let attempt = async {
            self.output.play().await?;
            self.output.pause().await
        };

        match attempt.await {
            Ok(()) => {
                state.unlocked = true;
                debug!("Audio output unlocked");
                self.emit(PlaybackEvent::Unlocked);
                true
            }
            Err(error) => {
                debug!(%error, "Audio unlock attempt failed");
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Output events
    // ------------------------------------------------------------------

    /// Feed a notification from the host audio output.
    pub async fn on_output_event(&self, event: OutputEvent) -> Result<()> {
        let mut state = self.state.lock().await;

        match event {
            OutputEvent::TimeUpdate(position) => {
                state.position = position;
                Ok(())
            }
            OutputEvent::DurationKnown(duration) => {
                let Some(index) = state.current else {
                    return Ok(());
                };
                if let Some(track) = state.tracks.get_mut(index) {
                    track.duration = Some(duration);
                    let track_id = track.id.clone();
                    self.emit(PlaybackEvent::DurationKnown {
                        track_id,
                        duration_ms: duration.as_millis() as u64,
                    });
                }
                Ok(())
            }
            OutputEvent::Ended => self.on_track_ended(&mut state).await,
            OutputEvent::Error { message } => {
                let Some(track_id) = state.current_id() else {
                    return Ok(());
                };
                warn!(track_id = %track_id, error = %message, "Audio output fault; skipping track");
                self.emit(PlaybackEvent::TrackEnded {
                    track_id,
                    reason: EndReason::Error,
                });
                self.advance(&mut state, true).await.map(|_| ())
            }
        }
    }

    async fn on_track_ended(&self, state: &mut EngineState) -> Result<()> {
        let Some(track_id) = state.current_id() else {
            return Ok(());
        };

        if state.stop_after_current {
            state.stop_after_current = false;
            state.status = PlayerStatus::Paused;
            state.position = Duration::ZERO;
            if state.repeat == RepeatMode::One {
                self.output.set_looping(true).await?;
            }
            info!(track_id = %track_id, "Sleep timer stopped playback at end of track");
            self.emit(PlaybackEvent::TrackEnded {
                track_id,
                reason: EndReason::SleepTimer,
            });
            self.emit(PlaybackEvent::SleepTimerFired);
            return Ok(());
        }

        if state.repeat == RepeatMode::One {
            // Output loops natively; an Ended here means looping was lost.
            self.output.seek(Duration::ZERO).await?;
            self.output.play().await?;
            return Ok(());
        }

        self.emit(PlaybackEvent::TrackEnded {
            track_id,
            reason: EndReason::Finished,
        });
        self.advance(state, true).await.map(|_| ())
    }

    // ------------------------------------------------------------------
    // Sleep timer hooks
    // ------------------------------------------------------------------

    /// Stop at the end of the current track instead of advancing.
    ///
    /// Under [`RepeatMode::One`] native looping is suspended while armed so
    /// the output still reports the end of the track.
    pub async fn set_stop_after_current(&self, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.stop_after_current = enabled;
        if state.current.is_some() && state.repeat == RepeatMode::One {
            self.output.set_looping(state.wants_looping()).await?;
        }
        Ok(())
    }

    pub async fn stop_after_current(&self) -> bool {
        self.state.lock().await.stop_after_current
    }

    /// Pause because a timed sleep timer elapsed.
    pub(crate) async fn sleep_timer_elapsed(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let was_armed = std::mem::take(&mut state.stop_after_current);
        if was_armed && state.current.is_some() && state.repeat == RepeatMode::One {
            self.output.set_looping(true).await?;
        }

        if state.status == PlayerStatus::Playing {
            self.output.pause().await?;
            state.position = self.output.position().await.unwrap_or(state.position);
            state.status = PlayerStatus::Paused;
            if let Some(track_id) = state.current_id() {
                self.emit(PlaybackEvent::TrackEnded {
                    track_id,
                    reason: EndReason::SleepTimer,
                });
            }
        }

        info!("Sleep timer elapsed");
        self.emit(PlaybackEvent::SleepTimerFired);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inspection & lifecycle
    // ------------------------------------------------------------------

    pub async fn snapshot(&self) -> PlaybackState {
        let state = self.state.lock().await;
        PlaybackState {
            tracks: state.tracks.iter().map(TrackSummary::from).collect(),
            current_index: state.current,
            repeat_mode: state.repeat,
            status: state.status,
            position: state.position,
            unlocked: state.unlocked,
            stop_after_current: state.stop_after_current,
        }
    }

    /// The current track, audio included.
    pub async fn current_track(&self) -> Option<Track> {
        let state = self.state.lock().await;
        state.current_track().ok().map(|(_, track)| track.clone())
    }

    /// Transcript of the track at `index`, if it has one.
    pub async fn transcript(&self, index: usize) -> Option<String> {
        self.state
            .lock()
            .await
            .tracks
            .get(index)
            .and_then(|t| t.transcript.clone())
    }

    /// Release the output and forget the playlist. The unlock state is kept
    /// for the lifetime of the engine.
    pub async fn teardown(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let track_id = state.current_id();

        state.tracks.clear();
        state.current = None;
        state.status = PlayerStatus::NoTrack;
        state.position = Duration::ZERO;
        state.stop_after_current = false;
        state.ran_out = false;

        self.output.unload().await?;
        self.emit(PlaybackEvent::Stopped { track_id });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals (state lock held)
    // ------------------------------------------------------------------

    async fn load_index(&self, state: &mut EngineState, index: usize) -> Result<()> {
        let len = state.tracks.len();
        let track = state
            .tracks
            .get(index)
            .ok_or(PlaybackError::TrackIndexOutOfRange { index, len })?;

        self.output.load(track.source()).await?;
        self.output.set_looping(state.wants_looping()).await?;

        let event = PlaybackEvent::TrackChanged {
            track_id: track.id.clone(),
            index,
            title: track.title.clone(),
        };

        state.current = Some(index);
        state.position = Duration::ZERO;
        state.status = PlayerStatus::Loaded;
        state.ran_out = false;
        self.emit(event);
        Ok(())
    }

    async fn start_current(&self, state: &mut EngineState) -> Result<()> {
        let (_, track) = state.current_track()?;
        let track_id = track.id.clone();
        let title = track.title.clone();

        if !track.is_playable() {
            let status = track.availability.as_str().to_string();
            debug!(track_id = %track_id, status = %status, "Refusing to play gated track");
            self.emit(PlaybackEvent::PlayBlocked {
                track_id: track_id.clone(),
                reason: status.clone(),
            });
            return Err(PlaybackError::TrackLocked { track_id, status });
        }

        if let Err(error) = self.output.play().await {
            debug!(track_id = %track_id, %error, "Host refused playback");
            self.emit(PlaybackEvent::PlayBlocked {
                track_id,
                reason: error.to_string(),
            });
            return Err(PlaybackError::PlaybackBlocked(error.to_string()));
        }

        if !state.unlocked {
            state.unlocked = true;
            self.emit(PlaybackEvent::Unlocked);
        }
        state.status = PlayerStatus::Playing;
        state.ran_out = false;
        self.emit(PlaybackEvent::Started { track_id, title });
        Ok(())
    }

    async fn go_to(&self, state: &mut EngineState, index: usize, autoplay: bool) -> Result<()> {
        self.load_index(state, index).await?;
        if autoplay {
            if let Err(error) = self.start_current(state).await {
                debug!(index, %error, "Track changed but did not start");
            }
        }
        Ok(())
    }

    async fn advance(&self, state: &mut EngineState, autoplay: bool) -> Result<Option<usize>> {
        let (current, _) = state.current_track()?;
        let len = state.tracks.len();

        let target = if current + 1 < len {
            Some(current + 1)
        } else if state.repeat == RepeatMode::All {
            Some(0)
        } else {
            None
        };

        match target {
            Some(index) => {
                self.go_to(state, index, autoplay).await?;
                Ok(Some(index))
            }
            None => {
                self.halt(state).await?;
                state.ran_out = autoplay;
                info!("Playlist ended");
                self.emit(PlaybackEvent::PlaylistEnded);
                Ok(None)
            }
        }
    }

    async fn halt(&self, state: &mut EngineState) -> Result<()> {
        self.output.pause().await?;
        self.output.seek(Duration::ZERO).await?;
        state.position = Duration::ZERO;
        state.status = PlayerStatus::Loaded;
        self.emit(PlaybackEvent::Stopped {
            track_id: state.current_id(),
        });
        Ok(())
    }

    async fn seek_locked(&self, state: &mut EngineState, position: Duration) -> Result<()> {
        let (_, track) = state.current_track()?;
        let track_id = track.id.clone();

        self.output.seek(position).await?;
        state.position = position;
        self.emit(PlaybackEvent::Seeked {
            track_id,
            position_ms: position.as_millis() as u64,
        });
        Ok(())
    }
}

#[async_trait]
impl AvailabilityTarget for PlaybackEngine {
    async fn refresh_availability(&self, today: NaiveDate) -> usize {
        let mut state = self.state.lock().await;
        let mut gated = 0;

        for track in state.tracks.iter_mut() {
            if track.reclassify(today) {
                info!(
                    track_id = %track.id,
                    status = track.availability.as_str(),
                    "Track availability changed"
                );
                let _ = self.events.emit(CoreEvent::Availability(
                    AvailabilityEvent::StatusChanged {
                        track_id: track.id.clone(),
                        status: track.availability.as_str().to_string(),
                        message: self.countdown.describe(today, &track.availability),
                    },
                ));
            }
            if track.is_gated() {
                gated += 1;
            }
        }

        gated
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("restart_threshold", &self.restart_threshold)
            .finish_non_exhaustive()
    }
}
