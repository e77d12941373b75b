//! Sleep timer.
//!
//! An owned object with explicit start/cancel, held by the session next to
//! the engine it controls. Starting a new timer replaces the old one.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::PlaybackEngine;

/// When the timer stops playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepTimerMode {
    /// Pause after a fixed duration.
    After(Duration),
    /// Stop when the current track ends instead of advancing.
    EndOfTrack,
}

struct ActiveTimer {
    mode: SleepTimerMode,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

pub struct SleepTimer {
    engine: Arc<PlaybackEngine>,
    active: Arc<Mutex<Option<ActiveTimer>>>,
}

impl SleepTimer {
    pub fn new(engine: Arc<PlaybackEngine>) -> Self {
        Self {
            engine,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Arm the timer, replacing any running one. Must be called from within
    /// a tokio runtime.
    pub async fn start(&self, mode: SleepTimerMode) {
        self.cancel().await;

        let cancel = CancellationToken::new();
        let deadline = match mode {
            SleepTimerMode::After(duration) => Some(Instant::now() + duration),
            SleepTimerMode::EndOfTrack => None,
        };

        *self.active.lock() = Some(ActiveTimer {
            mode,
            deadline,
            cancel: cancel.clone(),
        });

        match deadline {
            Some(deadline) => {
                tokio::spawn(Self::run(
                    deadline,
                    Arc::clone(&self.engine),
                    Arc::clone(&self.active),
                    cancel,
                ));
            }
            None => {
                if let Err(error) = self.engine.set_stop_after_current(true).await {
                    warn!(%error, "Could not arm end-of-track stop");
                }
            }
        }

        debug!(?mode, "Sleep timer armed");
    }

    /// Disarm. No-op when nothing is armed.
    pub async fn cancel(&self) {
        let previous = self.active.lock().take();
        if let Some(timer) = previous {
            timer.cancel.cancel();
            if timer.mode == SleepTimerMode::EndOfTrack {
                if let Err(error) = self.engine.set_stop_after_current(false).await {
                    warn!(%error, "Could not restore looping after cancel");
                }
            }
            debug!("Sleep timer cancelled");
        }
    }

    /// The armed mode, if any. An end-of-track timer is disarmed once the
    /// engine has acted on it.
    pub async fn mode(&self) -> Option<SleepTimerMode> {
        let mode = self.active.lock().as_ref().map(|t| t.mode);
        match mode {
            Some(SleepTimerMode::EndOfTrack) if !self.engine.stop_after_current().await => {
                self.active.lock().take();
                None
            }
            other => other,
        }
    }

    pub async fn is_active(&self) -> bool {
        self.mode().await.is_some()
    }

    /// Time left on a timed timer.
    pub fn remaining(&self) -> Option<Duration> {
        self.active
            .lock()
            .as_ref()
            .and_then(|t| t.deadline)
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    async fn run(
        deadline: Instant,
        engine: Arc<PlaybackEngine>,
        active: Arc<Mutex<Option<ActiveTimer>>>,
        cancel: CancellationToken,
    ) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep_until(deadline) => {
                {
                    let mut slot = active.lock();
                    if slot.as_ref().map_or(false, |t| t.deadline == Some(deadline)) {
                        slot.take();
                    }
                }
                if let Err(error) = engine.sleep_timer_elapsed().await {
                    warn!(%error, "Sleep timer could not pause playback");
                }
            }
        }
    }
}

impl Drop for SleepTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.active.lock().take() {
            timer.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for SleepTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SleepTimer")
            .field("remaining", &self.remaining())
            .finish_non_exhaustive()
    }
}
