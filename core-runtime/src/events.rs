//! # Event Bus System
//!
//! Typed state-change notifications between the orchestrator, the playback
//! engine and the availability monitor, carried over `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event types**: one enum per domain under [`CoreEvent`]
//! - **EventBus**: cloneable broadcast sender
//! - **EventStream**: receiver wrapper with an optional filter
//!
//! Components call each other directly to get work done. Events only tell
//! observers (the UI layer, tests, loggers) what happened.
//!
//! ```text
//! ┌──────────────┐  emit   ┌───────────┐ subscribe ┌────────────┐
//! │ Orchestrator ├────────>│           ├──────────>│ UI layer   │
//! ├──────────────┤  emit   │ EventBus  │           └────────────┘
//! │ Playback     ├────────>│           │ subscribe ┌────────────┐
//! ├──────────────┤  emit   │           ├──────────>│ Tests      │
//! │ Availability ├────────>│           │           └────────────┘
//! └──────────────┘         └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, PlaybackEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = EventStream::new(event_bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Playback(_)));
//!
//! event_bus
//!     .emit(CoreEvent::Playback(PlaybackEvent::PlaylistEnded))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event, CoreEvent::Playback(PlaybackEvent::PlaylistEnded));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events and can keep
//!   receiving.
//! - **`RecvError::Closed`**: every sender is gone; treat as shutdown.
//!
//! `emit` fails when nobody is subscribed. Publishers ignore that.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Playback(PlaybackEvent),
    Session(SessionEvent),
    Availability(AvailabilityEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Session(e) => e.description(),
            CoreEvent::Availability(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Session(SessionEvent::LoadFailed { .. }) => EventSeverity::Error,
            CoreEvent::Session(SessionEvent::MessageSkipped { .. })
            | CoreEvent::Playback(PlaybackEvent::PlayBlocked { .. })
            | CoreEvent::Playback(PlaybackEvent::TrackEnded {
                reason: EndReason::Error,
                ..
            }) => EventSeverity::Warning,
            CoreEvent::Session(SessionEvent::LoadCompleted { .. })
            | CoreEvent::Playback(PlaybackEvent::PlaylistLoaded { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

/// Why a track stopped playing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Reached the end of the audio.
    Finished,
    /// The audio output reported a fault.
    Error,
    /// The sleep timer stopped it.
    SleepTimer,
}

/// Events emitted by the playback engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// The playlist was replaced.
    PlaylistLoaded { track_count: usize },
    /// A track was added to the end of the live playlist.
    TrackAppended {
        track_id: String,
        index: usize,
        track_count: usize,
    },
    /// The current index moved and a new source was loaded.
    TrackChanged {
        track_id: String,
        index: usize,
        title: String,
    },
    Started { track_id: String, title: String },
    Paused { track_id: String, position_ms: u64 },
    Stopped { track_id: Option<String> },
    Seeked { track_id: String, position_ms: u64 },
    /// The audio output reported the track length.
    DurationKnown { track_id: String, duration_ms: u64 },
    TrackEnded { track_id: String, reason: EndReason },
    /// `next()` ran past the last track without repeat-all.
    PlaylistEnded,
    /// `off`, `one` or `all`.
    RepeatModeChanged { mode: String },
    /// The host granted permission to start audio.
    Unlocked,
    /// A play request was refused, by the host or because the track is
    /// date-locked.
    PlayBlocked { track_id: String, reason: String },
    SleepTimerFired,
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::PlaylistLoaded { .. } => "Playlist loaded",
            PlaybackEvent::TrackAppended { .. } => "Track appended",
            PlaybackEvent::TrackChanged { .. } => "Track changed",
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Stopped { .. } => "Playback stopped",
            PlaybackEvent::Seeked { .. } => "Playback position changed",
            PlaybackEvent::DurationKnown { .. } => "Track duration known",
            PlaybackEvent::TrackEnded { .. } => "Track ended",
            PlaybackEvent::PlaylistEnded => "Playlist ended",
            PlaybackEvent::RepeatModeChanged { .. } => "Repeat mode changed",
            PlaybackEvent::Unlocked => "Audio output unlocked",
            PlaybackEvent::PlayBlocked { .. } => "Playback blocked",
            PlaybackEvent::SleepTimerFired => "Sleep timer fired",
        }
    }
}

// ============================================================================
// Session Events
// ============================================================================

/// Events emitted by the retrieval orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// The top-level screen changed (`home`, `welcome`, `device_mode`,
    /// `loading`, `error`).
    ScreenChanged { screen: String },
    LoadStarted { playlist_id: String },
    LoadCompleted {
        playlist_id: String,
        track_count: usize,
        from_cache: bool,
    },
    /// A load failed before anything could play.
    LoadFailed {
        playlist_id: Option<String>,
        message: String,
    },
    /// One message could not be fetched or decrypted and was left out.
    MessageSkipped {
        playlist_id: String,
        message_id: String,
        reason: String,
    },
    CacheCleared { playlist_id: String },
}

impl SessionEvent {
    fn description(&self) -> &str {
        match self {
            SessionEvent::ScreenChanged { .. } => "Screen changed",
            SessionEvent::LoadStarted { .. } => "Playlist load started",
            SessionEvent::LoadCompleted { .. } => "Playlist load completed",
            SessionEvent::LoadFailed { .. } => "Playlist load failed",
            SessionEvent::MessageSkipped { .. } => "Message skipped",
            SessionEvent::CacheCleared { .. } => "Cached playlist cleared",
        }
    }
}

// ============================================================================
// Availability Events
// ============================================================================

/// Events emitted by the availability monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AvailabilityEvent {
    /// A track moved between `locked`, `unlocked` and `expired`.
    StatusChanged {
        track_id: String,
        status: String,
        message: Option<String>,
    },
    /// No date-gated tracks remain; re-evaluation stopped.
    MonitorIdle,
}

impl AvailabilityEvent {
    fn description(&self) -> &str {
        match self {
            AvailabilityEvent::StatusChanged { .. } => "Availability changed",
            AvailabilityEvent::MonitorIdle => "Availability monitor idle",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning shares the underlying channel. Slow subscribers get
/// `RecvError::Lagged` and never block publishers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// New receiver for all future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive. `None` when nothing matching is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    /// Drain everything currently queued that passes the filter.
    pub fn drain(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.try_recv() {
            match result {
                Ok(event) => events.push(event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        events
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn started(track: &str) -> CoreEvent {
        CoreEvent::Playback(PlaybackEvent::Started {
            track_id: track.to_string(),
            title: "Message 1".to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(started("m1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(bus.emit(started("m1")).unwrap(), 2);
        assert_eq!(first.recv().await.unwrap(), started("m1"));
        assert_eq!(second.recv().await.unwrap(), started("m1"));
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Session(_)));

        bus.emit(started("m1")).ok();
        let loaded = CoreEvent::Session(SessionEvent::LoadStarted {
            playlist_id: "QmList".to_string(),
        });
        bus.emit(loaded.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), loaded);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(started(&format!("m{}", i))).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Session(SessionEvent::LoadFailed {
            playlist_id: None,
            message: "manifest unavailable".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let errored = CoreEvent::Playback(PlaybackEvent::TrackEnded {
            track_id: "m1".to_string(),
            reason: EndReason::Error,
        });
        assert_eq!(errored.severity(), EventSeverity::Warning);

        let finished = CoreEvent::Playback(PlaybackEvent::TrackEnded {
            track_id: "m1".to_string(),
            reason: EndReason::Finished,
        });
        assert_eq!(finished.severity(), EventSeverity::Debug);

        let completed = CoreEvent::Session(SessionEvent::LoadCompleted {
            playlist_id: "QmList".to_string(),
            track_count: 3,
            from_cache: true,
        });
        assert_eq!(completed.severity(), EventSeverity::Info);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Playback(PlaybackEvent::TrackEnded {
            track_id: "m2".to_string(),
            reason: EndReason::SleepTimer,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"Playback""#));
        assert!(json.contains(r#""reason":"sleep_timer""#));

        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.description(), "Track ended");
    }

    #[tokio::test]
    async fn test_drain_collects_in_order() {
        let bus = EventBus::default();
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        bus.emit(started("m1")).ok();
        bus.emit(CoreEvent::Playback(PlaybackEvent::PlaylistEnded)).ok();

        assert_eq!(
            stream.drain(),
            vec![started("m1"), CoreEvent::Playback(PlaybackEvent::PlaylistEnded)]
        );
    }
}
