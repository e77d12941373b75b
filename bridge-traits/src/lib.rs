//! # Host Bridge Traits
//!
//! Capability contracts the player core requires from its host.
//!
//! ## Overview
//!
//! The retrieval pipeline never talks to the network, the audio device or the
//! persistence layer directly. Each of those is a trait defined here and
//! implemented per platform (see `bridge-desktop` for the desktop adapters).
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - single-attempt async HTTP GET
//!
//! ### Audio
//! - [`AudioOutput`](playback::AudioOutput) - the one audio output resource
//!   owned by the playback engine
//!
//! ### Persistence
//! - [`OfflineCache`](storage::OfflineCache) - durable store for decrypted
//!   audio and playlist manifests
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and include actionable context
//! (URL, playlist id, SQL operation).
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync` so implementations can be shared across
//! tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod playback;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use playback::{AudioOutput, AudioSource, OutputEvent};
pub use storage::{AudioMeta, CachedAudio, CachedPlaylist, OfflineCache};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
