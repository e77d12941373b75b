//! Offline cache contract.
//!
//! Durable key-value storage for decrypted audio blobs and playlist manifests,
//! keyed by the playlist's content hash. Records are created on the first
//! successful decrypt, read on later visits, and removed only by an explicit
//! [`OfflineCache::delete_playlist`]. There is no automatic eviction.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Playlist record as persisted.
///
/// The manifest is stored as opaque JSON; the core re-parses it on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPlaylist {
    pub id: String,
    pub serial: String,
    pub manifest: serde_json::Value,
    pub last_played: Option<DateTime<Utc>>,
}

/// One decrypted audio blob belonging to a playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAudio {
    /// Message id from the manifest.
    pub id: String,
    pub blob: Bytes,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub transcript: Option<String>,
    /// When the blob was stored.
    pub timestamp: DateTime<Utc>,
}

/// Metadata stored alongside an audio blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioMeta {
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub transcript: Option<String>,
}

/// Offline cache trait
///
/// Implementations:
/// - **Desktop**: SQLite (`bridge-desktop`)
/// - **Web**: IndexedDB
///
/// When [`is_available`](OfflineCache::is_available) returns `false`
/// (restricted or shared-device mode) callers must not invoke any other
/// method.
#[async_trait]
pub trait OfflineCache: Send + Sync {
    /// Whether persistence is usable on this device.
    fn is_available(&self) -> bool;

    /// All cached playlists, most recently played first.
    async fn get_all_playlists(&self) -> Result<Vec<CachedPlaylist>>;

    /// A single playlist record.
    async fn get_playlist(&self, id: &str) -> Result<Option<CachedPlaylist>>;

    /// Every audio blob stored for a playlist. Order is unspecified.
    async fn get_playlist_audio(&self, id: &str) -> Result<Vec<CachedAudio>>;

    /// Store (or replace) one decrypted audio blob.
    async fn save_audio(
        &self,
        message_id: &str,
        playlist_id: &str,
        blob: Bytes,
        meta: AudioMeta,
    ) -> Result<()>;

    /// Store (or replace) a playlist record.
    async fn save_playlist(&self, id: &str, serial: &str, manifest: serde_json::Value)
        -> Result<()>;

    /// Stamp the playlist as played now.
    async fn update_last_played(&self, id: &str) -> Result<()>;

    /// Remove a playlist and all of its audio.
    async fn delete_playlist(&self, id: &str) -> Result<()>;
}
