//! Offline cache using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{AudioMeta, CachedAudio, CachedPlaylist, OfflineCache},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS playlists (
    id TEXT PRIMARY KEY,
    serial TEXT NOT NULL,
    manifest TEXT NOT NULL,
    last_played INTEGER,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS audio (
    playlist_id TEXT NOT NULL,
    message_id TEXT NOT NULL,
    blob BLOB NOT NULL,
    title TEXT,
    duration REAL,
    transcript TEXT,
    stored_at INTEGER NOT NULL,
    PRIMARY KEY (playlist_id, message_id)
);
"#;

/// SQLite-backed offline cache
///
/// Stores playlist manifests and decrypted audio blobs. Can be switched off
/// at runtime for shared devices, after which [`OfflineCache::is_available`]
/// reports `false` and every other call is refused.
pub struct SqliteOfflineCache {
    pool: SqlitePool,
    enabled: AtomicBool,
}

impl SqliteOfflineCache {
    /// Open (creating if needed) the cache database at `db_path`
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| storage_error("connect", e))?;

        let cache = Self::with_pool(pool).await?;
        info!(path = ?db_path, "Opened offline cache");
        Ok(cache)
    }

    /// Create an in-memory cache (for testing)
    pub async fn in_memory() -> Result<Self> {
        // A second connection to :memory: would see a different database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| storage_error("connect", e))?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| storage_error("create schema", e))?;

        Ok(Self {
            pool,
            enabled: AtomicBool::new(true),
        })
    }

    /// Turn persistence on or off (shared-device mode turns it off)
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        debug!(enabled, "Offline cache availability changed");
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(BridgeError::NotAvailable(
                "offline cache is disabled".to_string(),
            ))
        }
    }

    fn playlist_from_row(row: &SqliteRow) -> Result<CachedPlaylist> {
        let manifest: String = row.get("manifest");
        let manifest = serde_json::from_str(&manifest).map_err(|e| {
            BridgeError::StorageError(format!("Corrupt manifest record: {}", e))
        })?;
        let last_played: Option<i64> = row.get("last_played");

        Ok(CachedPlaylist {
            id: row.get("id"),
            serial: row.get("serial"),
            manifest,
            last_played: last_played.and_then(DateTime::from_timestamp_millis),
        })
    }
}

fn storage_error(operation: &str, error: sqlx::Error) -> BridgeError {
    BridgeError::StorageError(format!("Failed to {}: {}", operation, error))
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl OfflineCache for SqliteOfflineCache {
    fn is_available(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn get_all_playlists(&self) -> Result<Vec<CachedPlaylist>> {
        self.ensure_enabled()?;

        let rows = sqlx::query(
            r#"
            SELECT id, serial, manifest, last_played FROM playlists
            ORDER BY last_played IS NULL, last_played DESC, created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("list playlists", e))?;

        rows.iter().map(Self::playlist_from_row).collect()
    }

    async fn get_playlist(&self, id: &str) -> Result<Option<CachedPlaylist>> {
        self.ensure_enabled()?;

        let row = sqlx::query("SELECT id, serial, manifest, last_played FROM playlists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("read playlist", e))?;

        row.as_ref().map(Self::playlist_from_row).transpose()
    }

    async fn get_playlist_audio(&self, id: &str) -> Result<Vec<CachedAudio>> {
        self.ensure_enabled()?;

        let rows = sqlx::query(
            r#"
            SELECT message_id, blob, title, duration, transcript, stored_at
            FROM audio WHERE playlist_id = ?
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("read audio", e))?;

        let audio = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("blob");
                let stored_at: i64 = row.get("stored_at");
                CachedAudio {
                    id: row.get("message_id"),
                    blob: Bytes::from(blob),
                    title: row.get("title"),
                    duration: row.get("duration"),
                    transcript: row.get("transcript"),
                    timestamp: DateTime::from_timestamp_millis(stored_at).unwrap_or_default(),
                }
            })
            .collect::<Vec<_>>();

        debug!(playlist_id = id, count = audio.len(), "Read cached audio");
        Ok(audio)
    }

    async fn save_audio(
        &self,
        message_id: &str,
        playlist_id: &str,
        blob: Bytes,
        meta: AudioMeta,
    ) -> Result<()> {
        self.ensure_enabled()?;

        sqlx::query(
            r#"
            INSERT INTO audio (playlist_id, message_id, blob, title, duration, transcript, stored_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(playlist_id, message_id) DO UPDATE SET
                blob = excluded.blob,
                title = excluded.title,
                duration = excluded.duration,
                transcript = excluded.transcript,
                stored_at = excluded.stored_at
            "#,
        )
        .bind(playlist_id)
        .bind(message_id)
        .bind(blob.as_ref())
        .bind(meta.title)
        .bind(meta.duration)
        .bind(meta.transcript)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("save audio", e))?;

        debug!(playlist_id, message_id, bytes = blob.len(), "Stored audio");
        Ok(())
    }

    async fn save_playlist(
        &self,
        id: &str,
        serial: &str,
        manifest: serde_json::Value,
    ) -> Result<()> {
        self.ensure_enabled()?;

        sqlx::query(
            r#"
            INSERT INTO playlists (id, serial, manifest, last_played, created_at)
            VALUES (?, ?, ?, NULL, ?)
            ON CONFLICT(id) DO UPDATE SET
                serial = excluded.serial,
                manifest = excluded.manifest
            "#,
        )
        .bind(id)
        .bind(serial)
        .bind(manifest.to_string())
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("save playlist", e))?;

        debug!(playlist_id = id, "Stored playlist");
        Ok(())
    }

    async fn update_last_played(&self, id: &str) -> Result<()> {
        self.ensure_enabled()?;

        sqlx::query("UPDATE playlists SET last_played = ? WHERE id = ?")
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("update last played", e))?;

        Ok(())
    }

    async fn delete_playlist(&self, id: &str) -> Result<()> {
        self.ensure_enabled()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("begin transaction", e))?;

        sqlx::query("DELETE FROM audio WHERE playlist_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("delete audio", e))?;

        sqlx::query("DELETE FROM playlists WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("delete playlist", e))?;

        tx.commit()
            .await
            .map_err(|e| storage_error("commit transaction", e))?;

        info!(playlist_id = id, "Deleted cached playlist");
        Ok(())
    }
}
