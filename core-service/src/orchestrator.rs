//! # Retrieval Orchestrator
//!
//! Turns a tag scan into a playing playlist.
//!
//! ## Load algorithm
//!
//! 1. At most one load runs at a time; a scan during a load is dropped.
//! 2. With persistence allowed, a cached playlist record with at least one
//!    audio blob is a hit. Tracks are rebuilt in manifest order, classified,
//!    loaded, and the first playable one is started.
//! 3. Otherwise the manifest is fetched (fatal on failure) and each message
//!    is fetched and decrypted strictly in manifest order. The first success
//!    becomes a one-track playlist and starts playing; later successes are
//!    appended. A failing message is logged and skipped.
//! 4. Each decrypted message is written to the cache individually in the
//!    background. Pending writes are drained before the load returns and on
//!    teardown.
//! 5. The availability monitor starts as soon as the first track is in the
//!    engine, not when the load returns.
//! 6. A track duration learned from the output after the write is re-saved.

use bridge_traits::playback::OutputEvent;
use bridge_traits::storage::{AudioMeta, CachedAudio, OfflineCache};
use bridge_traits::time::Clock;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use core_availability::{AvailabilityMonitor, AvailabilityTarget, AvailabilityWindow};
use core_crypto::{CanonicalSerial, KeyDeriver};
use core_library::{
    default_title, ContentHash, EncryptedPackage, MessageRef, PlaylistManifest, TagEvent,
    TagIdentity,
};
use core_playback::{PlaybackEngine, SleepTimer, Track};
use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
use parking_lot::Mutex;
use provider_ipfs::GatewayFetcher;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{CoreError, Result};
use crate::screen::{DeviceMode, Screen};

/// What a scan or load call ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded {
        playlist_id: String,
        track_count: usize,
        from_cache: bool,
    },
    /// Another load was in flight; this one was dropped.
    AlreadyLoading,
    /// The scan is held until a device mode is chosen.
    AwaitingDeviceMode,
}

/// Home-screen entry for a cached playlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub message_count: usize,
    pub last_played: Option<DateTime<Utc>>,
}

/// Collaborators the orchestrator drives.
pub struct OrchestratorParts {
    pub fetcher: Arc<GatewayFetcher>,
    pub engine: Arc<PlaybackEngine>,
    pub cache: Option<Arc<dyn OfflineCache>>,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
    pub deriver: KeyDeriver,
    pub recheck_interval: Duration,
}

struct LoadGuard<'a>(&'a AtomicBool);

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Top-level coordinator for one listening session.
pub struct RetrievalOrchestrator {
    fetcher: Arc<GatewayFetcher>,
    engine: Arc<PlaybackEngine>,
    cache: Option<Arc<dyn OfflineCache>>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    deriver: KeyDeriver,
    monitor: AvailabilityMonitor,
    sleep_timer: SleepTimer,
    loading: AtomicBool,
    screen: Mutex<Screen>,
    device_mode: Mutex<Option<DeviceMode>>,
    pending_scan: Mutex<Option<TagEvent>>,
    last_scan: Mutex<Option<TagEvent>>,
    /// Playlist whose tracks are in the engine.
    current_playlist: Mutex<Option<ContentHash>>,
    writes: Mutex<JoinSet<()>>,
}

impl RetrievalOrchestrator {
    pub fn new(parts: OrchestratorParts) -> Self {
        let monitor = AvailabilityMonitor::new(
            parts.recheck_interval,
            Arc::clone(&parts.clock),
            parts.events.clone(),
        );
        let sleep_timer = SleepTimer::new(Arc::clone(&parts.engine));

        Self {
            fetcher: parts.fetcher,
            engine: parts.engine,
            cache: parts.cache,
            clock: parts.clock,
            events: parts.events,
            deriver: parts.deriver,
            monitor,
            sleep_timer,
            loading: AtomicBool::new(false),
            screen: Mutex::new(Screen::default()),
            device_mode: Mutex::new(None),
            pending_scan: Mutex::new(None),
            last_scan: Mutex::new(None),
            current_playlist: Mutex::new(None),
            writes: Mutex::new(JoinSet::new()),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn engine(&self) -> &Arc<PlaybackEngine> {
        &self.engine
    }

    pub fn sleep_timer(&self) -> &SleepTimer {
        &self.sleep_timer
    }

    pub fn fetcher(&self) -> &Arc<GatewayFetcher> {
        &self.fetcher
    }

    pub fn screen(&self) -> Screen {
        self.screen.lock().clone()
    }

    pub fn device_mode(&self) -> Option<DeviceMode> {
        *self.device_mode.lock()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub fn is_monitoring_availability(&self) -> bool {
        self.monitor.is_running()
    }

    /// Pre-select the device mode, skipping the welcome flow.
    pub fn set_device_mode(&self, mode: DeviceMode) {
        *self.device_mode.lock() = Some(mode);
    }

    fn set_screen(&self, screen: Screen) {
        let name = screen.as_str();
        *self.screen.lock() = screen;
        debug!(screen = name, "Screen changed");
        self.emit(SessionEvent::ScreenChanged {
            screen: name.to_string(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.emit(CoreEvent::Session(event));
    }

    /// The cache, when this device may persist and the store is usable.
    fn active_cache(&self) -> Option<Arc<dyn OfflineCache>> {
        let allowed = self
            .device_mode
            .lock()
            .map_or(true, |mode| mode.allows_persistence());
        self.cache
            .as_ref()
            .filter(|cache| allowed && cache.is_available())
            .cloned()
    }

    // ------------------------------------------------------------------
    // Scan flow
    // ------------------------------------------------------------------

    /// Entry point for a tag scan, which counts as a user gesture.
    ///
    /// Attempts the playback unlock, then either holds the scan for the
    /// welcome flow or loads it.
    pub async fn on_tag_scanned(&self, event: TagEvent) -> Result<LoadOutcome> {
        self.engine.unlock().await;

        if self.device_mode().is_none() {
            debug!("No device mode chosen; showing welcome");
            *self.pending_scan.lock() = Some(event);
            self.set_screen(Screen::Welcome);
            return Ok(LoadOutcome::AwaitingDeviceMode);
        }

        self.load_playlist(event).await
    }

    /// Welcome acknowledged; ask for the device mode.
    pub fn continue_from_welcome(&self) {
        self.set_screen(Screen::DeviceMode);
    }

    /// Record the device mode and resume a held scan, if any.
    pub async fn choose_device_mode(&self, mode: DeviceMode) -> Result<Option<LoadOutcome>> {
        info!(?mode, "Device mode chosen");
        self.set_device_mode(mode);

        let pending = self.pending_scan.lock().take();
        match pending {
            Some(event) => self.load_playlist(event).await.map(Some),
            None => {
                self.set_screen(Screen::home());
                Ok(None)
            }
        }
    }

    /// Re-run the most recent load.
    pub async fn retry(&self) -> Result<Option<LoadOutcome>> {
        let last = self.last_scan.lock().clone();
        match last {
            Some(event) => self.load_playlist(event).await.map(Some),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------

    /// Load the playlist a tag points at.
    ///
    /// A call while another load runs returns
    /// [`LoadOutcome::AlreadyLoading`] without doing anything. A fatal
    /// failure switches to the error screen and is returned.
    pub async fn load_playlist(&self, event: TagEvent) -> Result<LoadOutcome> {
        if self
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Load already in flight; ignoring scan");
            return Ok(LoadOutcome::AlreadyLoading);
        }
        let _guard = LoadGuard(&self.loading);

        *self.last_scan.lock() = Some(event.clone());

        match self.run_load(&event).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                error!(error = %err, "Playlist load failed");
                let playlist_id = TagIdentity::from_event(&event)
                    .and_then(|identity| identity.content_hash())
                    .ok()
                    .map(|hash| hash.to_string());
                self.emit(SessionEvent::LoadFailed {
                    playlist_id,
                    message: err.to_string(),
                });
                self.set_screen(Screen::Error {
                    message: err.user_message().to_string(),
                });
                Err(err)
            }
        }
    }

    async fn run_load(&self, event: &TagEvent) -> Result<LoadOutcome> {
        let identity = TagIdentity::from_event(event)?;
        let playlist_id = identity.content_hash()?;

        info!(
            playlist_id = %playlist_id,
            serial = %identity.serial.redacted(),
            "Loading playlist"
        );
        self.set_screen(Screen::Loading {
            playlist_id: Some(playlist_id.to_string()),
        });
        self.emit(SessionEvent::LoadStarted {
            playlist_id: playlist_id.to_string(),
        });

        self.monitor.stop();
        self.sleep_timer.cancel().await;
        self.drain_writes().await;

        if let Some(cache) = self.active_cache() {
            match self.load_from_cache(cache.as_ref(), &playlist_id).await {
                Ok(Some(track_count)) => {
                    return Ok(self.finish_load(&playlist_id, track_count, true));
                }
                Ok(None) => debug!(playlist_id = %playlist_id, "Cache miss"),
                Err(err) => {
                    warn!(playlist_id = %playlist_id, error = %err, "Cache read failed; using network")
                }
            }
        }

        let track_count = self.load_from_network(&identity, &playlist_id).await?;
        Ok(self.finish_load(&playlist_id, track_count, false))
    }

    fn finish_load(&self, playlist_id: &ContentHash, track_count: usize, from_cache: bool) -> LoadOutcome {
        self.ensure_monitoring();

        info!(playlist_id = %playlist_id, track_count, from_cache, "Playlist loaded");
        self.emit(SessionEvent::LoadCompleted {
            playlist_id: playlist_id.to_string(),
            track_count,
            from_cache,
        });
        self.set_screen(Screen::Home {
            playlist_id: Some(playlist_id.to_string()),
        });

        LoadOutcome::Loaded {
            playlist_id: playlist_id.to_string(),
            track_count,
            from_cache,
        }
    }

    /// Start the availability monitor unless it is already running.
    fn ensure_monitoring(&self) {
        if !self.monitor.is_running() {
            self.monitor
                .start(Arc::clone(&self.engine) as Arc<dyn AvailabilityTarget>);
        }
    }

    /// First tracks of `playlist_id` are in the engine.
    fn tracks_ingested(&self, playlist_id: &ContentHash) {
        *self.current_playlist.lock() = Some(playlist_id.clone());
        self.ensure_monitoring();
    }

    /// Cache-hit path. `Ok(None)` is a miss.
    #[instrument(skip(self, cache), fields(playlist_id = %playlist_id))]
    async fn load_from_cache(
        &self,
        cache: &dyn OfflineCache,
        playlist_id: &ContentHash,
    ) -> Result<Option<usize>> {
        let Some(record) = cache
            .get_playlist(playlist_id.as_str())
            .await
            .map_err(CoreError::storage)?
        else {
            return Ok(None);
        };

        let audio = cache
            .get_playlist_audio(playlist_id.as_str())
            .await
            .map_err(CoreError::storage)?;
        if audio.is_empty() {
            return Ok(None);
        }

        let manifest = PlaylistManifest::from_value(playlist_id.clone(), record.manifest)?;
        let tracks = tracks_from_cache(&manifest, audio, self.clock.today());
        if tracks.is_empty() {
            return Ok(None);
        }

        let track_count = tracks.len();
        self.engine.load_playlist(tracks).await?;
        self.tracks_ingested(playlist_id);
        self.start_first_playable().await;

        if let Err(err) = cache.update_last_played(playlist_id.as_str()).await {
            warn!(error = %err, "Could not stamp last played");
        }

        Ok(Some(track_count))
    }

    /// Network path with progressive reveal. Returns the number of tracks
    /// delivered; fails when the manifest cannot be fetched or no message
    /// could be retrieved.
    #[instrument(skip(self, identity), fields(playlist_id = %playlist_id))]
    async fn load_from_network(
        &self,
        identity: &TagIdentity,
        playlist_id: &ContentHash,
    ) -> Result<usize> {
        let manifest = self.fetcher.fetch_manifest(playlist_id).await?;
        if manifest.is_empty() {
            return Err(CoreError::Validation("manifest lists no messages".to_string()));
        }

        let cache = self.active_cache();
        let today = self.clock.today();
        let mut delivered = 0;
        let mut autoplay_attempted = false;
        let mut last_error = None;

        for (position, message) in manifest.messages.iter().enumerate() {
            let track = match self
                .retrieve_message(&identity.serial, message, position, today)
                .await
            {
                Ok(track) => track,
                Err(err) => {
                    warn!(
                        message_id = %message.message_id,
                        position,
                        error = %err,
                        "Skipping message"
                    );
                    self.emit(SessionEvent::MessageSkipped {
                        playlist_id: playlist_id.to_string(),
                        message_id: message.message_id.clone(),
                        reason: err.to_string(),
                    });
                    last_error = Some(err);
                    continue;
                }
            };

            let first = delivered == 0;

            // Queued before the engine sees the track, so a duration learned
            // during playback is always written after this save.
            if let Some(cache) = cache.as_ref() {
                let write = cache_write(Arc::clone(cache), playlist_id, &track);
                if first {
                    let record = manifest_record(
                        Arc::clone(cache),
                        playlist_id,
                        &identity.serial,
                        &manifest,
                    )?;
                    self.queue_write(async move {
                        record.await;
                        write.await;
                    });
                } else {
                    self.queue_write(write);
                }
            }

            if first {
                self.engine.load_playlist(vec![track]).await?;
                self.tracks_ingested(playlist_id);
                self.set_screen(Screen::Home {
                    playlist_id: Some(playlist_id.to_string()),
                });
            } else {
                self.engine.append_track(track).await?;
                self.ensure_monitoring();
            }
            delivered += 1;

            // Locked leading messages: start the first playable one as it arrives.
            if !autoplay_attempted {
                autoplay_attempted = self.start_first_playable().await;
            }
        }

        self.drain_writes().await;

        if delivered == 0 {
            return Err(last_error.unwrap_or_else(|| {
                CoreError::Internal("no message could be retrieved".to_string())
            }));
        }
        Ok(delivered)
    }

    /// Fetch, derive and decrypt one message.
    async fn retrieve_message(
        &self,
        serial: &CanonicalSerial,
        message: &MessageRef,
        position: usize,
        today: NaiveDate,
    ) -> Result<Track> {
        let package = self.fetcher.fetch_message(&message.content_hash).await?;
        let title = package.display_title(position);
        let (audio, transcript) = self.decrypt_package(serial, package).await?;

        let window = AvailabilityWindow::new(message.available_from, message.available_to);
        Ok(Track::new(message.message_id.clone(), title, Bytes::from(audio))
            .with_window(window, today)
            .with_transcript(Some(transcript)))
    }

    /// PBKDF2 and AES-GCM run on the blocking pool.
    ///
    /// A transcript that fails to decrypt is dropped; only the audio decides
    /// whether the message is usable.
    async fn decrypt_package(
        &self,
        serial: &CanonicalSerial,
        package: EncryptedPackage,
    ) -> Result<(Vec<u8>, String)> {
        let deriver = self.deriver;
        let serial = serial.clone();

        let decrypted = tokio::task::spawn_blocking(move || {
            let key = deriver.derive_key(&serial, package.timestamp);
            let audio = key.decrypt(&package.encrypted_audio)?;
            let transcript = key
                .decrypt_transcript(package.encrypted_transcript.as_deref())
                .unwrap_or_else(|_| {
                    warn!("Transcript could not be decrypted; dropping it");
                    String::new()
                });
            Ok::<_, core_crypto::CryptoError>((audio, transcript))
        })
        .await
        .map_err(|err| CoreError::Internal(format!("decrypt task failed: {}", err)))??;

        Ok(decrypted)
    }

    /// Start the first unlocked track. Returns `false` when there is none.
    async fn start_first_playable(&self) -> bool {
        let state = self.engine.snapshot().await;
        let Some(index) = state
            .tracks
            .iter()
            .position(|track| track.availability.is_playable())
        else {
            debug!("No playable track; not starting playback");
            return false;
        };

        let started = if state.current_index == Some(index) {
            self.engine.play().await
        } else {
            self.engine.select(index).await
        };
        if let Err(err) = started {
            debug!(error = %err, "Autoplay did not start");
        }
        true
    }

    // ------------------------------------------------------------------
    // Output events
    // ------------------------------------------------------------------

    /// Forward a host output notification to the engine.
    ///
    /// A duration learned for a track that had none is written back to the
    /// cache, since the audio was saved before the output parsed it.
    pub async fn on_output_event(&self, event: OutputEvent) -> Result<()> {
        let learns_duration = match event {
            OutputEvent::DurationKnown(_) => self
                .engine
                .current_track()
                .await
                .map_or(false, |track| track.duration.is_none()),
            _ => false,
        };

        self.engine.on_output_event(event).await?;

        if learns_duration {
            self.persist_current_duration().await;
        }
        Ok(())
    }

    async fn persist_current_duration(&self) {
        let Some(cache) = self.active_cache() else {
            return;
        };
        let Some(playlist_id) = self.current_playlist.lock().clone() else {
            return;
        };
        let Some(track) = self.engine.current_track().await else {
            return;
        };

        // The original save for this message may still be queued.
        self.drain_writes().await;
        debug!(message_id = %track.id, "Saving learned duration");
        self.queue_write(cache_write(cache, &playlist_id, &track));
    }

    // ------------------------------------------------------------------
    // Background cache writes
    // ------------------------------------------------------------------

    fn queue_write<F>(&self, write: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.writes.lock().spawn(write);
    }

    /// Wait for every queued cache write.
    pub async fn drain_writes(&self) {
        let mut pending = std::mem::take(&mut *self.writes.lock());
        while let Some(result) = pending.join_next().await {
            if let Err(err) = result {
                warn!(error = %err, "Cache write task failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Library
    // ------------------------------------------------------------------

    /// Cached playlists, most recently played first. Empty when
    /// persistence is off.
    pub async fn cached_playlists(&self) -> Result<Vec<PlaylistSummary>> {
        let Some(cache) = self.active_cache() else {
            return Ok(Vec::new());
        };

        let records = cache.get_all_playlists().await.map_err(CoreError::storage)?;
        Ok(records
            .into_iter()
            .map(|record| PlaylistSummary {
                message_count: record
                    .manifest
                    .get("messages")
                    .and_then(|m| m.as_array())
                    .map_or(0, Vec::len),
                id: record.id,
                last_played: record.last_played,
            })
            .collect())
    }

    /// Re-open a cached playlist from the home list without a scan.
    pub async fn open_cached_playlist(&self, id: &str) -> Result<LoadOutcome> {
        let cache = self
            .active_cache()
            .ok_or_else(|| CoreError::StorageUnavailable("persistence is off".to_string()))?;
        let record = cache
            .get_playlist(id)
            .await
            .map_err(CoreError::storage)?
            .ok_or_else(|| CoreError::Validation(format!("no cached playlist {}", id)))?;

        self.load_playlist(TagEvent::new(record.serial, Some(format!("ipfs://{}", id))))
            .await
    }

    /// Explicit user clear. The only way cached data is removed.
    pub async fn clear_playlist(&self, id: &str) -> Result<()> {
        let cache = self
            .active_cache()
            .ok_or_else(|| CoreError::StorageUnavailable("persistence is off".to_string()))?;

        self.drain_writes().await;
        cache.delete_playlist(id).await.map_err(CoreError::storage)?;

        info!(playlist_id = %id, "Cached playlist cleared");
        self.emit(SessionEvent::CacheCleared {
            playlist_id: id.to_string(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// End the session: stop timers, finish cache writes, release audio.
    pub async fn teardown(&self) -> Result<()> {
        self.monitor.stop();
        self.sleep_timer.cancel().await;
        self.drain_writes().await;
        self.engine.teardown().await?;
        *self.current_playlist.lock() = None;
        self.set_screen(Screen::home());
        Ok(())
    }
}

impl std::fmt::Debug for RetrievalOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalOrchestrator")
            .field("screen", &self.screen())
            .field("device_mode", &self.device_mode())
            .field("loading", &self.is_loading())
            .finish_non_exhaustive()
    }
}

/// Rebuild tracks from cached blobs in manifest order. Blobs whose message
/// is no longer in the manifest are ignored.
fn tracks_from_cache(
    manifest: &PlaylistManifest,
    audio: Vec<CachedAudio>,
    today: NaiveDate,
) -> Vec<Track> {
    let mut positioned: Vec<(usize, Track)> = audio
        .into_iter()
        .filter_map(|cached| {
            let position = manifest.position_of(&cached.id)?;
            let message = &manifest.messages[position];
            let window = AvailabilityWindow::new(message.available_from, message.available_to);
            let duration = cached
                .duration
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64);
            let title = default_title(cached.title.as_deref(), position);

            let track = Track::new(cached.id, title, cached.blob)
                .with_window(window, today)
                .with_duration(duration)
                .with_transcript(cached.transcript);
            Some((position, track))
        })
        .collect();

    positioned.sort_by_key(|(position, _)| *position);
    positioned.into_iter().map(|(_, track)| track).collect()
}

fn cache_write(
    cache: Arc<dyn OfflineCache>,
    playlist_id: &ContentHash,
    track: &Track,
) -> impl Future<Output = ()> + Send + 'static {
    let playlist_id = playlist_id.to_string();
    let message_id = track.id.clone();
    let blob = track.audio.clone();
    let meta = AudioMeta {
        title: Some(track.title.clone()),
        duration: track.duration.map(|d| d.as_secs_f64()),
        transcript: track.transcript.clone(),
    };

    async move {
        if let Err(err) = cache.save_audio(&message_id, &playlist_id, blob, meta).await {
            warn!(message_id = %message_id, error = %err, "Could not cache message audio");
        }
    }
}

fn manifest_record(
    cache: Arc<dyn OfflineCache>,
    playlist_id: &ContentHash,
    serial: &CanonicalSerial,
    manifest: &PlaylistManifest,
) -> Result<impl Future<Output = ()> + Send + 'static> {
    let playlist_id = playlist_id.to_string();
    let serial = serial.as_str().to_string();
    let document = manifest.to_value()?;

    Ok(async move {
        if let Err(err) = cache.save_playlist(&playlist_id, &serial, document).await {
            warn!(playlist_id = %playlist_id, error = %err, "Could not cache playlist record");
            return;
        }
        if let Err(err) = cache.update_last_played(&playlist_id).await {
            warn!(playlist_id = %playlist_id, error = %err, "Could not stamp last played");
        }
    })
}
