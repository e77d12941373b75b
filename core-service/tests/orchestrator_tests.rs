//! End-to-end load scenarios against in-memory fakes.
//!
//! The HTTP client, audio output and offline cache share one ordered log so
//! tests can assert on interleaving (e.g. playback starting before the next
//! message is fetched).

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::playback::{AudioOutput, AudioSource, OutputEvent};
use bridge_traits::storage::{AudioMeta, CachedAudio, CachedPlaylist, OfflineCache};
use bridge_traits::time::FixedClock;
use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use core_crypto::{seal, CanonicalSerial, KeyDeriver};
use core_library::TagEvent;
use core_playback::PlayerStatus;
use core_runtime::events::{CoreEvent, SessionEvent};
use core_runtime::PlayerConfig;
use core_service::{
    CoreDependencies, CoreError, CoreService, DeviceMode, LoadOutcome, Screen,
    GENERIC_LOAD_FAILURE,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

const SERIAL: &str = "04:a2:3b:1c:9d:80";
const PLAYLIST: &str = "QmPlaylist";
const GATEWAY: &str = "https://gw.example/ipfs";
const ITERATIONS: u32 = 2;

type Log = Arc<Mutex<Vec<String>>>;

// ============================================================================
// Fixtures
// ============================================================================

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
}

fn tag_url() -> Option<String> {
    Some(format!("https://stone.example/#{}", PLAYLIST))
}

fn sealed(timestamp: i64, plaintext: &[u8]) -> String {
    let serial = CanonicalSerial::parse(SERIAL).unwrap();
    let key = KeyDeriver::with_iterations(ITERATIONS).derive_key(&serial, timestamp);
    STANDARD.encode(seal(&key, plaintext))
}

fn package(timestamp: i64, audio: &[u8], title: Option<&str>) -> String {
    json!({
        "timestamp": timestamp,
        "encryptedAudio": sealed(timestamp, audio),
        "encryptedTranscript": sealed(timestamp, b"transcript"),
        "metadata": { "title": title },
    })
    .to_string()
}

/// Sealed under the key of a different timestamp than the one published.
fn corrupt_package(timestamp: i64) -> String {
    json!({
        "timestamp": timestamp,
        "encryptedAudio": sealed(timestamp + 1, b"unreachable"),
    })
    .to_string()
}

fn manifest(entries: &[(&str, &str, Option<&str>)]) -> Value {
    let messages: Vec<Value> = entries
        .iter()
        .map(|(id, hash, from)| {
            let mut message = json!({ "messageId": id, "ipfsHash": hash });
            if let Some(from) = from {
                message["availableFrom"] = json!(from);
            }
            message
        })
        .collect();
    json!({ "messages": messages })
}

fn three_message_manifest() -> Value {
    manifest(&[
        ("m1", "QmM1", None),
        ("m2", "QmM2", None),
        ("m3", "QmM3", None),
    ])
}

// ============================================================================
// Fakes
// ============================================================================

struct FakeHttp {
    objects: Mutex<HashMap<String, String>>,
    gate: Mutex<Option<(String, Arc<Notify>)>>,
    log: Log,
}

impl FakeHttp {
    fn publish(&self, hash: &str, body: impl Into<String>) {
        self.objects.lock().insert(hash.to_string(), body.into());
    }

    /// Hold requests for `hash` until `notify` fires.
    fn gate(&self, hash: &str, notify: Arc<Notify>) {
        *self.gate.lock() = Some((hash.to_string(), notify));
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let hash = request.url.rsplit('/').next().unwrap_or_default().to_string();
        self.log.lock().push(format!("fetch:{}", hash));

        let gate = self.gate.lock().clone();
        if let Some((gated, notify)) = gate {
            if gated == hash {
                notify.notified().await;
            }
        }

        let body = self.objects.lock().get(&hash).cloned();
        Ok(match body {
            Some(body) => HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from(body),
            },
            None => HttpResponse {
                status: 404,
                headers: HashMap::new(),
                body: Bytes::new(),
            },
        })
    }
}

struct FakeOutput {
    log: Log,
}

impl FakeOutput {
    fn record(&self, call: &str) -> BridgeResult<()> {
        self.log.lock().push(format!("output:{}", call));
        Ok(())
    }
}

#[async_trait]
impl AudioOutput for FakeOutput {
    async fn load(&self, _source: AudioSource) -> BridgeResult<()> {
        self.record("load")
    }
    async fn play(&self) -> BridgeResult<()> {
        self.record("play")
    }
    async fn pause(&self) -> BridgeResult<()> {
        self.record("pause")
    }
    async fn seek(&self, _position: std::time::Duration) -> BridgeResult<()> {
        self.record("seek")
    }
    async fn position(&self) -> BridgeResult<std::time::Duration> {
        Ok(std::time::Duration::ZERO)
    }
    async fn set_looping(&self, _looping: bool) -> BridgeResult<()> {
        self.record("loop")
    }
    async fn set_volume(&self, _volume: f32) -> BridgeResult<()> {
        self.record("volume")
    }
    async fn unload(&self) -> BridgeResult<()> {
        self.record("unload")
    }
}

struct FakeCache {
    available: AtomicBool,
    playlists: Mutex<HashMap<String, CachedPlaylist>>,
    audio: Mutex<Vec<(String, CachedAudio)>>,
    calls: Mutex<Vec<String>>,
    log: Log,
}

impl FakeCache {
    fn record(&self, call: &str) {
        self.calls.lock().push(call.to_string());
        self.log.lock().push(format!("cache:{}", call));
    }

    fn seed(&self, manifest: Value, blobs: &[(&str, &[u8])]) {
        let serial = CanonicalSerial::parse(SERIAL).unwrap();
        self.playlists.lock().insert(
            PLAYLIST.to_string(),
            CachedPlaylist {
                id: PLAYLIST.to_string(),
                serial: serial.as_str().to_string(),
                manifest,
                last_played: None,
            },
        );
        let mut audio = self.audio.lock();
        for (id, blob) in blobs {
            audio.push((
                PLAYLIST.to_string(),
                CachedAudio {
                    id: id.to_string(),
                    blob: Bytes::copy_from_slice(blob),
                    title: None,
                    duration: Some(12.5),
                    transcript: None,
                    timestamp: Utc::now(),
                },
            ));
        }
    }

    fn audio_ids(&self) -> Vec<String> {
        self.audio.lock().iter().map(|(_, a)| a.id.clone()).collect()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl OfflineCache for FakeCache {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn get_all_playlists(&self) -> BridgeResult<Vec<CachedPlaylist>> {
        self.record("get_all_playlists");
        Ok(self.playlists.lock().values().cloned().collect())
    }

    async fn get_playlist(&self, id: &str) -> BridgeResult<Option<CachedPlaylist>> {
        self.record("get_playlist");
        Ok(self.playlists.lock().get(id).cloned())
    }

    async fn get_playlist_audio(&self, id: &str) -> BridgeResult<Vec<CachedAudio>> {
        self.record("get_playlist_audio");
        Ok(self
            .audio
            .lock()
            .iter()
            .filter(|(playlist, _)| playlist == id)
            .map(|(_, audio)| audio.clone())
            .collect())
    }

    async fn save_audio(
        &self,
        message_id: &str,
        playlist_id: &str,
        blob: Bytes,
        meta: AudioMeta,
    ) -> BridgeResult<()> {
        self.record(&format!("save_audio:{}", message_id));
        let mut audio = self.audio.lock();
        audio.retain(|(playlist, a)| !(playlist == playlist_id && a.id == message_id));
        audio.push((
            playlist_id.to_string(),
            CachedAudio {
                id: message_id.to_string(),
                blob,
                title: meta.title,
                duration: meta.duration,
                transcript: meta.transcript,
                timestamp: Utc::now(),
            },
        ));
        Ok(())
    }

    async fn save_playlist(&self, id: &str, serial: &str, manifest: Value) -> BridgeResult<()> {
        self.record("save_playlist");
        self.playlists.lock().insert(
            id.to_string(),
            CachedPlaylist {
                id: id.to_string(),
                serial: serial.to_string(),
                manifest,
                last_played: None,
            },
        );
        Ok(())
    }

    async fn update_last_played(&self, id: &str) -> BridgeResult<()> {
        self.record("update_last_played");
        match self.playlists.lock().get_mut(id) {
            Some(record) => {
                record.last_played = Some(Utc::now());
                Ok(())
            }
            None => Err(BridgeError::StorageError(format!("no playlist {}", id))),
        }
    }

    async fn delete_playlist(&self, id: &str) -> BridgeResult<()> {
        self.record("delete_playlist");
        self.playlists.lock().remove(id);
        self.audio.lock().retain(|(playlist, _)| playlist != id);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    service: CoreService,
    http: Arc<FakeHttp>,
    cache: Arc<FakeCache>,
    log: Log,
}

impl Harness {
    fn new() -> Self {
        let log = Log::default();
        let http = Arc::new(FakeHttp {
            objects: Mutex::new(HashMap::new()),
            gate: Mutex::new(None),
            log: log.clone(),
        });
        let output = Arc::new(FakeOutput { log: log.clone() });
        let cache = Arc::new(FakeCache {
            available: AtomicBool::new(true),
            playlists: Mutex::new(HashMap::new()),
            audio: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            log: log.clone(),
        });

        let config = PlayerConfig::builder()
            .gateways([GATEWAY])
            .kdf_iterations(ITERATIONS)
            .event_buffer_size(1024)
            .build()
            .unwrap();
        let deps = CoreDependencies::new(http.clone(), output)
            .with_offline_cache(cache.clone())
            .with_clock(Arc::new(FixedClock::new(day(1))));
        let service = CoreService::new(config, deps).unwrap();

        Self {
            service,
            http,
            cache,
            log,
        }
    }

    fn personal() -> Self {
        let harness = Self::new();
        harness
            .service
            .orchestrator()
            .set_device_mode(DeviceMode::Personal);
        harness
    }

    fn publish_three_messages(&self, corrupt_second: bool) {
        self.http
            .publish(PLAYLIST, three_message_manifest().to_string());
        self.http
            .publish("QmM1", package(1_717_200_000_001, b"one", Some("Hello")));
        if corrupt_second {
            self.http.publish("QmM2", corrupt_package(1_717_200_000_002));
        } else {
            self.http
                .publish("QmM2", package(1_717_200_000_002, b"two", None));
        }
        self.http
            .publish("QmM3", package(1_717_200_000_003, b"three", None));
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    async fn track_ids(&self) -> Vec<String> {
        self.service
            .engine()
            .snapshot()
            .await
            .tracks
            .into_iter()
            .map(|t| t.id)
            .collect()
    }
}

// ============================================================================
// Network path
// ============================================================================

#[tokio::test]
async fn test_progressive_load_skips_corrupt_message_and_plays_first() {
    let harness = Harness::personal();
    harness.publish_three_messages(true);
    let mut events = harness.service.subscribe();

    let outcome = harness
        .service
        .on_tag_scanned(SERIAL, tag_url())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            playlist_id: PLAYLIST.to_string(),
            track_count: 2,
            from_cache: false,
        }
    );
    assert_eq!(harness.track_ids().await, vec!["m1", "m3"]);

    // Playback started after message 1, before message 2 was even fetched.
    let log = harness.log();
    let position = |entry: &str| log.iter().position(|e| e == entry).unwrap();
    let first_load = position("output:load");
    let second_fetch = position("fetch:QmM2");
    assert!(first_load < second_fetch);
    assert!(log[first_load..second_fetch].contains(&"output:play".to_string()));

    let state = harness.service.engine().snapshot().await;
    assert_eq!(state.current_index, Some(0));
    assert_eq!(state.status, PlayerStatus::Playing);
    assert_eq!(state.tracks[0].title, "Hello");
    assert_eq!(state.tracks[1].title, "Message 3");
    assert!(state.tracks[0].has_transcript);

    let skipped: Vec<String> = events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            CoreEvent::Session(SessionEvent::MessageSkipped { message_id, .. }) => {
                Some(message_id)
            }
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec!["m2"]);
}

#[tokio::test]
async fn test_network_load_writes_each_message_to_cache() {
    let harness = Harness::personal();
    harness.publish_three_messages(true);

    harness
        .service
        .on_tag_scanned(SERIAL, tag_url())
        .await
        .unwrap();

    let mut cached = harness.cache.audio_ids();
    cached.sort();
    assert_eq!(cached, vec!["m1", "m3"]);

    let record = harness.cache.playlists.lock().get(PLAYLIST).cloned().unwrap();
    assert_eq!(record.serial, "04:A2:3B:1C:9D:80");
    assert_eq!(record.manifest, three_message_manifest());
    assert!(record.last_played.is_some());
}

#[tokio::test]
async fn test_locked_first_message_autoplays_first_unlocked() {
    let harness = Harness::personal();
    harness.http.publish(
        PLAYLIST,
        manifest(&[("m1", "QmM1", Some("2025-06-05")), ("m2", "QmM2", None)]).to_string(),
    );
    harness
        .http
        .publish("QmM1", package(1_717_200_000_001, b"one", None));
    harness
        .http
        .publish("QmM2", package(1_717_200_000_002, b"two", None));

    harness
        .service
        .on_tag_scanned(SERIAL, tag_url())
        .await
        .unwrap();

    let state = harness.service.engine().snapshot().await;
    assert_eq!(state.track_ids(), vec!["m1", "m2"]);
    assert!(!state.tracks[0].availability.is_playable());
    assert_eq!(state.current_index, Some(1));
    assert!(state.is_playing());
    assert!(harness.service.orchestrator().is_monitoring_availability());
}

#[tokio::test]
async fn test_manifest_failure_shows_error_and_retry_recovers() {
    let harness = Harness::personal();
    let orchestrator = harness.service.orchestrator();

    let err = harness
        .service
        .on_tag_scanned(SERIAL, tag_url())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::FetchFailed(_)));
    assert_eq!(
        orchestrator.screen(),
        Screen::Error {
            message: GENERIC_LOAD_FAILURE.to_string()
        }
    );
    assert!(!orchestrator.is_loading());

    harness.publish_three_messages(false);
    let outcome = orchestrator.retry().await.unwrap();

    assert!(matches!(
        outcome,
        Some(LoadOutcome::Loaded { track_count: 3, .. })
    ));
    assert!(orchestrator.screen().has_player());
}

#[tokio::test]
async fn test_invalid_serial_is_fatal_validation_error() {
    let harness = Harness::personal();

    let err = harness
        .service
        .on_tag_scanned("04:A2:3", tag_url())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Validation(_)));
    assert!(harness.log().iter().all(|e| !e.starts_with("fetch:")));
}

#[tokio::test]
async fn test_every_message_failing_is_fatal() {
    let harness = Harness::personal();
    harness.http.publish(
        PLAYLIST,
        manifest(&[("m1", "QmM1", None)]).to_string(),
    );
    harness.http.publish("QmM1", corrupt_package(1));

    let err = harness
        .service
        .on_tag_scanned(SERIAL, tag_url())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::DecryptionFailed));
    assert!(matches!(
        harness.service.orchestrator().screen(),
        Screen::Error { .. }
    ));
}

// ============================================================================
// Cache path
// ============================================================================

#[tokio::test]
async fn test_cache_hit_restores_manifest_order() {
    let harness = Harness::personal();
    harness.cache.seed(
        three_message_manifest(),
        &[("m3", b"three"), ("m1", b"one"), ("m2", b"two")],
    );

    let outcome = harness
        .service
        .on_tag_scanned(SERIAL, tag_url())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            playlist_id: PLAYLIST.to_string(),
            track_count: 3,
            from_cache: true,
        }
    );
    assert_eq!(harness.track_ids().await, vec!["m1", "m2", "m3"]);
    assert!(harness.log().iter().all(|e| !e.starts_with("fetch:")));

    let state = harness.service.engine().snapshot().await;
    assert!(state.is_playing());
    assert_eq!(state.tracks[0].title, "Message 1");
    assert_eq!(
        state.tracks[0].duration,
        Some(std::time::Duration::from_secs_f64(12.5))
    );

    let record = harness.cache.playlists.lock().get(PLAYLIST).cloned().unwrap();
    assert!(record.last_played.is_some());
}

#[tokio::test]
async fn test_playlist_record_without_audio_is_a_miss() {
    let harness = Harness::personal();
    harness.cache.seed(three_message_manifest(), &[]);
    harness.publish_three_messages(false);

    let outcome = harness
        .service
        .on_tag_scanned(SERIAL, tag_url())
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        LoadOutcome::Loaded {
            from_cache: false,
            ..
        }
    ));
}

#[tokio::test]
async fn test_shared_mode_never_touches_cache() {
    let harness = Harness::new();
    harness
        .service
        .orchestrator()
        .set_device_mode(DeviceMode::Shared);
    harness
        .cache
        .seed(three_message_manifest(), &[("m1", b"one")]);
    harness.publish_three_messages(false);

    let outcome = harness
        .service
        .on_tag_scanned(SERIAL, tag_url())
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        LoadOutcome::Loaded {
            from_cache: false,
            track_count: 3,
            ..
        }
    ));
    assert!(harness.cache.calls().is_empty());
    assert!(harness
        .service
        .orchestrator()
        .cached_playlists()
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_unavailable_cache_is_skipped_silently() {
    let harness = Harness::personal();
    harness.cache.available.store(false, Ordering::SeqCst);
    harness.publish_three_messages(false);

    harness
        .service
        .on_tag_scanned(SERIAL, tag_url())
        .await
        .unwrap();

    assert!(harness.cache.calls().is_empty());
}

#[tokio::test]
async fn test_cached_playlists_and_clear() {
    let harness = Harness::personal();
    harness
        .cache
        .seed(three_message_manifest(), &[("m1", b"one")]);
    let orchestrator = harness.service.orchestrator();

    let listed = orchestrator.cached_playlists().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, PLAYLIST);
    assert_eq!(listed[0].message_count, 3);

    orchestrator.clear_playlist(PLAYLIST).await.unwrap();
    assert!(orchestrator.cached_playlists().await.unwrap().is_empty());
    assert!(harness.cache.audio_ids().is_empty());
}

#[tokio::test]
async fn test_open_cached_playlist_without_scan() {
    let harness = Harness::personal();
    harness
        .cache
        .seed(three_message_manifest(), &[("m2", b"two")]);

    let outcome = harness
        .service
        .orchestrator()
        .open_cached_playlist(PLAYLIST)
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        LoadOutcome::Loaded {
            from_cache: true,
            track_count: 1,
            ..
        }
    ));
}

// ============================================================================
// Session flow
// ============================================================================

#[tokio::test]
async fn test_second_scan_while_loading_is_dropped() {
    let harness = Harness::personal();
    harness.publish_three_messages(false);
    let release = Arc::new(Notify::new());
    harness.http.gate(PLAYLIST, release.clone());

    let orchestrator = harness.service.orchestrator();
    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .load_playlist(TagEvent::new(SERIAL, tag_url()))
                .await
        })
    };

    while !harness.log().contains(&format!("fetch:{}", PLAYLIST)) {
        tokio::task::yield_now().await;
    }
    assert!(orchestrator.is_loading());

    let second = orchestrator
        .load_playlist(TagEvent::new(SERIAL, tag_url()))
        .await
        .unwrap();
    assert_eq!(second, LoadOutcome::AlreadyLoading);

    release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, LoadOutcome::Loaded { track_count: 3, .. }));

    let manifest_fetches = harness
        .log()
        .iter()
        .filter(|e| *e == &format!("fetch:{}", PLAYLIST))
        .count();
    assert_eq!(manifest_fetches, 1);
}

#[tokio::test]
async fn test_first_scan_walks_welcome_and_device_mode() {
    let harness = Harness::new();
    harness.publish_three_messages(false);
    let orchestrator = harness.service.orchestrator();

    let outcome = harness
        .service
        .on_tag_scanned(SERIAL, tag_url())
        .await
        .unwrap();
    assert_eq!(outcome, LoadOutcome::AwaitingDeviceMode);
    assert_eq!(orchestrator.screen(), Screen::Welcome);

    orchestrator.continue_from_welcome();
    assert_eq!(orchestrator.screen(), Screen::DeviceMode);

    let outcome = orchestrator
        .choose_device_mode(DeviceMode::Personal)
        .await
        .unwrap();
    assert!(matches!(outcome, Some(LoadOutcome::Loaded { .. })));
    assert_eq!(
        orchestrator.screen(),
        Screen::Home {
            playlist_id: Some(PLAYLIST.to_string())
        }
    );
}

#[tokio::test]
async fn test_teardown_stops_monitor_and_releases_output() {
    let harness = Harness::personal();
    harness.publish_three_messages(false);
    harness
        .service
        .on_tag_scanned(SERIAL, tag_url())
        .await
        .unwrap();
    let orchestrator = harness.service.orchestrator();
    assert!(orchestrator.is_monitoring_availability());

    harness.service.shutdown().await.unwrap();

    assert!(!orchestrator.is_monitoring_availability());
    assert_eq!(
        harness.service.engine().snapshot().await.status,
        PlayerStatus::NoTrack
    );
    assert_eq!(harness.log().last().map(String::as_str), Some("output:unload"));
    assert_eq!(orchestrator.screen(), Screen::home());
}

// ============================================================================
// Playback during a slow load
// ============================================================================

/// Start a load with `QmM2` held back. Returns once message 1 is playing and
/// message 2 is being fetched.
async fn load_with_second_message_held(
    harness: &Harness,
) -> (
    Arc<Notify>,
    tokio::task::JoinHandle<core_service::Result<LoadOutcome>>,
) {
    harness.publish_three_messages(false);
    let release = Arc::new(Notify::new());
    harness.http.gate("QmM2", release.clone());

    let orchestrator = harness.service.orchestrator();
    let load = tokio::spawn(async move {
        orchestrator
            .load_playlist(TagEvent::new(SERIAL, tag_url()))
            .await
    });

    while !harness.log().contains(&"fetch:QmM2".to_string()) {
        tokio::task::yield_now().await;
    }
    (release, load)
}

#[tokio::test]
async fn test_availability_monitor_runs_while_later_messages_load() {
    let harness = Harness::personal();
    let (release, load) = load_with_second_message_held(&harness).await;
    let orchestrator = harness.service.orchestrator();

    assert!(orchestrator.is_loading());
    assert_eq!(harness.track_ids().await, vec!["m1"]);
    assert!(orchestrator.is_monitoring_availability());

    release.notify_one();
    load.await.unwrap().unwrap();
    assert!(orchestrator.is_monitoring_availability());
}

#[tokio::test]
async fn test_playback_resumes_when_message_arrives_after_first_ended() {
    let harness = Harness::personal();
    let (release, load) = load_with_second_message_held(&harness).await;

    harness
        .service
        .on_output_event(OutputEvent::Ended)
        .await
        .unwrap();
    let state = harness.service.engine().snapshot().await;
    assert_eq!(state.current_index, Some(0));
    assert_eq!(state.status, PlayerStatus::Loaded);

    release.notify_one();
    load.await.unwrap().unwrap();

    let state = harness.service.engine().snapshot().await;
    assert_eq!(state.track_ids(), vec!["m1", "m2", "m3"]);
    assert_eq!(state.current_index, Some(1));
    assert!(state.is_playing());
}

#[tokio::test]
async fn test_learned_duration_is_written_back_to_cache() {
    let harness = Harness::personal();
    harness.publish_three_messages(false);
    harness
        .service
        .on_tag_scanned(SERIAL, tag_url())
        .await
        .unwrap();
    let orchestrator = harness.service.orchestrator();

    harness
        .service
        .on_output_event(OutputEvent::DurationKnown(std::time::Duration::from_secs(42)))
        .await
        .unwrap();
    // Already known: nothing more to write.
    harness
        .service
        .on_output_event(OutputEvent::DurationKnown(std::time::Duration::from_secs(42)))
        .await
        .unwrap();
    orchestrator.drain_writes().await;

    let saved = harness
        .cache
        .audio
        .lock()
        .iter()
        .find(|(_, audio)| audio.id == "m1")
        .map(|(_, audio)| audio.duration);
    assert_eq!(saved, Some(Some(42.0)));
    let saves = harness
        .cache
        .calls()
        .iter()
        .filter(|c| *c == "save_audio:m1")
        .count();
    assert_eq!(saves, 2);
}

#[tokio::test]
async fn test_shared_mode_does_not_write_learned_duration() {
    let harness = Harness::new();
    harness
        .service
        .orchestrator()
        .set_device_mode(DeviceMode::Shared);
    harness.publish_three_messages(false);
    harness
        .service
        .on_tag_scanned(SERIAL, tag_url())
        .await
        .unwrap();

    harness
        .service
        .on_output_event(OutputEvent::DurationKnown(std::time::Duration::from_secs(42)))
        .await
        .unwrap();
    harness.service.orchestrator().drain_writes().await;

    assert!(harness.cache.calls().is_empty());
    assert_eq!(
        harness.service.engine().snapshot().await.tracks[0].duration,
        Some(std::time::Duration::from_secs(42))
    );
}
