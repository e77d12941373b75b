//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, audio output,
//! offline cache, clock) into the retrieval pipeline. Desktop apps typically
//! enable the `desktop-shims` feature, which pulls in the reqwest HTTP client
//! and the SQLite offline cache from `bridge-desktop`.

pub mod error;
pub mod orchestrator;
pub mod screen;

pub use error::{CoreError, Result, GENERIC_LOAD_FAILURE};
pub use orchestrator::{LoadOutcome, OrchestratorParts, PlaylistSummary, RetrievalOrchestrator};
pub use screen::{DeviceMode, Screen};

use std::sync::Arc;

use bridge_traits::{
    http::HttpClient,
    playback::{AudioOutput, OutputEvent},
    storage::OfflineCache,
    time::{Clock, SystemClock},
};
use core_crypto::KeyDeriver;
use core_library::TagEvent;
use core_playback::PlaybackEngine;
use core_runtime::{EventBus, EventStream, PlayerConfig};
use provider_ipfs::GatewayFetcher;
use tracing::info;

/// Aggregated handle to all bridge dependencies the core requires.
#[derive(Clone)]
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub audio_output: Arc<dyn AudioOutput>,
    /// `None` runs without persistence, as on a shared device.
    pub offline_cache: Option<Arc<dyn OfflineCache>>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Dependencies with the system clock and no offline cache.
    pub fn new(http_client: Arc<dyn HttpClient>, audio_output: Arc<dyn AudioOutput>) -> Self {
        Self {
            http_client,
            audio_output,
            offline_cache: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_offline_cache(mut self, cache: Arc<dyn OfflineCache>) -> Self {
        self.offline_cache = Some(cache);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<PlayerConfig>,
    events: EventBus,
    orchestrator: Arc<RetrievalOrchestrator>,
}

impl CoreService {
    /// Validate `config` and assemble the pipeline.
    pub fn new(config: PlayerConfig, deps: CoreDependencies) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_buffer_size);
        let fetcher = GatewayFetcher::new(
            deps.http_client,
            config.gateways.clone(),
            config.attempt_timeout,
        )
        .map_err(|err| CoreError::Configuration(err.to_string()))?;
        let engine = PlaybackEngine::new(deps.audio_output, events.clone())
            .with_restart_threshold(config.restart_threshold);

        let orchestrator = RetrievalOrchestrator::new(OrchestratorParts {
            fetcher: Arc::new(fetcher),
            engine: Arc::new(engine),
            cache: deps.offline_cache,
            clock: deps.clock,
            events: events.clone(),
            deriver: KeyDeriver::with_iterations(config.kdf_iterations),
            recheck_interval: config.availability_recheck_interval,
        });

        info!(
            gateways = config.gateways.len(),
            kdf_iterations = config.kdf_iterations,
            "Core service ready"
        );

        Ok(Self {
            config: Arc::new(config),
            events,
            orchestrator: Arc::new(orchestrator),
        })
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Stream of every event published from now on.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    pub fn orchestrator(&self) -> Arc<RetrievalOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn engine(&self) -> Arc<PlaybackEngine> {
        Arc::clone(self.orchestrator.engine())
    }

    /// Forward a tag scan from the reader.
    pub async fn on_tag_scanned(&self, serial: &str, url: Option<String>) -> Result<LoadOutcome> {
        self.orchestrator
            .on_tag_scanned(TagEvent::new(serial, url))
            .await
    }

    /// Forward a notification from the host audio output.
    pub async fn on_output_event(&self, event: OutputEvent) -> Result<()> {
        self.orchestrator.on_output_event(event).await
    }

    /// Prefer `gateway` for all later fetches.
    pub fn prepend_gateway(&self, gateway: &str) -> Result<()> {
        self.orchestrator
            .fetcher()
            .prepend_gateway(gateway)
            .map_err(|err| CoreError::Configuration(err.to_string()))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.orchestrator.teardown().await
    }
}

/// Build a service backed by the desktop adapters.
///
/// The cache lives at `config.cache_database_path`, or in memory when unset.
///
/// ```no_run
/// # async fn example(output: std::sync::Arc<dyn bridge_traits::AudioOutput>) -> core_service::Result<()> {
/// use core_runtime::PlayerConfig;
///
/// let core = core_service::bootstrap_desktop(PlayerConfig::default(), output).await?;
/// core.on_tag_scanned("04:A2:3B:1C", Some("https://stone.example/#QmPlaylist".into()))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub async fn bootstrap_desktop(
    config: PlayerConfig,
    audio_output: Arc<dyn AudioOutput>,
) -> Result<CoreService> {
    use bridge_desktop::{ReqwestHttpClient, SqliteOfflineCache};

    let http = ReqwestHttpClient::with_timeout(config.attempt_timeout)
        .map_err(|err| CoreError::CapabilityMissing {
            capability: "http".to_string(),
            message: err.to_string(),
        })?;

    let cache = match &config.cache_database_path {
        Some(path) => SqliteOfflineCache::new(path.clone()).await,
        None => SqliteOfflineCache::in_memory().await,
    }
    .map_err(CoreError::storage)?;

    let deps = CoreDependencies::new(Arc::new(http), audio_output)
        .with_offline_cache(Arc::new(cache));
    CoreService::new(config, deps)
}
