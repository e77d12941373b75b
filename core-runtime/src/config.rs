//! # Player Configuration
//!
//! Settings for the retrieval pipeline, built with [`PlayerConfigBuilder`]
//! and validated fail-fast.
//!
//! Host capabilities (HTTP, audio output, offline cache) are not part of
//! this struct; they are injected separately when the service is assembled.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::PlayerConfig;
//! use std::time::Duration;
//!
//! let config = PlayerConfig::builder()
//!     .prepend_gateway("https://my-gateway.example/ipfs")
//!     .attempt_timeout(Duration::from_secs(10))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.gateways[0], "https://my-gateway.example/ipfs");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::PlayerConfig;
//!
//! PlayerConfig::builder()
//!     .gateways(Vec::<String>::new())
//!     .build()
//!     .expect("at least one gateway is required");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use std::path::PathBuf;
use std::time::Duration;

/// Public gateways tried in order when none are configured.
pub const DEFAULT_GATEWAYS: &[&str] = &[
    "https://ipfs.io/ipfs",
    "https://dweb.link/ipfs",
    "https://cloudflare-ipfs.com/ipfs",
    "https://gateway.pinata.cloud/ipfs",
];

pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;
pub const DEFAULT_RECHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RESTART_THRESHOLD: Duration = Duration::from_secs(3);

/// Retrieval pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Gateway base URLs in fallback order.
    pub gateways: Vec<String>,

    /// Timeout applied to each gateway attempt independently.
    pub attempt_timeout: Duration,

    /// PBKDF2 round count. Must equal the content producer's.
    pub kdf_iterations: u32,

    /// How often date-gated tracks are re-classified.
    pub availability_recheck_interval: Duration,

    /// `previous()` restarts the current track past this position.
    pub restart_threshold: Duration,

    /// Per-subscriber event buffer.
    pub event_buffer_size: usize,

    /// SQLite file for the desktop offline cache. `None` keeps the
    /// cache in memory.
    pub cache_database_path: Option<PathBuf>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            gateways: DEFAULT_GATEWAYS.iter().map(|g| g.to_string()).collect(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            availability_recheck_interval: DEFAULT_RECHECK_INTERVAL,
            restart_threshold: DEFAULT_RESTART_THRESHOLD,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            cache_database_path: None,
        }
    }
}

impl PlayerConfig {
    pub fn builder() -> PlayerConfigBuilder {
        PlayerConfigBuilder::default()
    }

    /// Checks:
    /// - at least one gateway, each an http(s) URL
    /// - non-zero timeout, round count, recheck interval and buffer
    pub fn validate(&self) -> Result<()> {
        if self.gateways.is_empty() {
            return Err(Error::Config(
                "At least one content gateway is required".to_string(),
            ));
        }

        for gateway in &self.gateways {
            if !(gateway.starts_with("https://") || gateway.starts_with("http://")) {
                return Err(Error::Config(format!(
                    "Gateway must be an http(s) URL: {}",
                    gateway
                )));
            }
        }

        if self.attempt_timeout.is_zero() {
            return Err(Error::Config(
                "Gateway attempt timeout must be greater than zero".to_string(),
            ));
        }

        if self.kdf_iterations == 0 {
            return Err(Error::Config(
                "Key derivation round count must be greater than zero".to_string(),
            ));
        }

        if self.availability_recheck_interval < Duration::from_secs(1) {
            return Err(Error::Config(
                "Availability recheck interval must be at least one second".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`PlayerConfig`]. Unset fields keep their defaults.
#[derive(Debug, Default)]
pub struct PlayerConfigBuilder {
    gateways: Option<Vec<String>>,
    preferred_gateways: Vec<String>,
    attempt_timeout: Option<Duration>,
    kdf_iterations: Option<u32>,
    availability_recheck_interval: Option<Duration>,
    restart_threshold: Option<Duration>,
    event_buffer_size: Option<usize>,
    cache_database_path: Option<PathBuf>,
}

impl PlayerConfigBuilder {
    /// Replace the gateway list.
    pub fn gateways<I, S>(mut self, gateways: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.gateways = Some(gateways.into_iter().map(Into::into).collect());
        self
    }

    /// Put a gateway ahead of the list. Later calls go further ahead.
    pub fn prepend_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.preferred_gateways.insert(0, gateway.into());
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = Some(iterations);
        self
    }

    pub fn availability_recheck_interval(mut self, interval: Duration) -> Self {
        self.availability_recheck_interval = Some(interval);
        self
    }

    pub fn restart_threshold(mut self, threshold: Duration) -> Self {
        self.restart_threshold = Some(threshold);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn cache_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_database_path = Some(path.into());
        self
    }

    /// # Errors
    ///
    /// [`Error::Config`] when [`PlayerConfig::validate`] rejects the result.
    pub fn build(self) -> Result<PlayerConfig> {
        let defaults = PlayerConfig::default();

        let mut gateways = self.preferred_gateways;
        for gateway in self.gateways.unwrap_or(defaults.gateways) {
            if !gateways.contains(&gateway) {
                gateways.push(gateway);
            }
        }

        let config = PlayerConfig {
            gateways,
            attempt_timeout: self.attempt_timeout.unwrap_or(defaults.attempt_timeout),
            kdf_iterations: self.kdf_iterations.unwrap_or(defaults.kdf_iterations),
            availability_recheck_interval: self
                .availability_recheck_interval
                .unwrap_or(defaults.availability_recheck_interval),
            restart_threshold: self.restart_threshold.unwrap_or(defaults.restart_threshold),
            event_buffer_size: self.event_buffer_size.unwrap_or(defaults.event_buffer_size),
            cache_database_path: self.cache_database_path,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PlayerConfig::builder().build().unwrap();
        assert_eq!(config.gateways.len(), 4);
        assert_eq!(config.attempt_timeout, Duration::from_secs(30));
        assert_eq!(config.kdf_iterations, 100_000);
        assert_eq!(config.availability_recheck_interval, Duration::from_secs(60));
        assert_eq!(config.restart_threshold, Duration::from_secs(3));
        assert_eq!(config.event_buffer_size, 100);
        assert!(config.cache_database_path.is_none());
    }

    #[test]
    fn test_prepend_gateway_keeps_order_without_duplicates() {
        let config = PlayerConfig::builder()
            .gateways(["https://a.example/ipfs", "https://b.example/ipfs"])
            .prepend_gateway("https://b.example/ipfs")
            .prepend_gateway("https://c.example/ipfs")
            .build()
            .unwrap();

        assert_eq!(
            config.gateways,
            vec![
                "https://c.example/ipfs",
                "https://b.example/ipfs",
                "https://a.example/ipfs",
            ]
        );
    }

    #[test]
    fn test_rejects_empty_gateways() {
        let err = PlayerConfig::builder()
            .gateways(Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("gateway"));
    }

    #[test]
    fn test_rejects_non_http_gateway() {
        let result = PlayerConfig::builder().gateways(["ipfs://local"]).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_zero_values() {
        assert!(PlayerConfig::builder()
            .attempt_timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(PlayerConfig::builder().kdf_iterations(0).build().is_err());
        assert!(PlayerConfig::builder()
            .availability_recheck_interval(Duration::from_millis(10))
            .build()
            .is_err());
        assert!(PlayerConfig::builder().event_buffer_size(0).build().is_err());
    }
}
