//! Gateway fallback fetcher

use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_library::{ContentHash, EncryptedPackage, PlaylistManifest};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{AttemptError, IpfsError, Result};
use crate::types::PackageDocument;

/// Fetches immutable objects by content hash from equivalent gateways.
///
/// Gateways are base URLs such as `https://ipfs.io/ipfs`; an object lives at
/// `<gateway>/<hash>`. Order is fixed at construction except for
/// [`prepend_gateway`](Self::prepend_gateway).
///
/// # Example
///
/// ```ignore
/// let fetcher = GatewayFetcher::new(http_client, config.gateways.clone(), config.attempt_timeout)?;
/// let manifest = fetcher.fetch_manifest(&hash).await?;
/// ```
pub struct GatewayFetcher {
    http_client: Arc<dyn HttpClient>,
    gateways: RwLock<Vec<String>>,
    attempt_timeout: Duration,
}

impl GatewayFetcher {
    /// # Errors
    ///
    /// [`IpfsError::NoGateways`] for an empty list, [`IpfsError::InvalidGateway`]
    /// for a gateway that is not an http(s) URL.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        gateways: Vec<String>,
        attempt_timeout: Duration,
    ) -> Result<Self> {
        let gateways = gateways
            .iter()
            .map(|g| normalize_gateway(g))
            .collect::<Result<Vec<_>>>()?;

        if gateways.is_empty() {
            return Err(IpfsError::NoGateways);
        }

        Ok(Self {
            http_client,
            gateways: RwLock::new(gateways),
            attempt_timeout,
        })
    }

    /// Current gateway order.
    pub fn gateways(&self) -> Vec<String> {
        self.gateways.read().clone()
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Put `gateway` first. A gateway already in the list is moved, not
    /// duplicated.
    pub fn prepend_gateway(&self, gateway: &str) -> Result<()> {
        let gateway = normalize_gateway(gateway)?;
        let mut gateways = self.gateways.write();
        gateways.retain(|g| *g != gateway);
        gateways.insert(0, gateway);
        Ok(())
    }

    /// Object parsed as JSON. A body that does not parse counts as a failed
    /// attempt.
    pub async fn fetch_json<T: DeserializeOwned>(&self, hash: &ContentHash) -> Result<T> {
        self.fetch_with(hash, |response| {
            serde_json::from_slice(&response.body).map_err(|e| e.to_string())
        })
        .await
    }

    /// Playlist manifest stored under `hash`.
    #[instrument(skip(self), fields(hash = %hash))]
    pub async fn fetch_manifest(&self, hash: &ContentHash) -> Result<PlaylistManifest> {
        let value: serde_json::Value = self.fetch_json(hash).await?;
        let manifest = PlaylistManifest::from_value(hash.clone(), value)
            .map_err(|e| IpfsError::InvalidManifest(e.to_string()))?;
        debug!(messages = manifest.len(), "Fetched manifest");
        Ok(manifest)
    }

    /// Encrypted message package stored under `hash`.
    #[instrument(skip(self), fields(hash = %hash))]
    pub async fn fetch_message(&self, hash: &ContentHash) -> Result<EncryptedPackage> {
        let document: PackageDocument = self.fetch_json(hash).await?;
        document.into_package()
    }

    async fn fetch_with<T, F>(&self, hash: &ContentHash, parse: F) -> Result<T>
    where
        F: Fn(&HttpResponse) -> std::result::Result<T, String>,
    {
        // Snapshot so a concurrent prepend doesn't shift this walk.
        let gateways = self.gateways();
        let mut last_error = None;

        for (index, gateway) in gateways.iter().enumerate() {
            let url = format!("{}/{}", gateway, hash);
            debug!(attempt = index + 1, gateway = %gateway, "Fetching object");

            match self.attempt(gateway, &url, &parse).await {
                Ok(value) => {
                    info!(attempt = index + 1, gateway = %gateway, hash = %hash, "Fetched object");
                    return Ok(value);
                }
                Err(error) => {
                    warn!(attempt = index + 1, error = %error, "Gateway attempt failed");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(last_error) => Err(IpfsError::AllGatewaysFailed {
                attempts: gateways.len(),
                last_error,
            }),
            None => Err(IpfsError::NoGateways),
        }
    }

    async fn attempt<T, F>(
        &self,
        gateway: &str,
        url: &str,
        parse: &F,
    ) -> std::result::Result<T, AttemptError>
    where
        F: Fn(&HttpResponse) -> std::result::Result<T, String>,
    {
        let request = HttpRequest::get(url).timeout(self.attempt_timeout);
        let timed_out = || AttemptError::Timeout {
            gateway: gateway.to_string(),
            timeout: self.attempt_timeout,
        };

        let response =
            match tokio::time::timeout(self.attempt_timeout, self.http_client.execute(request))
                .await
            {
                Err(_) => return Err(timed_out()),
                Ok(Err(BridgeError::Timeout(_))) => return Err(timed_out()),
                Ok(Err(e)) => {
                    return Err(AttemptError::Transport {
                        gateway: gateway.to_string(),
                        message: e.to_string(),
                    })
                }
                Ok(Ok(response)) => response,
            };

        if !response.is_success() {
            return Err(AttemptError::Status {
                gateway: gateway.to_string(),
                status: response.status,
            });
        }

        parse(&response).map_err(|message| AttemptError::InvalidBody {
            gateway: gateway.to_string(),
            message,
        })
    }
}

fn normalize_gateway(gateway: &str) -> Result<String> {
    let trimmed = gateway.trim().trim_end_matches('/');
    let has_host = trimmed
        .split_once("://")
        .map(|(scheme, rest)| matches!(scheme, "http" | "https") && !rest.is_empty())
        .unwrap_or(false);

    if !has_host {
        return Err(IpfsError::InvalidGateway(gateway.to_string()));
    }
    Ok(trimmed.to_string())
}
