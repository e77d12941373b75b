//! Error types for the gateway provider

use bridge_traits::error::BridgeError;
use std::time::Duration;
use thiserror::Error;

/// Why a single gateway attempt failed.
#[derive(Error, Debug, Clone)]
pub enum AttemptError {
    #[error("{gateway}: timed out after {timeout:?}")]
    Timeout { gateway: String, timeout: Duration },

    #[error("{gateway}: HTTP {status}")]
    Status { gateway: String, status: u16 },

    #[error("{gateway}: {message}")]
    Transport { gateway: String, message: String },

    #[error("{gateway}: unreadable body: {message}")]
    InvalidBody { gateway: String, message: String },
}

/// Gateway provider errors
#[derive(Error, Debug)]
pub enum IpfsError {
    /// Every configured gateway was tried and none produced a usable body
    #[error("All {attempts} gateways failed, last error: {last_error}")]
    AllGatewaysFailed {
        attempts: usize,
        last_error: AttemptError,
    },

    #[error("No gateways configured")]
    NoGateways,

    #[error("Invalid gateway URL: {0}")]
    InvalidGateway(String),

    /// Body was fetched but is not a valid manifest
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// Body was fetched but is not a valid message package
    #[error("Invalid message package: {0}")]
    InvalidPackage(String),
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, IpfsError>;

impl From<IpfsError> for BridgeError {
    fn from(error: IpfsError) -> Self {
        BridgeError::OperationFailed(error.to_string())
    }
}
