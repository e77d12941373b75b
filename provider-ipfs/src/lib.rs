//! # IPFS Gateway Provider
//!
//! Reads manifests and encrypted messages by content hash from a list of
//! equivalent public gateways.
//!
//! ## Overview
//!
//! - Gateways are tried in order, each attempt with its own timeout
//! - Timeouts, transport errors, non-2xx statuses and unparseable bodies all
//!   move on to the next gateway
//! - Only when every gateway has failed does a fetch fail, carrying the last
//!   attempt's error
//! - A preferred gateway can be prepended at runtime
//!
//! Nothing is cached here.

pub mod error;
pub mod fetcher;
pub mod types;

pub use error::{AttemptError, IpfsError, Result};
pub use fetcher::GatewayFetcher;
pub use types::{PackageDocument, PackageMetadata};
