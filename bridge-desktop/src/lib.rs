//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` (single attempt, rustls)
//! - `OfflineCache` using an SQLite database via `sqlx`
//!
//! Audio output is left to the embedding application.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SqliteOfflineCache};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let cache = SqliteOfflineCache::new("stone-player/cache.db".into()).await?;
//!     // Hand both to core_service::CoreDependencies
//!     Ok(())
//! }
//! ```

mod cache;
mod http;

pub use cache::SqliteOfflineCache;
pub use http::ReqwestHttpClient;
