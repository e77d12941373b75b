//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the player crates:
//! - Logging and tracing setup
//! - Player configuration
//! - Typed event bus
//!
//! ## Overview
//!
//! Every other core crate logs through `tracing` using the conventions set
//! up here and reports state changes as [`events::CoreEvent`]s.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{PlayerConfig, PlayerConfigBuilder};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream};
