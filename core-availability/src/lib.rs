//! # Message Availability
//!
//! Date-based gating of messages.
//!
//! ## Overview
//!
//! - [`classify`] maps a calendar day and an optional `[from, to]` window to
//!   [`Availability`]: `Unlocked`, `Locked { days_until }` or `Expired`
//! - [`countdown`] turns a classification into listener-facing text through
//!   a replaceable [`CountdownFormatter`]
//! - [`AvailabilityMonitor`] re-runs classification on a fixed cadence while
//!   any gated track remains, and stops itself when none do
//!
//! Classification works on calendar days only; time of day never matters.

pub mod classifier;
pub mod countdown;
pub mod monitor;

pub use classifier::{classify, Availability, AvailabilityWindow};
pub use countdown::{CountdownBucket, CountdownFormatter, EnglishCountdown};
pub use monitor::{AvailabilityMonitor, AvailabilityTarget};
