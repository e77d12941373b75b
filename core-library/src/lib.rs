//! # Message Library Model
//!
//! Domain types shared by the retrieval pipeline.
//!
//! ## Overview
//!
//! This module defines:
//! - [`TagEvent`] as delivered by the tag reader, and the validated
//!   [`TagIdentity`] derived from it
//! - [`ContentHash`] identifiers for objects on the content network
//! - [`PlaylistManifest`] / [`MessageRef`]: the ordered message list of a tag
//! - [`EncryptedPackage`]: one message as published, still encrypted
//!
//! Manifest order is the playback order. Nothing in this crate reorders it.

pub mod error;
pub mod models;

pub use error::{LibraryError, Result};
pub use models::{
    default_title, ContentHash, EncryptedPackage, MessageRef, PlaylistManifest, TagEvent,
    TagIdentity,
};
