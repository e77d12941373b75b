//! Domain models for tags, manifests and encrypted messages.

use bytes::Bytes;
use chrono::NaiveDate;
use core_crypto::CanonicalSerial;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{LibraryError, Result};

// =============================================================================
// Tag
// =============================================================================

/// Raw scan as delivered by the tag reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEvent {
    pub serial: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl TagEvent {
    pub fn new(serial: impl Into<String>, url: Option<String>) -> Self {
        Self {
            serial: serial.into(),
            url,
        }
    }
}

/// A scanned tag with its serial in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagIdentity {
    pub serial: CanonicalSerial,
    pub raw_url: Option<String>,
}

impl TagIdentity {
    pub fn from_event(event: &TagEvent) -> Result<Self> {
        Ok(Self {
            serial: CanonicalSerial::parse(&event.serial)?,
            raw_url: event.url.clone(),
        })
    }

    /// Content hash of the tag's playlist manifest, read from the tag URL.
    ///
    /// Looked up in order: URL fragment, `cid` or `hash` query parameter,
    /// last path segment. `ipfs://<cid>` URLs yield the authority.
    pub fn content_hash(&self) -> Result<ContentHash> {
        let url = self
            .raw_url
            .as_deref()
            .ok_or(LibraryError::MissingContentHash)?;

        let candidate = hash_from_url(url).ok_or(LibraryError::MissingContentHash)?;
        ContentHash::parse(candidate)
    }
}

fn hash_from_url(url: &str) -> Option<&str> {
    let url = url.trim();
    let (rest, fragment) = match url.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (url, None),
    };

    if let Some(segment) = fragment.and_then(last_segment) {
        return Some(segment);
    }

    let (location, query) = match rest.split_once('?') {
        Some((location, query)) => (location, Some(query)),
        None => (rest, None),
    };

    if let Some(query) = query {
        let from_query = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, value)| matches!(*key, "cid" | "hash") && !value.is_empty())
            .map(|(_, value)| value);
        if from_query.is_some() {
            return from_query;
        }
    }

    match location.split_once("://") {
        Some((scheme, after)) if scheme.eq_ignore_ascii_case("ipfs") => {
            after.split('/').find(|s| !s.is_empty())
        }
        Some((_, after)) => after.split_once('/').and_then(|(_, path)| last_segment(path)),
        None => last_segment(location),
    }
}

fn last_segment(path: &str) -> Option<&str> {
    path.rsplit('/').map(str::trim).find(|s| !s.is_empty())
}

// =============================================================================
// Content hash
// =============================================================================

/// Identifier of an immutable object on the content network.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    const MAX_LEN: usize = 128;

    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty()
            || raw.len() > Self::MAX_LEN
            || !raw.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(LibraryError::InvalidContentHash(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentHash {
    type Error = LibraryError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.0)
    }
}

// =============================================================================
// Manifest
// =============================================================================

/// One entry of a playlist manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub message_id: String,
    #[serde(rename = "ipfsHash")]
    pub content_hash: ContentHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_to: Option<NaiveDate>,
}

impl MessageRef {
    /// Whether either availability bound is set.
    pub fn is_date_gated(&self) -> bool {
        self.available_from.is_some() || self.available_to.is_some()
    }
}

#[derive(Serialize, Deserialize)]
struct ManifestDocument {
    messages: Vec<MessageRef>,
}

/// Ordered message list for one tag.
///
/// `messages` order is the canonical playback order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistManifest {
    pub id: ContentHash,
    pub messages: Vec<MessageRef>,
}

impl PlaylistManifest {
    pub fn new(id: ContentHash, messages: Vec<MessageRef>) -> Result<Self> {
        let manifest = Self { id, messages };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse the published manifest document (`{ "messages": [...] }`).
    pub fn from_value(id: ContentHash, value: serde_json::Value) -> Result<Self> {
        let document: ManifestDocument = serde_json::from_value(value)?;
        Self::new(id, document.messages)
    }

    /// Document form, as published and as cached.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        let document = ManifestDocument {
            messages: self.messages.clone(),
        };
        Ok(serde_json::to_value(document)?)
    }

    /// Message ids must be unique; they key the cached audio.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.messages.len());
        for message in &self.messages {
            if message.message_id.trim().is_empty() {
                return Err(LibraryError::InvalidManifest(
                    "message id cannot be empty".to_string(),
                ));
            }
            if !seen.insert(message.message_id.as_str()) {
                return Err(LibraryError::InvalidManifest(format!(
                    "duplicate message id {}",
                    message.message_id
                )));
            }
        }
        Ok(())
    }

    /// Manifest position of a message, used to restore order from the cache.
    pub fn position_of(&self, message_id: &str) -> Option<usize> {
        self.messages
            .iter()
            .position(|message| message.message_id == message_id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

// =============================================================================
// Encrypted package
// =============================================================================

/// One message as published: still encrypted, already base64-decoded.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedPackage {
    /// Key-derivation input. Trusted only in combination with the tag.
    pub timestamp: i64,
    pub encrypted_audio: Bytes,
    pub encrypted_transcript: Option<Bytes>,
    pub title: Option<String>,
}

impl EncryptedPackage {
    /// Published title, else `Message N` for the 0-based manifest position.
    pub fn display_title(&self, position: usize) -> String {
        default_title(self.title.as_deref(), position)
    }
}

/// `title` when non-blank, else `Message N` (1-based).
pub fn default_title(title: Option<&str>, position: usize) -> String {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => title.to_string(),
        None => format!("Message {}", position + 1),
    }
}

impl fmt::Debug for EncryptedPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedPackage")
            .field("timestamp", &self.timestamp)
            .field("encrypted_audio_len", &self.encrypted_audio.len())
            .field(
                "encrypted_transcript_len",
                &self.encrypted_transcript.as_ref().map(Bytes::len),
            )
            .field("title", &self.title)
            .finish()
    }
}
