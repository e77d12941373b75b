//! Published object documents
//!
//! Wire shapes of the JSON objects stored on the content network.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use core_library::EncryptedPackage;
use serde::{Deserialize, Serialize};

use crate::error::{IpfsError, Result};

/// Encrypted message package as published.
///
/// ```json
/// { "timestamp": 1717200000000, "encryptedAudio": "<base64>",
///   "encryptedTranscript": "<base64>", "metadata": { "title": "..." } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDocument {
    /// Key-derivation input (milliseconds since the epoch as published)
    pub timestamp: i64,

    /// Base64 of `iv || ciphertext || tag`
    pub encrypted_audio: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_transcript: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PackageMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl PackageDocument {
    /// Decode the base64 fields.
    ///
    /// An empty `encryptedTranscript` counts as absent.
    pub fn into_package(self) -> Result<EncryptedPackage> {
        let encrypted_audio = STANDARD
            .decode(self.encrypted_audio.trim())
            .map_err(|e| IpfsError::InvalidPackage(format!("encryptedAudio: {}", e)))?;

        let encrypted_transcript = match self
            .encrypted_transcript
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(encoded) => Some(Bytes::from(STANDARD.decode(encoded).map_err(|e| {
                IpfsError::InvalidPackage(format!("encryptedTranscript: {}", e))
            })?)),
            None => None,
        };

        Ok(EncryptedPackage {
            timestamp: self.timestamp,
            encrypted_audio: Bytes::from(encrypted_audio),
            encrypted_transcript,
            title: self.metadata.and_then(|m| m.title),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_document_decodes() {
        let document: PackageDocument = serde_json::from_str(
            r#"{
                "timestamp": 1717200000000,
                "encryptedAudio": "AAECAw==",
                "encryptedTranscript": "BAU=",
                "metadata": { "title": "Birthday" }
            }"#,
        )
        .unwrap();

        let package = document.into_package().unwrap();
        assert_eq!(package.timestamp, 1_717_200_000_000);
        assert_eq!(&package.encrypted_audio[..], &[0, 1, 2, 3]);
        assert_eq!(package.encrypted_transcript.as_deref(), Some(&[4u8, 5][..]));
        assert_eq!(package.title.as_deref(), Some("Birthday"));
    }

    #[test]
    fn test_optional_fields_absent() {
        let document: PackageDocument = serde_json::from_str(
            r#"{ "timestamp": 1, "encryptedAudio": "AA==", "encryptedTranscript": "" }"#,
        )
        .unwrap();

        let package = document.into_package().unwrap();
        assert!(package.encrypted_transcript.is_none());
        assert!(package.title.is_none());
    }

    #[test]
    fn test_bad_base64_is_invalid_package() {
        let document = PackageDocument {
            timestamp: 1,
            encrypted_audio: "not base64!".to_string(),
            encrypted_transcript: None,
            metadata: None,
        };
        assert!(matches!(
            document.into_package(),
            Err(IpfsError::InvalidPackage(_))
        ));
    }
}
