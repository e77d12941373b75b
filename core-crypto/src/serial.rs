//! Tag serial canonicalisation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CryptoError, Result};

/// Tag serial in canonical form: uppercase hex octets joined by `:`.
///
/// Readers report serials in assorted spellings (`04a23b`, `04-A2-3B`,
/// `04:a2:3b`). All of them map to one canonical value, and only that value
/// may be used as key-derivation salt or cache key.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalSerial(String);

impl CanonicalSerial {
    /// Canonicalise a serial as delivered by the tag reader.
    ///
    /// `:`, `-` and whitespace are accepted as separators.
    ///
    /// # Errors
    ///
    /// [`CryptoError::InvalidSerial`] when nothing is left after stripping
    /// separators, when a character is not hex, or when the digit count is odd.
    pub fn parse(raw: &str) -> Result<Self> {
        let digits: String = raw
            .chars()
            .filter(|c| !matches!(c, ':' | '-') && !c.is_whitespace())
            .collect();

        if digits.is_empty() {
            return Err(CryptoError::InvalidSerial("serial is empty".to_string()));
        }

        let octets = hex::decode(&digits)
            .map_err(|e| CryptoError::InvalidSerial(format!("{}: {}", digits.len(), e)))?;

        let canonical = octets
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":");

        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// PBKDF2 salt: the UTF-8 bytes of the canonical string.
    pub fn salt(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Decoded serial octets.
    pub fn octets(&self) -> Vec<u8> {
        self.0
            .split(':')
            .filter_map(|pair| u8::from_str_radix(pair, 16).ok())
            .collect()
    }

    /// Serial with all but the last octet masked, for logs.
    pub fn redacted(&self) -> String {
        match self.0.rsplit_once(':') {
            Some((head, last)) => {
                let masked = head.split(':').map(|_| "**").collect::<Vec<_>>().join(":");
                format!("{}:{}", masked, last)
            }
            None => "**".to_string(),
        }
    }
}

impl TryFrom<String> for CanonicalSerial {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CanonicalSerial> for String {
    fn from(serial: CanonicalSerial) -> Self {
        serial.0
    }
}

impl fmt::Display for CanonicalSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CanonicalSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CanonicalSerial").field(&self.redacted()).finish()
    }
}
