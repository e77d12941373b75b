//! PBKDF2 key derivation.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use tracing::trace;

use crate::cipher::{MessageKey, KEY_LEN};
use crate::serial::CanonicalSerial;

/// Round count used by the content producer.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Derives per-message keys.
///
/// salt = canonical serial text, password = decimal message timestamp,
/// PBKDF2-HMAC-SHA256, 256-bit output. A round count that differs from the
/// producer's yields keys that fail authentication, nothing louder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDeriver {
    iterations: u32,
}

impl KeyDeriver {
    pub fn new() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }

    /// Deriver with a non-standard round count. Only content produced with the
    /// same count will decrypt.
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Derive the decryption key for one message.
    pub fn derive_key(&self, serial: &CanonicalSerial, timestamp: i64) -> MessageKey {
        let password = timestamp.to_string();
        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), serial.salt(), self.iterations, &mut key);
        trace!(serial = %serial.redacted(), timestamp, "Derived message key");
        MessageKey::new(key)
    }
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new()
    }
}
