//! # Message Crypto
//!
//! Re-derives per-message keys from a physical tag and decrypts the
//! pre-encrypted voice messages published for it.
//!
//! ## Overview
//!
//! - [`CanonicalSerial`]: the tag serial in its one accepted form
//!   (uppercase, colon-separated hex). Its UTF-8 bytes are the PBKDF2 salt, so
//!   any other spelling derives a different key.
//! - [`KeyDeriver`]: PBKDF2-HMAC-SHA256 over the decimal message timestamp.
//! - [`MessageKey`]: a decrypt-only AES-256-GCM key, zeroized on drop.
//!
//! Content is produced upstream; production builds have no way to encrypt.
//! The `test-util` feature adds [`seal`] for building fixtures.
//!
//! ## Usage
//!
//! ```rust
//! use core_crypto::{CanonicalSerial, KeyDeriver};
//!
//! let serial = CanonicalSerial::parse("04:a2:3b:1c:9d:80").unwrap();
//! assert_eq!(serial.as_str(), "04:A2:3B:1C:9D:80");
//!
//! let deriver = KeyDeriver::new();
//! let key = deriver.derive_key(&serial, 1_717_200_000_000);
//! assert!(key.decrypt(&[0u8; 8]).is_err());
//! ```

pub mod cipher;
pub mod error;
pub mod kdf;
pub mod serial;

pub use cipher::{MessageKey, IV_LEN, TAG_LEN};
pub use error::{CryptoError, Result};
pub use kdf::{KeyDeriver, PBKDF2_ITERATIONS};
pub use serial::CanonicalSerial;

#[cfg(any(test, feature = "test-util"))]
pub use cipher::seal;
