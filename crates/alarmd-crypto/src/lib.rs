//! `alarmd` Crypto Library
//!
//! Provides the at-rest encryption used for stored subscription
//! credentials and trust material, plus certificate helpers.
//!
//! ## Crypto primitives
//!
//! - **Credential cipher**: ChaCha20-Poly1305 AEAD with a random 12-byte
//!   nonce prepended to every ciphertext
//! - **Key file**: 32 raw bytes, owner-only permissions on Unix
//! - **Fingerprints**: SHA-256, colon-separated hex

#[cfg(feature = "certs")]
pub mod certs;
pub mod cipher;
pub mod error;
pub mod fingerprint;

pub use cipher::{AeadCredentialCipher, CredentialCipher, CredentialKey, KEY_SIZE, NONCE_SIZE};
pub use error::CryptoError;
pub use fingerprint::fingerprint_of;
