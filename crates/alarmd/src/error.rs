//! Error taxonomy for the event pipeline.
//!
//! Request-path errors surface to the Redfish facade. Periodic loops log
//! errors and retry on the next tick; nothing here is fatal to a loop.

use alarmd_core::db::DatabaseError;
use alarmd_crypto::CryptoError;

use crate::trust::TrustError;

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Malformed input: bad destination, event types, protocol, or credential.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The single subscription slot is taken.
    #[error("Capacity error: {0}")]
    Capacity(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Network, TLS handshake, timeout, or non-success response.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Certificate or CRL rejected.
    #[error("Trust error: {0}")]
    Trust(String),

    /// Encryption or decryption of a stored secret failed.
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl EventError {
    /// Whether a periodic loop should simply retry on its next tick.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Persistence(_) | Self::Crypto(_)
        )
    }
}

impl From<DatabaseError> for EventError {
    fn from(e: DatabaseError) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<CryptoError> for EventError {
    fn from(e: CryptoError) -> Self {
        Self::Crypto(e.to_string())
    }
}

impl From<TrustError> for EventError {
    fn from(e: TrustError) -> Self {
        match e {
            TrustError::TooLarge { .. } | TrustError::Empty => Self::Validation(e.to_string()),
            other => Self::Trust(other.to_string()),
        }
    }
}
