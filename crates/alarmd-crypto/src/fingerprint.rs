//! Fingerprints for display and audit logs.

use sha2::{Digest, Sha256};

/// Compute a colon-separated SHA-256 hex fingerprint of arbitrary bytes
/// (typically a DER-encoded certificate).
pub fn fingerprint_of(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    hash.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}
