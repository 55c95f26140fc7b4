//! Helpers for secrets sealed with a [`CredentialCipher`].

use alarmd_crypto::CredentialCipher;

use crate::error::EventError;

/// Decrypt a sealed blob that holds UTF-8 text.
pub fn decrypt_utf8(cipher: &dyn CredentialCipher, blob: &[u8]) -> Result<String, EventError> {
    let plain = cipher.decrypt(blob)?;
    String::from_utf8(plain)
        .map_err(|e| EventError::Crypto(format!("decrypted value is not UTF-8: {e}")))
}
