//! Current and backup trust generations.

use std::sync::Arc;

use alarmd_crypto::CredentialCipher;
use tracing::{info, instrument, warn};

use super::validate::{RootCaInfo, TrustError, inspect_root, validate_crl, validate_root_chain};
use crate::error::EventError;
use crate::secret::decrypt_utf8;
use crate::storage::{EventDatabase, TRUST_USAGE, TrustParams, TrustRecord};

/// Import type accepted for root CA content.
pub const IMPORT_TYPE_TEXT: &str = "text";

/// Decrypted trust material. Only ever held in memory.
#[derive(Clone)]
pub struct TrustMaterial {
    pub root_cert_id: i64,
    pub usage: String,
    pub import_type: String,
    pub cert_pem: String,
    pub crl_pem: Option<String>,
    pub installed_at: i64,
}

impl std::fmt::Debug for TrustMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustMaterial")
            .field("root_cert_id", &self.root_cert_id)
            .field("usage", &self.usage)
            .field("has_crl", &self.crl_pem.is_some())
            .field("installed_at", &self.installed_at)
            .finish_non_exhaustive()
    }
}

impl TrustMaterial {
    pub fn root(&self) -> Result<RootCaInfo, TrustError> {
        inspect_root(&self.cert_pem)
    }
}

/// Both generations at once.
#[derive(Debug, Clone)]
pub struct TrustGenerations {
    pub current: Option<TrustMaterial>,
    pub previous: Option<TrustMaterial>,
}

/// Installs, rolls back, and serves trust material for delivery.
#[derive(Clone)]
pub struct CertTrustManager {
    db: EventDatabase,
    cipher: Arc<dyn CredentialCipher>,
}

impl CertTrustManager {
    pub fn new(db: EventDatabase, cipher: Arc<dyn CredentialCipher>) -> Self {
        Self { db, cipher }
    }

    /// Validate and install a new current generation.
    ///
    /// The previous current generation becomes the backup. Nothing is
    /// written when validation fails.
    #[instrument(skip(self, cert_pem, crl_pem))]
    pub async fn install_trust(
        &self,
        root_cert_id: i64,
        cert_pem: &str,
        crl_pem: Option<&str>,
    ) -> Result<RootCaInfo, EventError> {
        let root = validate_root_chain(cert_pem)?;
        if let Some(crl) = crl_pem {
            validate_crl(crl, cert_pem)?;
        }

        let cert_blob = self.cipher.encrypt(cert_pem.as_bytes())?;
        let crl_blob = crl_pem
            .map(|crl| self.cipher.encrypt(crl.as_bytes()))
            .transpose()?;

        self.db
            .install_trust(&TrustParams {
                root_cert_id,
                usage: TRUST_USAGE,
                import_type: IMPORT_TYPE_TEXT,
                cert_blob: &cert_blob,
                crl_blob: crl_blob.as_deref(),
            })
            .await?;

        info!(
            root_cert_id,
            subject = %root.subject,
            fingerprint = %root.fingerprint,
            has_crl = crl_pem.is_some(),
            "Trust material installed"
        );

        Ok(root)
    }

    /// Attach a CRL to the current generation in place.
    #[instrument(skip(self, crl_pem))]
    pub async fn import_crl(&self, crl_pem: &str) -> Result<(), EventError> {
        let current = self.current().await?.ok_or(TrustError::NotInstalled)?;
        validate_crl(crl_pem, &current.cert_pem)?;

        let crl_blob = self.cipher.encrypt(crl_pem.as_bytes())?;
        if !self.db.set_trust_crl(TRUST_USAGE, &crl_blob).await? {
            // Current generation vanished between read and write.
            return Err(TrustError::NotInstalled.into());
        }

        info!(root_cert_id = current.root_cert_id, "CRL attached to trust material");
        Ok(())
    }

    pub async fn current(&self) -> Result<Option<TrustMaterial>, EventError> {
        self.db
            .get_trust(TRUST_USAGE)
            .await?
            .map(|record| self.open(record))
            .transpose()
    }

    /// The backup generation.
    pub async fn get_unused(&self) -> Result<TrustMaterial, EventError> {
        let record = self
            .db
            .get_trust_backup(TRUST_USAGE)
            .await?
            .ok_or_else(|| EventError::NotFound("No backup trust material".to_string()))?;
        self.open(record)
    }

    pub async fn generations(&self) -> Result<TrustGenerations, EventError> {
        let current = self.current().await?;
        let previous = match self.get_unused().await {
            Ok(material) => Some(material),
            Err(EventError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        Ok(TrustGenerations { current, previous })
    }

    /// Copy the backup back over the current generation.
    ///
    /// Succeeds without change when there is no backup. Returns whether a
    /// rollback happened.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<bool, EventError> {
        let restored = self.db.restore_trust(TRUST_USAGE).await?;
        if restored {
            info!("Trust material rolled back to previous generation");
        } else {
            warn!("No backup trust material to restore");
        }
        Ok(restored)
    }

    /// Remove the backup generation. The current generation is never deleted.
    #[instrument(skip(self))]
    pub async fn delete(&self) -> Result<(), EventError> {
        if self.db.delete_trust_backup(TRUST_USAGE).await? {
            info!("Backup trust material deleted");
            Ok(())
        } else {
            Err(EventError::NotFound("No backup trust material".to_string()))
        }
    }

    fn open(&self, record: TrustRecord) -> Result<TrustMaterial, EventError> {
        let cert_pem = decrypt_utf8(self.cipher.as_ref(), &record.cert_blob)?;
        let crl_pem = record
            .crl_blob
            .as_deref()
            .map(|blob| decrypt_utf8(self.cipher.as_ref(), blob))
            .transpose()?;

        Ok(TrustMaterial {
            root_cert_id: record.root_cert_id,
            usage: record.usage,
            import_type: record.import_type,
            cert_pem,
            crl_pem,
            installed_at: record.installed_at,
        })
    }
}
