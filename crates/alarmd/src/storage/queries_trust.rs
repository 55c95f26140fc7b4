//! Trust material queries.
//!
//! The current generation lives in `trust_material`; the generation it
//! replaced lives in `trust_material_backup`. Both are keyed by usage.

use super::db::{DatabaseError, EventDatabase};
use super::models::TrustRecord;
use alarmd_core::db::unix_timestamp;

/// Parameters for installing a trust generation.
pub struct TrustParams<'a> {
    pub root_cert_id: i64,
    pub usage: &'a str,
    pub import_type: &'a str,
    pub cert_blob: &'a [u8],
    pub crl_blob: Option<&'a [u8]>,
}

const COPY_COLUMNS: &str = "root_cert_id, usage, import_type, cert_blob, crl_blob, installed_at";

impl EventDatabase {
    pub async fn get_trust(&self, usage: &str) -> Result<Option<TrustRecord>, DatabaseError> {
        let record =
            sqlx::query_as::<_, TrustRecord>("SELECT * FROM trust_material WHERE usage = ?")
                .bind(usage)
                .fetch_optional(self.pool())
                .await?;

        Ok(record)
    }

    pub async fn get_trust_backup(
        &self,
        usage: &str,
    ) -> Result<Option<TrustRecord>, DatabaseError> {
        let record =
            sqlx::query_as::<_, TrustRecord>("SELECT * FROM trust_material_backup WHERE usage = ?")
                .bind(usage)
                .fetch_optional(self.pool())
                .await?;

        Ok(record)
    }

    /// Install a new current generation.
    ///
    /// In one transaction the existing current row (if any) overwrites the
    /// backup, then the new row replaces the current one.
    pub async fn install_trust(&self, params: &TrustParams<'_>) -> Result<(), DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let has_current: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM trust_material WHERE usage = ?")
                .bind(params.usage)
                .fetch_optional(&mut *tx)
                .await?;

        if has_current.is_some() {
            sqlx::query("DELETE FROM trust_material_backup WHERE usage = ?")
                .bind(params.usage)
                .execute(&mut *tx)
                .await?;

            sqlx::query(&format!(
                "INSERT INTO trust_material_backup ({COPY_COLUMNS}) \
                 SELECT {COPY_COLUMNS} FROM trust_material WHERE usage = ?"
            ))
            .bind(params.usage)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM trust_material WHERE usage = ?")
                .bind(params.usage)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(&format!(
            "INSERT INTO trust_material ({COPY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)"
        ))
        .bind(params.root_cert_id)
        .bind(params.usage)
        .bind(params.import_type)
        .bind(params.cert_blob)
        .bind(params.crl_blob)
        .bind(unix_timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Copy the backup generation back over the current one.
    ///
    /// Returns `false` (and changes nothing) when there is no backup.
    pub async fn restore_trust(&self, usage: &str) -> Result<bool, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let has_backup: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM trust_material_backup WHERE usage = ?")
                .bind(usage)
                .fetch_optional(&mut *tx)
                .await?;

        if has_backup.is_none() {
            return Ok(false);
        }

        sqlx::query("DELETE FROM trust_material WHERE usage = ?")
            .bind(usage)
            .execute(&mut *tx)
            .await?;

        sqlx::query(&format!(
            "INSERT INTO trust_material ({COPY_COLUMNS}) \
             SELECT {COPY_COLUMNS} FROM trust_material_backup WHERE usage = ?"
        ))
        .bind(usage)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(true)
    }

    /// Remove the backup generation. The current generation is never touched.
    pub async fn delete_trust_backup(&self, usage: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM trust_material_backup WHERE usage = ?")
            .bind(usage)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Attach a CRL to the current generation in place.
    pub async fn set_trust_crl(&self, usage: &str, crl_blob: &[u8]) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE trust_material SET crl_blob = ? WHERE usage = ?")
            .bind(crl_blob)
            .bind(usage)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
