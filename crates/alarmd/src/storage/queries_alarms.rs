//! Active alarm mirror queries.

use std::collections::HashSet;

use super::db::{DatabaseError, EventDatabase};
use super::models::ActiveAlarm;

/// Parameters for recording an asserted alarm.
#[derive(Debug, Clone)]
pub struct ActiveAlarmParams {
    pub alarm_id: String,
    pub alarm_instance: String,
    pub alarm_name: String,
    pub alarm_type: String,
    pub severity: i64,
    pub created_at: i64,
}

const INSERT_ALARM_SQL: &str = "INSERT INTO active_alarms (alarm_id, alarm_instance, alarm_name, alarm_type, severity, created_at) \
     VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT (alarm_id, alarm_instance) DO NOTHING";

impl EventDatabase {
    /// Record an asserted alarm. Returns `false` if it was already present.
    pub async fn insert_active_alarm(
        &self,
        params: &ActiveAlarmParams,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(INSERT_ALARM_SQL)
            .bind(&params.alarm_id)
            .bind(&params.alarm_instance)
            .bind(&params.alarm_name)
            .bind(&params.alarm_type)
            .bind(params.severity)
            .bind(params.created_at)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_active_alarm(
        &self,
        alarm_id: &str,
        alarm_instance: &str,
    ) -> Result<bool, DatabaseError> {
        let result =
            sqlx::query("DELETE FROM active_alarms WHERE alarm_id = ? AND alarm_instance = ?")
                .bind(alarm_id)
                .bind(alarm_instance)
                .execute(self.pool())
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_active_alarms(&self) -> Result<Vec<ActiveAlarm>, DatabaseError> {
        let alarms = sqlx::query_as::<_, ActiveAlarm>(
            "SELECT * FROM active_alarms ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(alarms)
    }

    /// Make the mirror equal to `observed` in one transaction.
    ///
    /// Returns `(inserted, removed)` row counts. Rows already present keep
    /// their original `created_at`.
    pub async fn replace_active_alarms(
        &self,
        observed: &[ActiveAlarmParams],
    ) -> Result<(u64, u64), DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let existing: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, alarm_id, alarm_instance FROM active_alarms")
                .fetch_all(&mut *tx)
                .await?;

        let wanted: HashSet<(&str, &str)> = observed
            .iter()
            .map(|a| (a.alarm_id.as_str(), a.alarm_instance.as_str()))
            .collect();

        let mut removed = 0;
        for (id, alarm_id, alarm_instance) in &existing {
            if !wanted.contains(&(alarm_id.as_str(), alarm_instance.as_str())) {
                removed += sqlx::query("DELETE FROM active_alarms WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            }
        }

        let mut inserted = 0;
        for params in observed {
            inserted += sqlx::query(INSERT_ALARM_SQL)
                .bind(&params.alarm_id)
                .bind(&params.alarm_instance)
                .bind(&params.alarm_name)
                .bind(&params.alarm_type)
                .bind(params.severity)
                .bind(params.created_at)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;

        Ok((inserted, removed))
    }
}
