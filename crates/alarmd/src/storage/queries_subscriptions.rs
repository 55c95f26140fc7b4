//! Subscription queries.

use super::db::{DatabaseError, EventDatabase};
use super::models::Subscription;
use alarmd_core::db::unix_timestamp;

/// Parameters for inserting a subscription.
pub struct SubscriptionParams<'a> {
    pub id: i64,
    pub destination: &'a str,
    pub event_types: &'a str,
    pub protocol: &'a str,
    pub credential: &'a [u8],
}

impl EventDatabase {
    /// Insert the subscription only if the table is empty.
    ///
    /// Returns `false` when a subscription already exists.
    pub async fn insert_subscription_if_vacant(
        &self,
        params: &SubscriptionParams<'_>,
    ) -> Result<bool, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            "INSERT INTO subscriptions (id, destination, event_types, protocol, credential, created_at, updated_at) \
             SELECT ?, ?, ?, ?, ?, ?, ? WHERE NOT EXISTS (SELECT 1 FROM subscriptions)",
        )
        .bind(params.id)
        .bind(params.destination)
        .bind(params.event_types)
        .bind(params.protocol)
        .bind(params.credential)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_subscription(&self, id: i64) -> Result<Option<Subscription>, DatabaseError> {
        let sub = sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(sub)
    }

    /// The single subscription, if any.
    pub async fn first_subscription(&self) -> Result<Option<Subscription>, DatabaseError> {
        let sub =
            sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions ORDER BY id LIMIT 1")
                .fetch_optional(self.pool())
                .await?;

        Ok(sub)
    }

    pub async fn list_subscription_ids(&self) -> Result<Vec<i64>, DatabaseError> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM subscriptions ORDER BY id")
            .fetch_all(self.pool())
            .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn count_subscriptions(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM subscriptions")
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }

    /// Replace the stored credential blob.
    pub async fn update_subscription_credential(
        &self,
        id: i64,
        credential: &[u8],
    ) -> Result<bool, DatabaseError> {
        let result =
            sqlx::query("UPDATE subscriptions SET credential = ?, updated_at = ? WHERE id = ?")
                .bind(credential)
                .bind(unix_timestamp())
                .bind(id)
                .execute(self.pool())
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a subscription row. Its report tasks are left for the janitor.
    pub async fn delete_subscription(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
