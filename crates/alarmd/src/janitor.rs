//! Garbage collection of report tasks left behind by deleted subscriptions.

use tracing::{debug, info, instrument};

use crate::error::EventError;
use crate::storage::EventDatabase;
use crate::telemetry::{self, Counter};

pub struct TaskJanitor {
    db: EventDatabase,
}

impl TaskJanitor {
    pub const fn new(db: EventDatabase) -> Self {
        Self { db }
    }

    /// Delete terminal tasks whose subscriber no longer exists.
    ///
    /// Pending tasks survive so a re-registered subscriber still receives
    /// them. Returns the number of rows removed.
    #[instrument(name = "janitor", skip(self))]
    pub async fn run_cycle(&self) -> Result<u64, EventError> {
        let live = self.db.list_subscription_ids().await?;
        let purged = self.db.purge_orphan_tasks(&live).await?;

        telemetry::record(Counter::TasksPurged, purged);
        if purged > 0 {
            info!(count = purged, "Orphan report tasks purged");
        } else {
            debug!("No orphan report tasks");
        }
        Ok(purged)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::{ReportTaskParams, SubscriptionParams, TaskStatus};

    async fn db_with_subscription() -> EventDatabase {
        let db = EventDatabase::open_in_memory().await.unwrap();
        db.insert_subscription_if_vacant(&SubscriptionParams {
            id: 1,
            destination: "https://10.0.0.1/hook",
            event_types: "Alert",
            protocol: "Redfish",
            credential: b"sealed",
        })
        .await
        .unwrap();
        db
    }

    async fn add_task(db: &EventDatabase, event_id: &str, status: TaskStatus) {
        db.insert_wait_add_task(&ReportTaskParams {
            subscriber_id: 1,
            event_id,
            event_type: "Alert",
            event_name: "Disk failure",
            severity: "Major",
            event_timestamp: 1_700_000_000,
        })
        .await
        .unwrap();
        let ids = vec![event_id.to_string()];
        match status {
            TaskStatus::WaitAdd => {}
            TaskStatus::Added => {
                db.advance_tasks(1, &ids, TaskStatus::WaitAdd, TaskStatus::Added)
                    .await
                    .unwrap();
            }
            TaskStatus::WaitDelete => {
                db.mark_tasks_wait_delete(1, &ids, 1).await.unwrap();
            }
            TaskStatus::Deleted => {
                db.mark_tasks_wait_delete(1, &ids, 1).await.unwrap();
                db.advance_tasks(1, &ids, TaskStatus::WaitDelete, TaskStatus::Deleted)
                    .await
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn live_subscriber_tasks_survive() {
        let db = db_with_subscription().await;
        add_task(&db, "A&0", TaskStatus::Added).await;
        add_task(&db, "B&0", TaskStatus::Deleted).await;

        assert_eq!(TaskJanitor::new(db.clone()).run_cycle().await.unwrap(), 0);
        assert_eq!(db.list_tasks().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn orphaned_terminal_tasks_are_purged() {
        let db = db_with_subscription().await;
        add_task(&db, "A&0", TaskStatus::Added).await;
        add_task(&db, "B&0", TaskStatus::Deleted).await;
        add_task(&db, "C&0", TaskStatus::WaitAdd).await;
        add_task(&db, "D&0", TaskStatus::WaitDelete).await;
        db.delete_subscription(1).await.unwrap();

        assert_eq!(TaskJanitor::new(db.clone()).run_cycle().await.unwrap(), 2);

        let mut left: Vec<String> = db
            .list_tasks()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.event_id)
            .collect();
        left.sort();
        assert_eq!(left, vec!["C&0".to_string(), "D&0".to_string()]);
    }
}
