//! Report task queries.
//!
//! Every status transition is a compare-and-swap: the update names the
//! status it expects to find, so a row that moved underneath a cycle is
//! left alone.

use sqlx::{QueryBuilder, Sqlite};

use super::db::{DatabaseError, EventDatabase};
use super::models::{AlarmReportTask, TaskStatus};

/// Parameters for creating a `WAIT_ADD` task.
pub struct ReportTaskParams<'a> {
    pub subscriber_id: i64,
    pub event_id: &'a str,
    pub event_type: &'a str,
    pub event_name: &'a str,
    pub severity: &'a str,
    pub event_timestamp: i64,
}

fn push_status_list(qb: &mut QueryBuilder<'_, Sqlite>, statuses: &[TaskStatus]) {
    qb.push("task_status IN (");
    let mut sep = qb.separated(", ");
    for status in statuses {
        sep.push_bind(status.as_str());
    }
    sep.push_unseparated(")");
}

fn push_event_id_list<'a>(qb: &mut QueryBuilder<'a, Sqlite>, event_ids: &'a [String]) {
    qb.push("event_id IN (");
    let mut sep = qb.separated(", ");
    for event_id in event_ids {
        sep.push_bind(event_id.as_str());
    }
    sep.push_unseparated(")");
}

impl EventDatabase {
    /// Create a `WAIT_ADD` task unless a live task for the same
    /// subscriber and event already exists.
    ///
    /// Returns `true` if a row was inserted.
    pub async fn insert_wait_add_task(
        &self,
        params: &ReportTaskParams<'_>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO alarm_report_tasks (subscriber_id, event_id, event_type, event_name, severity, event_timestamp, task_status) \
             VALUES (?, ?, ?, ?, ?, ?, 'WAIT_ADD') \
             ON CONFLICT (subscriber_id, event_id) WHERE task_status <> 'DELETED' DO NOTHING",
        )
        .bind(params.subscriber_id)
        .bind(params.event_id)
        .bind(params.event_type)
        .bind(params.event_name)
        .bind(params.severity)
        .bind(params.event_timestamp)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Tasks of one subscriber in any of the given statuses.
    pub async fn tasks_for_subscriber(
        &self,
        subscriber_id: i64,
        statuses: &[TaskStatus],
    ) -> Result<Vec<AlarmReportTask>, DatabaseError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM alarm_report_tasks WHERE subscriber_id = ");
        qb.push_bind(subscriber_id);
        qb.push(" AND ");
        push_status_list(&mut qb, statuses);
        qb.push(" ORDER BY id ASC");

        let tasks = qb
            .build_query_as::<AlarmReportTask>()
            .fetch_all(self.pool())
            .await?;

        Ok(tasks)
    }

    /// Tasks of every subscriber in any of the given statuses, ordered by
    /// subscriber then creation.
    pub async fn tasks_with_status(
        &self,
        statuses: &[TaskStatus],
    ) -> Result<Vec<AlarmReportTask>, DatabaseError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM alarm_report_tasks WHERE ");
        push_status_list(&mut qb, statuses);
        qb.push(" ORDER BY subscriber_id ASC, id ASC");

        let tasks = qb
            .build_query_as::<AlarmReportTask>()
            .fetch_all(self.pool())
            .await?;

        Ok(tasks)
    }

    pub async fn list_tasks(&self) -> Result<Vec<AlarmReportTask>, DatabaseError> {
        let tasks = sqlx::query_as::<_, AlarmReportTask>(
            "SELECT * FROM alarm_report_tasks ORDER BY subscriber_id ASC, id ASC",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(tasks)
    }

    /// Move known-active tasks of vanished alarms to `WAIT_DELETE`,
    /// stamping the clear time.
    ///
    /// Only rows still in `WAIT_ADD` or `ADDED` are touched.
    pub async fn mark_tasks_wait_delete(
        &self,
        subscriber_id: i64,
        event_ids: &[String],
        cleared_at: i64,
    ) -> Result<u64, DatabaseError> {
        if event_ids.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE alarm_report_tasks SET task_status = ");
        qb.push_bind(TaskStatus::WaitDelete.as_str());
        qb.push(", event_timestamp = ");
        qb.push_bind(cleared_at);
        qb.push(" WHERE subscriber_id = ");
        qb.push_bind(subscriber_id);
        qb.push(" AND ");
        push_event_id_list(&mut qb, event_ids);
        qb.push(" AND ");
        push_status_list(&mut qb, &TaskStatus::KNOWN_ACTIVE);

        let result = qb.build().execute(self.pool()).await?;

        Ok(result.rows_affected())
    }

    /// Conditionally advance tasks from `from` to `to`.
    ///
    /// Rows whose status is no longer `from` are skipped.
    pub async fn advance_tasks(
        &self,
        subscriber_id: i64,
        event_ids: &[String],
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<u64, DatabaseError> {
        if event_ids.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE alarm_report_tasks SET task_status = ");
        qb.push_bind(to.as_str());
        qb.push(" WHERE subscriber_id = ");
        qb.push_bind(subscriber_id);
        qb.push(" AND task_status = ");
        qb.push_bind(from.as_str());
        qb.push(" AND ");
        push_event_id_list(&mut qb, event_ids);

        let result = qb.build().execute(self.pool()).await?;

        Ok(result.rows_affected())
    }

    /// Delete terminal (`ADDED`, `DELETED`) tasks whose subscriber is not in
    /// `live_subscribers`. Pending tasks are never purged.
    pub async fn purge_orphan_tasks(&self, live_subscribers: &[i64]) -> Result<u64, DatabaseError> {
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM alarm_report_tasks WHERE ");
        push_status_list(&mut qb, &[TaskStatus::Added, TaskStatus::Deleted]);

        if !live_subscribers.is_empty() {
            qb.push(" AND subscriber_id NOT IN (");
            let mut sep = qb.separated(", ");
            for id in live_subscribers {
                sep.push_bind(*id);
            }
            sep.push_unseparated(")");
        }

        let result = qb.build().execute(self.pool()).await?;

        Ok(result.rows_affected())
    }
}
