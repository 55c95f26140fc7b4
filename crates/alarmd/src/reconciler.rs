//! Diffs the active alarm mirror against the report task backlog.

use std::collections::HashSet;

use alarmd_core::db::unix_timestamp;
use tracing::{debug, info, instrument, warn};

use crate::error::EventError;
use crate::severity::SeverityProfile;
use crate::storage::{EventDatabase, ReportTaskParams, TaskStatus};
use crate::telemetry::{self, Counter};

/// Outcome of one reconcile cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// New `WAIT_ADD` tasks.
    pub raised: u64,
    /// Known-active tasks moved to `WAIT_DELETE`.
    pub cleared: u64,
    /// Alarms skipped because their severity has no mapping.
    pub unmapped: u64,
}

impl ReconcileReport {
    pub const fn is_empty(&self) -> bool {
        self.raised == 0 && self.cleared == 0
    }
}

pub struct TaskReconciler {
    db: EventDatabase,
    profile: SeverityProfile,
}

impl TaskReconciler {
    pub const fn new(db: EventDatabase, profile: SeverityProfile) -> Self {
        Self { db, profile }
    }

    /// Run one cycle. Re-running with unchanged inputs changes nothing.
    #[instrument(name = "reconcile", skip(self))]
    pub async fn run_cycle(&self) -> Result<ReconcileReport, EventError> {
        let Some(subscriber) = self.db.first_subscription().await? else {
            debug!("No subscription, nothing to reconcile");
            return Ok(ReconcileReport::default());
        };
        let subscriber_id = subscriber.id;

        let alarms = self.db.list_active_alarms().await?;
        let known: HashSet<String> = self
            .db
            .tasks_for_subscriber(subscriber_id, &TaskStatus::KNOWN_ACTIVE)
            .await?
            .into_iter()
            .map(|t| t.event_id)
            .collect();

        let mut report = ReconcileReport::default();
        let mut active = HashSet::with_capacity(alarms.len());

        for alarm in &alarms {
            let event_id = alarm.event_id();
            if known.contains(&event_id) {
                active.insert(event_id);
                continue;
            }

            let Some(severity) = self.profile.map(alarm.severity) else {
                warn!(event_id = %event_id, severity = alarm.severity, "No severity mapping, alarm not reported");
                report.unmapped += 1;
                active.insert(event_id);
                continue;
            };

            let inserted = self
                .db
                .insert_wait_add_task(&ReportTaskParams {
                    subscriber_id,
                    event_id: &event_id,
                    event_type: &alarm.alarm_type,
                    event_name: &alarm.alarm_name,
                    severity,
                    event_timestamp: alarm.created_at,
                })
                .await?;
            if inserted {
                debug!(subscriber_id, event_id = %event_id, "Report task created");
                report.raised += 1;
            }
            active.insert(event_id);
        }

        let vanished: Vec<String> = known.difference(&active).cloned().collect();
        if !vanished.is_empty() {
            report.cleared = self
                .db
                .mark_tasks_wait_delete(subscriber_id, &vanished, unix_timestamp())
                .await?;
        }

        telemetry::record(Counter::TasksCreated, report.raised);
        telemetry::record(Counter::TasksCleared, report.cleared);

        if !report.is_empty() {
            info!(
                subscriber_id,
                raised = report.raised,
                cleared = report.cleared,
                "Report tasks reconciled"
            );
        }

        Ok(report)
    }
}
