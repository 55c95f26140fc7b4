//! Wire format of delivered events.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::storage::{AlarmReportTask, TaskStatus};

/// Whether a delivered event reports a raise or a clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlarmStatus {
    Raised,
    Cleared,
}

impl AlarmStatus {
    const fn for_status(status: TaskStatus) -> Option<Self> {
        match status {
            TaskStatus::WaitAdd => Some(Self::Raised),
            TaskStatus::WaitDelete => Some(Self::Cleared),
            TaskStatus::Added | TaskStatus::Deleted => None,
        }
    }
}

/// One element of the JSON array POSTed to the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventRecord {
    pub event_type: String,
    pub event_id: String,
    pub event_name: String,
    pub severity: String,
    pub event_detail: String,
    pub reason: String,
    /// RFC 3339, UTC.
    pub event_timestamp: String,
    pub oem: Oem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Oem {
    #[serde(rename = "Public")]
    pub public: PublicOem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicOem {
    #[serde(rename = "specificProblemID")]
    pub specific_problem_id: String,
    pub specific_problem: String,
    pub object_name: String,
    pub alarm_status: AlarmStatus,
}

fn format_timestamp(unix_secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(unix_secs, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl EventRecord {
    /// Build the record for a pending task.
    ///
    /// Returns `None` for terminal tasks and for event ids that are not
    /// `alarmId&alarmInstance`.
    pub fn from_task(task: &AlarmReportTask) -> Option<Self> {
        let alarm_status = AlarmStatus::for_status(task.status()?)?;
        let (alarm_id, alarm_instance) = task.event_id.split_once('&')?;

        Some(Self {
            event_type: task.event_type.clone(),
            event_id: task.event_id.clone(),
            event_name: task.event_name.clone(),
            severity: task.severity.clone(),
            event_detail: task.event_detail.clone(),
            reason: task.reason.clone(),
            event_timestamp: format_timestamp(task.event_timestamp),
            oem: Oem {
                public: PublicOem {
                    specific_problem_id: alarm_id.to_string(),
                    specific_problem: task.event_name.clone(),
                    object_name: alarm_instance.to_string(),
                    alarm_status,
                },
            },
        })
    }
}
