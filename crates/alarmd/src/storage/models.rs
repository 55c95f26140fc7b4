//! Data models for event pipeline storage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Usage key under which the event subscription trust material is stored.
pub const TRUST_USAGE: &str = "EventSubscription";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: i64,
    pub destination: String,
    /// Comma-separated event type names.
    pub event_types: String,
    pub protocol: String,
    /// Encrypted auth token.
    #[serde(skip)]
    pub credential: Vec<u8>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Subscription {
    pub fn event_type_names(&self) -> impl Iterator<Item = &str> {
        self.event_types.split(',').filter(|s| !s.is_empty())
    }
}

/// A stored trust generation. Certificate and CRL bodies are encrypted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrustRecord {
    pub id: i64,
    pub root_cert_id: i64,
    pub usage: String,
    pub import_type: String,
    pub cert_blob: Vec<u8>,
    pub crl_blob: Option<Vec<u8>>,
    pub installed_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActiveAlarm {
    pub id: i64,
    pub alarm_id: String,
    pub alarm_instance: String,
    pub alarm_name: String,
    pub alarm_type: String,
    pub severity: i64,
    pub created_at: i64,
}

impl ActiveAlarm {
    pub fn event_id(&self) -> String {
        event_id(&self.alarm_id, &self.alarm_instance)
    }
}

/// Compose the event identity of an alarm occurrence.
pub fn event_id(alarm_id: &str, alarm_instance: &str) -> String {
    format!("{alarm_id}&{alarm_instance}")
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AlarmReportTask {
    pub id: i64,
    pub subscriber_id: i64,
    pub event_id: String,
    pub event_type: String,
    pub event_name: String,
    pub severity: String,
    pub event_detail: String,
    pub reason: String,
    pub event_timestamp: i64,
    pub task_status: String,
}

impl AlarmReportTask {
    pub fn status(&self) -> Option<TaskStatus> {
        self.task_status.parse().ok()
    }
}

/// Lifecycle of a report task.
///
/// `WaitAdd -> Added -> WaitDelete -> Deleted`, with `WaitAdd -> WaitDelete`
/// when an alarm clears before its raise was ever delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "WAIT_ADD")]
    WaitAdd,
    #[serde(rename = "ADDED")]
    Added,
    #[serde(rename = "WAIT_DELETE")]
    WaitDelete,
    #[serde(rename = "DELETED")]
    Deleted,
}

impl TaskStatus {
    /// Statuses the delivery worker still has to push.
    pub const PENDING: [Self; 2] = [Self::WaitAdd, Self::WaitDelete];

    /// Statuses the reconciler treats as a known-active alarm.
    pub const KNOWN_ACTIVE: [Self; 2] = [Self::WaitAdd, Self::Added];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WaitAdd => "WAIT_ADD",
            Self::Added => "ADDED",
            Self::WaitDelete => "WAIT_DELETE",
            Self::Deleted => "DELETED",
        }
    }

    /// The status a successful delivery moves a pending task to.
    pub const fn delivered(self) -> Option<Self> {
        match self {
            Self::WaitAdd => Some(Self::Added),
            Self::WaitDelete => Some(Self::Deleted),
            Self::Added | Self::Deleted => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAIT_ADD" => Ok(Self::WaitAdd),
            "ADDED" => Ok(Self::Added),
            "WAIT_DELETE" => Ok(Self::WaitDelete),
            "DELETED" => Ok(Self::Deleted),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}
