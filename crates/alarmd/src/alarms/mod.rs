//! Mirror of currently asserted hardware alarms and the sources feeding it.

mod mirror;
mod source;

pub use mirror::{ActiveAlarmMirror, SyncReport};
pub use source::{AlarmSource, JsonFileAlarmSource, parse_alarm_snapshot};

/// Alarm type recorded when the source does not name one.
pub const DEFAULT_ALARM_TYPE: &str = "Alert";

/// One alarm occurrence as reported by an alarm source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmObservation {
    pub alarm_id: String,
    pub alarm_instance: String,
    pub alarm_name: String,
    pub alarm_type: String,
    /// Internal severity code (`0` critical, `1` major, `2` minor).
    pub severity: i64,
    /// Unix seconds at which the alarm was raised.
    pub raised_at: i64,
}
