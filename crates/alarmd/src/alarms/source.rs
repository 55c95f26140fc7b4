//! Alarm sources.
//!
//! The only bundled source reads a JSON snapshot file of the form
//! `{"AlarMessages": [{"AlarmId": .., "AlarmInstance": .., "AlarmName": ..,
//! "Timestamp": .., "PerceivedSeverity": .., "Severity": ..}]}`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use super::{AlarmObservation, DEFAULT_ALARM_TYPE};
use crate::error::EventError;

/// Produces the full set of currently asserted alarms.
pub trait AlarmSource: Send + Sync {
    fn snapshot(&self) -> Result<Vec<AlarmObservation>, EventError>;
}

#[derive(Deserialize)]
struct Snapshot {
    #[serde(rename = "AlarMessages", default)]
    messages: Vec<serde_json::Value>,
}

/// Numeric fields arrive either as JSON numbers or as digit strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Int(i64),
    Text(String),
}

impl Numeric {
    fn value(&self) -> Option<i64> {
        match self {
            Self::Int(n) if *n >= 0 => Some(*n),
            Self::Int(_) => None,
            Self::Text(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.parse().ok(),
            Self::Text(_) => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawAlarm {
    alarm_id: String,
    alarm_instance: String,
    alarm_name: String,
    timestamp: Numeric,
    perceived_severity: Numeric,
    severity: Option<String>,
}

impl RawAlarm {
    fn into_observation(self) -> Option<AlarmObservation> {
        let Some(raised_at) = self.timestamp.value() else {
            warn!(alarm_id = %self.alarm_id, "Skipping alarm with invalid Timestamp");
            return None;
        };
        let Some(severity) = self.perceived_severity.value() else {
            warn!(alarm_id = %self.alarm_id, "Skipping alarm with invalid PerceivedSeverity");
            return None;
        };

        Some(AlarmObservation {
            alarm_type: self
                .severity
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_ALARM_TYPE.to_string()),
            alarm_id: self.alarm_id,
            alarm_instance: self.alarm_instance,
            alarm_name: self.alarm_name,
            severity,
            raised_at,
        })
    }
}

/// Parse a snapshot document, skipping malformed records.
///
/// Duplicate `(AlarmId, AlarmInstance)` pairs keep the first occurrence.
pub fn parse_alarm_snapshot(json: &str) -> Result<Vec<AlarmObservation>, EventError> {
    let snapshot: Snapshot = serde_json::from_str(json)
        .map_err(|e| EventError::Validation(format!("Malformed alarm snapshot: {e}")))?;

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(snapshot.messages.len());
    for value in snapshot.messages {
        let raw: RawAlarm = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Skipping malformed alarm record");
                continue;
            }
        };
        let Some(observation) = raw.into_observation() else {
            continue;
        };
        if seen.insert((observation.alarm_id.clone(), observation.alarm_instance.clone())) {
            out.push(observation);
        }
    }
    Ok(out)
}

/// Reads the alarm snapshot from a file on every call.
pub struct JsonFileAlarmSource {
    path: PathBuf,
}

impl JsonFileAlarmSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AlarmSource for JsonFileAlarmSource {
    fn snapshot(&self) -> Result<Vec<AlarmObservation>, EventError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            EventError::Persistence(format!(
                "Failed to read alarm source {}: {e}",
                self.path.display()
            ))
        })?;
        parse_alarm_snapshot(&content)
    }
}
