//! Normalized table of active alarms.

use tracing::{debug, info, instrument};

use super::AlarmObservation;
use crate::error::EventError;
use crate::storage::{ActiveAlarm, ActiveAlarmParams, EventDatabase};

/// Row changes applied by [`ActiveAlarmMirror::sync`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub raised: u64,
    pub cleared: u64,
}

#[derive(Clone)]
pub struct ActiveAlarmMirror {
    db: EventDatabase,
}

fn to_params(observation: &AlarmObservation) -> ActiveAlarmParams {
    ActiveAlarmParams {
        alarm_id: observation.alarm_id.clone(),
        alarm_instance: observation.alarm_instance.clone(),
        alarm_name: observation.alarm_name.clone(),
        alarm_type: observation.alarm_type.clone(),
        severity: observation.severity,
        created_at: observation.raised_at,
    }
}

impl ActiveAlarmMirror {
    pub const fn new(db: EventDatabase) -> Self {
        Self { db }
    }

    /// Record a single asserted alarm. Returns `false` if already present.
    pub async fn raise(&self, observation: &AlarmObservation) -> Result<bool, EventError> {
        let added = self.db.insert_active_alarm(&to_params(observation)).await?;
        if added {
            debug!(alarm_id = %observation.alarm_id, instance = %observation.alarm_instance, "Alarm raised");
        }
        Ok(added)
    }

    /// Remove a single alarm. Returns `false` if it was not present.
    pub async fn clear(&self, alarm_id: &str, alarm_instance: &str) -> Result<bool, EventError> {
        let removed = self.db.delete_active_alarm(alarm_id, alarm_instance).await?;
        if removed {
            debug!(alarm_id, instance = alarm_instance, "Alarm cleared");
        }
        Ok(removed)
    }

    pub async fn list(&self) -> Result<Vec<ActiveAlarm>, EventError> {
        Ok(self.db.list_active_alarms().await?)
    }

    /// Make the mirror equal to a full source snapshot.
    ///
    /// Alarms already mirrored keep their original raise time.
    #[instrument(skip_all, fields(observed = snapshot.len()))]
    pub async fn sync(&self, snapshot: &[AlarmObservation]) -> Result<SyncReport, EventError> {
        let params: Vec<ActiveAlarmParams> = snapshot.iter().map(to_params).collect();
        let (raised, cleared) = self.db.replace_active_alarms(&params).await?;

        if raised > 0 || cleared > 0 {
            info!(raised, cleared, "Active alarm mirror updated");
        }
        Ok(SyncReport { raised, cleared })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn observation(alarm_id: &str, raised_at: i64) -> AlarmObservation {
        AlarmObservation {
            alarm_id: alarm_id.to_string(),
            alarm_instance: "PSU1".to_string(),
            alarm_name: "Power supply failure".to_string(),
            alarm_type: "Alert".to_string(),
            severity: 0,
            raised_at,
        }
    }

    async fn mirror() -> ActiveAlarmMirror {
        ActiveAlarmMirror::new(EventDatabase::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn raise_and_clear() {
        let m = mirror().await;
        assert!(m.raise(&observation("00000001", 10)).await.unwrap());
        assert!(!m.raise(&observation("00000001", 10)).await.unwrap());
        assert_eq!(m.list().await.unwrap()[0].event_id(), "00000001&PSU1");

        assert!(m.clear("00000001", "PSU1").await.unwrap());
        assert!(!m.clear("00000001", "PSU1").await.unwrap());
        assert!(m.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sync_keeps_original_raise_time() {
        let m = mirror().await;
        m.sync(&[observation("00000001", 10)]).await.unwrap();

        let report = m
            .sync(&[observation("00000001", 99), observation("00000002", 20)])
            .await
            .unwrap();
        assert_eq!(report, SyncReport { raised: 1, cleared: 0 });

        let alarms = m.list().await.unwrap();
        let first = alarms.iter().find(|a| a.alarm_id == "00000001").unwrap();
        assert_eq!(first.created_at, 10);
    }

    #[tokio::test]
    async fn sync_with_empty_snapshot_clears_everything() {
        let m = mirror().await;
        m.sync(&[observation("00000001", 10), observation("00000002", 20)])
            .await
            .unwrap();

        let report = m.sync(&[]).await.unwrap();
        assert_eq!(report, SyncReport { raised: 0, cleared: 2 });
        assert!(m.list().await.unwrap().is_empty());
    }
}
