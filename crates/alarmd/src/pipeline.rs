//! The three periodic stages wired to one shared store.

use std::sync::Arc;

use alarmd_core::config::ScheduleConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::alarms::{ActiveAlarmMirror, AlarmSource};
use crate::delivery::{DeliveryWorker, SinkFactory};
use crate::error::EventError;
use crate::janitor::TaskJanitor;
use crate::reconciler::TaskReconciler;
use crate::scheduler::spawn_periodic;

pub struct Pipeline<F> {
    source: Option<Arc<dyn AlarmSource>>,
    mirror: ActiveAlarmMirror,
    reconciler: TaskReconciler,
    delivery: DeliveryWorker<F>,
    janitor: TaskJanitor,
}

impl<F: SinkFactory + 'static> Pipeline<F> {
    pub fn new(
        source: Option<Arc<dyn AlarmSource>>,
        mirror: ActiveAlarmMirror,
        reconciler: TaskReconciler,
        delivery: DeliveryWorker<F>,
        janitor: TaskJanitor,
    ) -> Self {
        Self {
            source,
            mirror,
            reconciler,
            delivery,
            janitor,
        }
    }

    /// Refresh the mirror from the alarm source, then reconcile tasks.
    ///
    /// A failed source read aborts the cycle so the mirror is never wiped
    /// by a transient read error.
    pub async fn reconcile(&self) -> Result<(), EventError> {
        if let Some(source) = &self.source {
            let source = Arc::clone(source);
            let snapshot = tokio::task::spawn_blocking(move || source.snapshot())
                .await
                .map_err(|e| EventError::Persistence(format!("Alarm source read aborted: {e}")))??;
            self.mirror.sync(&snapshot).await?;
        }
        self.reconciler.run_cycle().await?;
        Ok(())
    }

    pub async fn deliver(&self) -> Result<(), EventError> {
        let report = self.delivery.run_cycle().await?;
        debug!(?report, "Delivery cycle finished");
        Ok(())
    }

    pub async fn purge(&self) -> Result<(), EventError> {
        self.janitor.run_cycle().await?;
        Ok(())
    }

    /// Start all three loops, staggered reconcile, delivery, janitor.
    pub fn spawn(
        self: Arc<Self>,
        schedule: &ScheduleConfig,
        shutdown: &watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let reconcile = Arc::clone(&self);
        let deliver = Arc::clone(&self);
        let purge = self;

        vec![
            spawn_periodic(
                "reconcile",
                schedule.reconcile_start_delay(),
                schedule.reconcile_interval(),
                shutdown.clone(),
                move || {
                    let p = Arc::clone(&reconcile);
                    async move { p.reconcile().await }
                },
            ),
            spawn_periodic(
                "delivery",
                schedule.delivery_start_delay(),
                schedule.delivery_interval(),
                shutdown.clone(),
                move || {
                    let p = Arc::clone(&deliver);
                    async move { p.deliver().await }
                },
            ),
            spawn_periodic(
                "janitor",
                schedule.janitor_start_delay(),
                schedule.janitor_interval(),
                shutdown.clone(),
                move || {
                    let p = Arc::clone(&purge);
                    async move { p.purge().await }
                },
            ),
        ]
    }
}
