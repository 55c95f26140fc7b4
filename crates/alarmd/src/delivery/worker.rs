//! Drains pending report tasks and advances them on confirmed delivery.

use std::collections::BTreeMap;

use tracing::{debug, error, info, instrument, warn};

use super::payload::EventRecord;
use super::sink::{EventSink, SinkFactory};
use crate::error::EventError;
use crate::storage::{AlarmReportTask, EventDatabase, TaskStatus};
use crate::subscription::{SubscriptionStore, validate_destination};
use crate::telemetry::{self, Counter};
use crate::trust::CertTrustManager;

/// Only these statuses confirm a delivery.
pub const fn is_delivery_success(status: u16) -> bool {
    matches!(status, 200 | 201)
}

/// Outcome of one delivery cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscriber groups whose batch was accepted.
    pub delivered_groups: u64,
    /// Subscriber groups whose batch failed and will be retried.
    pub failed_groups: u64,
    /// Tasks advanced to `ADDED` or `DELETED`.
    pub advanced: u64,
    /// Set when the cycle did nothing because no trust material exists.
    pub skipped_no_trust: bool,
}

pub struct DeliveryWorker<F> {
    db: EventDatabase,
    subscriptions: SubscriptionStore,
    trust: CertTrustManager,
    factory: F,
}

impl<F: SinkFactory> DeliveryWorker<F> {
    pub const fn new(
        db: EventDatabase,
        subscriptions: SubscriptionStore,
        trust: CertTrustManager,
        factory: F,
    ) -> Self {
        Self {
            db,
            subscriptions,
            trust,
            factory,
        }
    }

    /// Run one cycle. Failed groups are left untouched for the next cycle.
    #[instrument(name = "delivery", skip(self))]
    pub async fn run_cycle(&self) -> Result<DeliveryReport, EventError> {
        let mut report = DeliveryReport::default();

        let pending = self.db.tasks_with_status(&TaskStatus::PENDING).await?;
        if pending.is_empty() {
            debug!("No pending report tasks");
            return Ok(report);
        }

        let Some(trust) = self.trust.current().await? else {
            warn!(pending = pending.len(), "No trust material installed, delivery skipped");
            report.skipped_no_trust = true;
            return Ok(report);
        };
        let sink = self.factory.build(&trust)?;

        for (subscriber_id, group) in group_by_subscriber(pending) {
            match self.deliver_group(&sink, subscriber_id, &group).await {
                Ok(Some(advanced)) => {
                    report.delivered_groups += 1;
                    report.advanced += advanced;
                }
                Ok(None) => {}
                Err(e) => {
                    telemetry::record(Counter::DeliveryFailures, 1);
                    report.failed_groups += 1;
                    if e.is_recoverable() {
                        warn!(subscriber_id, error = %e, "Delivery failed, will retry next cycle");
                    } else {
                        error!(subscriber_id, error = %e, "Delivery failed");
                    }
                }
            }
        }

        Ok(report)
    }

    /// Deliver one subscriber's batch.
    ///
    /// Returns `None` when nothing was sent.
    async fn deliver_group(
        &self,
        sink: &F::Sink,
        subscriber_id: i64,
        group: &[AlarmReportTask],
    ) -> Result<Option<u64>, EventError> {
        let Some(subscriber) = self.db.get_subscription(subscriber_id).await? else {
            debug!(subscriber_id, tasks = group.len(), "Subscriber gone, tasks left pending");
            return Ok(None);
        };
        validate_destination(&subscriber.destination)?;
        let credential = self.subscriptions.credential(&subscriber)?;

        let (events, sent): (Vec<EventRecord>, Vec<&AlarmReportTask>) = group
            .iter()
            .filter_map(|task| EventRecord::from_task(task).map(|record| (record, task)))
            .unzip();
        if events.is_empty() {
            warn!(subscriber_id, tasks = group.len(), "No deliverable report tasks in group");
            return Ok(None);
        }

        telemetry::record(Counter::DeliveryAttempts, 1);
        let status = sink
            .post(&subscriber.destination, &credential, &events)
            .await?;
        if !is_delivery_success(status) {
            return Err(EventError::Transport(format!(
                "Destination answered HTTP {status}"
            )));
        }

        let advanced = self.advance(subscriber_id, &sent).await?;
        info!(
            subscriber_id,
            sent = events.len(),
            advanced,
            status,
            "Report tasks delivered"
        );
        Ok(Some(advanced))
    }

    /// Advance exactly the tasks named in the accepted request, each only
    /// from the status it was sent with.
    async fn advance(&self, subscriber_id: i64, sent: &[&AlarmReportTask]) -> Result<u64, EventError> {
        let mut advanced = 0;
        for from in TaskStatus::PENDING {
            let Some(to) = from.delivered() else {
                continue;
            };
            let event_ids: Vec<String> = sent
                .iter()
                .filter(|task| task.status() == Some(from))
                .map(|task| task.event_id.clone())
                .collect();
            advanced += self
                .db
                .advance_tasks(subscriber_id, &event_ids, from, to)
                .await?;
        }
        Ok(advanced)
    }
}

fn group_by_subscriber(tasks: Vec<AlarmReportTask>) -> BTreeMap<i64, Vec<AlarmReportTask>> {
    let mut groups: BTreeMap<i64, Vec<AlarmReportTask>> = BTreeMap::new();
    for task in tasks {
        groups.entry(task.subscriber_id).or_default().push(task);
    }
    groups
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use alarmd_crypto::certs::generate_ca;
    use alarmd_crypto::{AeadCredentialCipher, CredentialCipher, CredentialKey};

    use super::*;
    use crate::storage::ReportTaskParams;
    use crate::subscription::{EventType, NewSubscription, Protocol};
    use crate::trust::TrustMaterial;

    #[derive(Debug, Clone)]
    struct Request {
        destination: String,
        credential: String,
        events: Vec<EventRecord>,
    }

    #[derive(Default)]
    struct Script {
        responses: VecDeque<Result<u16, EventError>>,
        requests: Vec<Request>,
    }

    /// Records requests and answers from a script, defaulting to 200.
    #[derive(Clone, Default)]
    struct ScriptedSink(Arc<Mutex<Script>>);

    impl ScriptedSink {
        fn respond(&self, response: Result<u16, EventError>) {
            self.0.lock().unwrap().responses.push_back(response);
        }

        fn requests(&self) -> Vec<Request> {
            self.0.lock().unwrap().requests.clone()
        }
    }

    impl EventSink for ScriptedSink {
        async fn post(
            &self,
            destination: &str,
            credential: &str,
            events: &[EventRecord],
        ) -> Result<u16, EventError> {
            let mut script = self.0.lock().unwrap();
            script.requests.push(Request {
                destination: destination.to_string(),
                credential: credential.to_string(),
                events: events.to_vec(),
            });
            script.responses.pop_front().unwrap_or(Ok(200))
        }
    }

    impl SinkFactory for ScriptedSink {
        type Sink = Self;

        fn build(&self, _trust: &TrustMaterial) -> Result<Self, EventError> {
            Ok(self.clone())
        }
    }

    struct Fixture {
        db: EventDatabase,
        worker: DeliveryWorker<ScriptedSink>,
        sink: ScriptedSink,
        trust: CertTrustManager,
        subscriptions: SubscriptionStore,
    }

    async fn fixture() -> Fixture {
        let db = EventDatabase::open_in_memory().await.unwrap();
        let cipher: Arc<dyn CredentialCipher> =
            Arc::new(AeadCredentialCipher::new(&CredentialKey::generate()));
        let subscriptions = SubscriptionStore::new(db.clone(), Arc::clone(&cipher));
        let trust = CertTrustManager::new(db.clone(), cipher);
        let sink = ScriptedSink::default();
        let worker = DeliveryWorker::new(
            db.clone(),
            subscriptions.clone(),
            trust.clone(),
            sink.clone(),
        );
        Fixture {
            db,
            worker,
            sink,
            trust,
            subscriptions,
        }
    }

    async fn ready_fixture() -> Fixture {
        let f = fixture().await;
        f.subscriptions
            .create(&NewSubscription {
                destination: "https://10.0.0.1/hook".to_string(),
                event_types: vec![EventType::Alert],
                protocol: Protocol::Redfish,
                credential: "token-abc".to_string(),
            })
            .await
            .unwrap();
        let ca = generate_ca("Acme").unwrap();
        f.trust.install_trust(1, &ca.ca_cert_pem, None).await.unwrap();
        f
    }

    async fn add_task(db: &EventDatabase, subscriber_id: i64, event_id: &str) {
        db.insert_wait_add_task(&ReportTaskParams {
            subscriber_id,
            event_id,
            event_type: "Alert",
            event_name: "Fan failure",
            severity: "Critical",
            event_timestamp: 1_700_000_000,
        })
        .await
        .unwrap();
    }

    async fn statuses(db: &EventDatabase) -> Vec<(String, TaskStatus)> {
        db.list_tasks()
            .await
            .unwrap()
            .into_iter()
            .map(|t| {
                let status = t.status().unwrap();
                (t.event_id, status)
            })
            .collect()
    }

    #[test]
    fn only_200_and_201_confirm_delivery() {
        assert!(is_delivery_success(200));
        assert!(is_delivery_success(201));
        assert!(!is_delivery_success(202));
        assert!(!is_delivery_success(204));
        assert!(!is_delivery_success(500));
    }

    #[tokio::test]
    async fn success_advances_sent_tasks() {
        let f = ready_fixture().await;
        add_task(&f.db, 1, "00000001&0").await;

        let report = f.worker.run_cycle().await.unwrap();
        assert_eq!(report.advanced, 1);
        assert_eq!(statuses(&f.db).await, vec![("00000001&0".to_string(), TaskStatus::Added)]);

        let requests = f.sink.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].destination, "https://10.0.0.1/hook");
        assert_eq!(requests[0].credential, "token-abc");
        assert_eq!(requests[0].events[0].event_id, "00000001&0");
    }

    #[tokio::test]
    async fn created_status_also_confirms() {
        let f = ready_fixture().await;
        add_task(&f.db, 1, "00000001&0").await;
        f.sink.respond(Ok(201));

        f.worker.run_cycle().await.unwrap();
        assert_eq!(statuses(&f.db).await[0].1, TaskStatus::Added);
    }

    #[tokio::test]
    async fn other_status_leaves_tasks_pending() {
        let f = ready_fixture().await;
        add_task(&f.db, 1, "00000001&0").await;
        f.sink.respond(Ok(202));

        let report = f.worker.run_cycle().await.unwrap();
        assert_eq!(report.failed_groups, 1);
        assert_eq!(statuses(&f.db).await[0].1, TaskStatus::WaitAdd);

        // Retried on the next cycle.
        f.worker.run_cycle().await.unwrap();
        assert_eq!(statuses(&f.db).await[0].1, TaskStatus::Added);
        assert_eq!(f.sink.requests().len(), 2);
    }

    #[tokio::test]
    async fn transport_error_leaves_tasks_pending() {
        let f = ready_fixture().await;
        add_task(&f.db, 1, "00000001&0").await;
        f.sink
            .respond(Err(EventError::Transport("Request timed out".to_string())));

        let report = f.worker.run_cycle().await.unwrap();
        assert_eq!(report.failed_groups, 1);
        assert_eq!(report.advanced, 0);
        assert_eq!(statuses(&f.db).await[0].1, TaskStatus::WaitAdd);
    }

    #[tokio::test]
    async fn clear_is_delivered_as_deleted() {
        let f = ready_fixture().await;
        add_task(&f.db, 1, "00000001&0").await;
        f.worker.run_cycle().await.unwrap();

        f.db.mark_tasks_wait_delete(1, &["00000001&0".to_string()], 1_700_000_500)
            .await
            .unwrap();
        f.worker.run_cycle().await.unwrap();

        assert_eq!(statuses(&f.db).await[0].1, TaskStatus::Deleted);
        let last = f.sink.requests().pop().unwrap();
        assert_eq!(
            last.events[0].oem.public.alarm_status,
            crate::delivery::AlarmStatus::Cleared
        );
    }

    #[tokio::test]
    async fn no_trust_material_skips_cycle() {
        let f = fixture().await;
        f.subscriptions
            .create(&NewSubscription {
                destination: "https://10.0.0.1/hook".to_string(),
                event_types: vec![EventType::Alert],
                protocol: Protocol::Redfish,
                credential: "token-abc".to_string(),
            })
            .await
            .unwrap();
        add_task(&f.db, 1, "00000001&0").await;

        let report = f.worker.run_cycle().await.unwrap();
        assert!(report.skipped_no_trust);
        assert!(f.sink.requests().is_empty());
        assert_eq!(statuses(&f.db).await[0].1, TaskStatus::WaitAdd);
    }

    #[tokio::test]
    async fn orphan_group_is_not_sent() {
        let f = ready_fixture().await;
        add_task(&f.db, 7, "00000001&0").await;

        let report = f.worker.run_cycle().await.unwrap();
        assert_eq!(report, DeliveryReport::default());
        assert!(f.sink.requests().is_empty());
    }

    #[tokio::test]
    async fn task_changed_during_delivery_is_not_overwritten() {
        let f = ready_fixture().await;
        add_task(&f.db, 1, "00000001&0").await;

        // A racing cycle already applied the transition.
        f.db.advance_tasks(1, &["00000001&0".to_string()], TaskStatus::WaitAdd, TaskStatus::Added)
            .await
            .unwrap();
        let again = f
            .db
            .advance_tasks(1, &["00000001&0".to_string()], TaskStatus::WaitAdd, TaskStatus::Added)
            .await
            .unwrap();
        assert_eq!(again, 0);
        assert_eq!(statuses(&f.db).await[0].1, TaskStatus::Added);
    }
}
