//! `SQLite` storage for the event pipeline.
//!
//! Persists the subscription, trust material (current and backup
//! generations), the active alarm mirror, and per-subscriber report tasks.

mod db;
mod models;
mod queries_alarms;
mod queries_subscriptions;
mod queries_tasks;
mod queries_trust;


pub use db::{DatabaseError, EventDatabase};
pub use models::*;
pub use queries_alarms::ActiveAlarmParams;
pub use queries_subscriptions::SubscriptionParams;
pub use queries_tasks::ReportTaskParams;
pub use queries_trust::TrustParams;
