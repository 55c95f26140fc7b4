//! `alarmd` Event Pipeline
//!
//! A reduced Redfish `EventService`: one remote destination subscribes to
//! hardware alarms, which are pushed to it over mutually authenticated
//! HTTPS.
//!
//! Three periodic stages share one `SQLite` store:
//! - [`reconciler`] diffs the active alarm mirror against the report task
//!   backlog
//! - [`delivery`] pushes pending tasks and advances them on success
//! - [`janitor`] purges terminal tasks of deleted subscribers
//!
//! Status transitions are status-gated conditional updates, so the stages
//! need no locks between them.

pub mod alarms;
pub mod delivery;
pub mod error;
pub mod janitor;
pub mod pipeline;
pub mod reconciler;
pub mod redfish;
pub mod scheduler;
pub mod secret;
pub mod severity;
pub mod storage;
pub mod subscription;
pub mod telemetry;
pub mod trust;

pub use error::EventError;
