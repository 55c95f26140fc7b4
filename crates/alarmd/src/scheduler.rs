//! Fixed-interval background jobs.
//!
//! Each job runs one cycle to completion before the timer rearms, so cycles
//! of the same job never overlap. Jobs coordinate only through storage.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::EventError;

/// Spawn `job` every `interval`, first after `start_delay`.
///
/// Errors are logged and swallowed; the next tick is the retry. A shutdown
/// signal stops the job between cycles, never during one.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    start_delay: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), EventError>> + Send,
{
    tokio::spawn(async move {
        if !start_delay.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(start_delay) => {}
                _ = shutdown.changed() => {
                    info!(job = name, "Job stopped before first cycle");
                    return;
                }
            }
        }

        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(job = name, interval_secs = interval.as_secs(), "Job started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = timer.tick() => {}
                _ = shutdown.changed() => break,
            }

            debug!(job = name, "Cycle starting");
            match job().await {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    warn!(job = name, error = %e, "Cycle failed, retrying next tick");
                }
                Err(e) => error!(job = name, error = %e, "Cycle failed"),
            }
        }

        info!(job = name, "Job stopped");
    })
}

/// Wait for every job to exit after shutdown.
///
/// A job that panicked or was cancelled is logged; returns how many did.
pub async fn join_jobs(handles: Vec<JoinHandle<()>>) -> usize {
    let mut abnormal = 0;
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, panicked = e.is_panic(), "Job terminated abnormally");
            abnormal += 1;
        }
    }
    abnormal
}
