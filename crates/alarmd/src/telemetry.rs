//! Pipeline counters.
//!
//! Recorded through the global `OpenTelemetry` meter when built with the
//! `metrics` feature; no-ops otherwise.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    TasksCreated,
    TasksCleared,
    DeliveryAttempts,
    DeliveryFailures,
    TasksPurged,
}

impl Counter {
    pub const fn name(self) -> &'static str {
        match self {
            Self::TasksCreated => "alarmd.tasks.created",
            Self::TasksCleared => "alarmd.tasks.cleared",
            Self::DeliveryAttempts => "alarmd.delivery.attempts",
            Self::DeliveryFailures => "alarmd.delivery.failures",
            Self::TasksPurged => "alarmd.tasks.purged",
        }
    }
}

#[cfg(feature = "metrics")]
mod otel {
    use std::sync::OnceLock;

    use opentelemetry::metrics::Counter as OtelCounter;

    use super::Counter;

    struct Counters {
        created: OtelCounter<u64>,
        cleared: OtelCounter<u64>,
        attempts: OtelCounter<u64>,
        failures: OtelCounter<u64>,
        purged: OtelCounter<u64>,
    }

    static COUNTERS: OnceLock<Counters> = OnceLock::new();

    fn counters() -> &'static Counters {
        COUNTERS.get_or_init(|| {
            let meter = opentelemetry::global::meter("alarmd");
            let build = |c: Counter| meter.u64_counter(c.name()).build();
            Counters {
                created: build(Counter::TasksCreated),
                cleared: build(Counter::TasksCleared),
                attempts: build(Counter::DeliveryAttempts),
                failures: build(Counter::DeliveryFailures),
                purged: build(Counter::TasksPurged),
            }
        })
    }

    pub fn add(counter: Counter, value: u64) {
        let c = counters();
        let target = match counter {
            Counter::TasksCreated => &c.created,
            Counter::TasksCleared => &c.cleared,
            Counter::DeliveryAttempts => &c.attempts,
            Counter::DeliveryFailures => &c.failures,
            Counter::TasksPurged => &c.purged,
        };
        target.add(value, &[]);
    }
}

/// Add `value` to `counter`. Zero values are ignored.
#[cfg(feature = "metrics")]
pub fn record(counter: Counter, value: u64) {
    if value > 0 {
        otel::add(counter, value);
    }
}

/// Add `value` to `counter` (no-op without the `metrics` feature).
#[cfg(not(feature = "metrics"))]
pub const fn record(_counter: Counter, _value: u64) {}
