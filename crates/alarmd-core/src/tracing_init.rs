//! Shared tracing/logging initialization.
//!
//! Sets up `tracing_subscriber` with an env-filter and optional JSON output,
//! and, when built with the `metrics` feature, an `OpenTelemetry` layer.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Handle returned by [`init_tracing_with_metrics`]. Keep it alive for the
/// process lifetime.
#[cfg(feature = "metrics")]
pub type MetricsHandle = crate::metrics::MetricsGuard;

/// Handle returned by [`init_tracing_with_metrics`] (no-op without the
/// `metrics` feature).
#[cfg(not(feature = "metrics"))]
pub type MetricsHandle = ();

fn env_filter(default_filter: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    )
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. `"alarmd=info"`).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = env_filter(default_filter);
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialise tracing and, if an OTLP endpoint is given and the `metrics`
/// feature is enabled, the `OpenTelemetry` trace + metrics pipeline.
///
/// Falls back to plain [`init_tracing`] when no endpoint is configured or
/// the exporter cannot be built.
#[cfg(feature = "metrics")]
pub fn init_tracing_with_metrics(
    default_filter: &str,
    log_json: bool,
    endpoint: Option<&str>,
) -> Option<MetricsHandle> {
    let Some(endpoint) = endpoint else {
        init_tracing(default_filter, log_json);
        return None;
    };

    match crate::metrics::init_metrics(endpoint, "alarmd") {
        Ok(guard) => {
            let otel_layer = tracing_opentelemetry::layer().with_tracer(guard.tracer());
            tracing_subscriber::registry()
                .with(env_filter(default_filter))
                .with(log_json.then(|| tracing_subscriber::fmt::layer().json()))
                .with((!log_json).then(tracing_subscriber::fmt::layer))
                .with(otel_layer)
                .init();
            tracing::info!(endpoint, "OpenTelemetry export enabled");
            Some(guard)
        }
        Err(e) => {
            init_tracing(default_filter, log_json);
            tracing::warn!(error = %e, endpoint, "OpenTelemetry export disabled");
            None
        }
    }
}

/// Initialise tracing. Without the `metrics` feature the endpoint is ignored.
#[cfg(not(feature = "metrics"))]
pub fn init_tracing_with_metrics(
    default_filter: &str,
    log_json: bool,
    endpoint: Option<&str>,
) -> Option<MetricsHandle> {
    init_tracing(default_filter, log_json);
    if endpoint.is_some() {
        tracing::warn!("Metrics endpoint ignored: built without the `metrics` feature");
    }
    None
}
