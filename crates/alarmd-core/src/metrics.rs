//! OTLP export of spans and pipeline counters.
//!
//! Compiled only with the `metrics` feature. Both signals go to the same
//! gRPC collector endpoint.

use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{SdkTracerProvider, Tracer};

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Cannot build OTLP exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),

    #[error("OpenTelemetry flush failed: {0}")]
    Flush(#[from] opentelemetry_sdk::error::OTelSdkError),
}

/// Installed OTLP providers. Dropping this does not flush; call
/// [`MetricsGuard::shutdown`] before exit.
pub struct MetricsGuard {
    spans: SdkTracerProvider,
    counters: SdkMeterProvider,
    tracer: Tracer,
}

impl MetricsGuard {
    /// Tracer feeding the `tracing-opentelemetry` layer.
    pub fn tracer(&self) -> Tracer {
        self.tracer.clone()
    }

    pub fn shutdown(self) -> Result<(), MetricsError> {
        self.spans.shutdown()?;
        self.counters.shutdown()?;
        Ok(())
    }
}

/// Install global span and meter providers exporting to `endpoint`
/// (e.g. `http://localhost:4317`).
pub fn init_metrics(endpoint: &str, service: &'static str) -> Result<MetricsGuard, MetricsError> {
    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let counter_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let spans = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .build();
    let counters = SdkMeterProvider::builder()
        .with_periodic_exporter(counter_exporter)
        .build();

    global::set_tracer_provider(spans.clone());
    global::set_meter_provider(counters.clone());

    Ok(MetricsGuard {
        tracer: spans.tracer(service),
        spans,
        counters,
    })
}
