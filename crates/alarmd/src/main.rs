//! `alarmd` Event Subscription Daemon
//!
//! Runs the reconcile, delivery and janitor loops against the local event
//! database until Ctrl+C or SIGTERM.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use alarmd::alarms::{ActiveAlarmMirror, AlarmSource, JsonFileAlarmSource};
use alarmd::delivery::{ClientIdentity, DeliveryWorker, HttpsSinkFactory};
use alarmd::janitor::TaskJanitor;
use alarmd::pipeline::Pipeline;
use alarmd::reconciler::TaskReconciler;
use alarmd::scheduler::join_jobs;
use alarmd::severity::SeverityProfile;
use alarmd::storage::EventDatabase;
use alarmd::subscription::SubscriptionStore;
use alarmd::trust::CertTrustManager;
use alarmd_core::Config;
use alarmd_crypto::{AeadCredentialCipher, CredentialCipher, CredentialKey};

#[derive(Parser, Debug)]
#[command(name = "alarmd")]
#[command(version, about = "alarmd - Redfish alarm event subscription service")]
struct Args {
    /// JSON config file layered over the global settings
    #[arg(long, env = "ALARMD_CONFIG")]
    config: Option<PathBuf>,

    /// Database file path
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JSON snapshot of currently asserted alarms
    #[arg(long)]
    alarm_source: Option<PathBuf>,

    /// File holding the credential encryption key (created if missing)
    #[arg(long)]
    credential_key: Option<PathBuf>,

    /// Path to PEM-encoded client certificate presented to the destination.
    #[arg(long, env = "ALARMD_CLIENT_CERT")]
    client_cert: Option<PathBuf>,

    /// Path to PEM-encoded client private key for `--client-cert`.
    #[arg(long, env = "ALARMD_CLIENT_KEY")]
    client_key: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "ALARMD_LOG_JSON")]
    log_json: bool,

    /// OpenTelemetry OTLP endpoint for traces and metrics export
    /// (e.g. `http://localhost:4317`). Requires the `metrics` feature.
    #[cfg(feature = "metrics")]
    #[arg(long, env = "ALARMD_METRICS_ENDPOINT")]
    metrics_endpoint: Option<String>,
}

impl Args {
    /// CLI flags take precedence over every config layer.
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.db_path {
            config.storage.database_path = Some(path.clone());
        }
        if let Some(path) = &self.alarm_source {
            config.alarms.source_path = Some(path.clone());
        }
        if let Some(path) = &self.credential_key {
            config.security.credential_key_path = Some(path.clone());
        }
        if self.client_cert.is_some() || self.client_key.is_some() {
            config.delivery.client_cert_path.clone_from(&self.client_cert);
            config.delivery.client_key_path.clone_from(&self.client_key);
        }
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
        config.log_json |= self.log_json;
    }
}

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = alarmd_core::config::load_config(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    #[cfg(feature = "metrics")]
    let metrics_endpoint = args.metrics_endpoint.as_deref();
    #[cfg(not(feature = "metrics"))]
    let metrics_endpoint: Option<&str> = None;

    // Hold the guard so the OTel pipeline stays alive for the process lifetime.
    let log_filter = format!("alarmd={}", config.log_level);
    let metrics_guard = alarmd_core::tracing_init::init_tracing_with_metrics(
        &log_filter,
        config.log_json,
        metrics_endpoint,
    );

    // reqwest is built without a default crypto provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting alarmd");

    let db_path = match config.storage.database_path.clone() {
        Some(path) => path,
        None => default_path(alarmd_core::config::database_path(), "events.db")?,
    };
    info!(path = %db_path.display(), "Opening database");
    let db = EventDatabase::open(&db_path).await?;

    let key_path = match config.security.credential_key_path.clone() {
        Some(path) => path,
        None => default_path(alarmd_core::config::credential_key_path(), "credential.key")?,
    };
    let key = CredentialKey::load_or_generate(&key_path)?;
    let cipher: Arc<dyn CredentialCipher> = Arc::new(AeadCredentialCipher::new(&key));
    drop(key);

    let profile: SeverityProfile = config.delivery.severity_profile.parse()?;
    let identity = load_identity(
        config.delivery.client_cert_path.as_deref(),
        config.delivery.client_key_path.as_deref(),
    )?;
    let factory = HttpsSinkFactory::new(config.delivery.request_timeout(), identity);

    let source: Option<Arc<dyn AlarmSource>> = config.alarms.source_path.clone().map(|path| {
        info!(path = %path.display(), "Alarm source configured");
        Arc::new(JsonFileAlarmSource::new(path)) as Arc<dyn AlarmSource>
    });
    if source.is_none() {
        warn!("No alarm source configured, the alarm mirror must be fed externally");
    }

    let subscriptions = SubscriptionStore::new(db.clone(), Arc::clone(&cipher));
    let trust = CertTrustManager::new(db.clone(), cipher);
    let pipeline = Arc::new(Pipeline::new(
        source,
        ActiveAlarmMirror::new(db.clone()),
        TaskReconciler::new(db.clone(), profile),
        DeliveryWorker::new(db.clone(), subscriptions, trust, factory),
        TaskJanitor::new(db),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handles = pipeline.spawn(&config.schedule, &shutdown_rx);
    drop(shutdown_rx);

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    info!("Event pipeline running");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    // Running cycles finish; loops do not rearm.
    let _ = shutdown_tx.send(true);
    let abnormal = join_jobs(handles).await;
    if abnormal > 0 {
        warn!(abnormal, "Some pipeline loops did not stop cleanly");
    }

    #[cfg(feature = "metrics")]
    if let Some(guard) = metrics_guard {
        if let Err(e) = guard.shutdown() {
            warn!(error = %e, "OpenTelemetry shutdown failed");
        }
    }
    #[cfg(not(feature = "metrics"))]
    let _ = metrics_guard;

    info!("alarmd stopped");
    Ok(())
}

fn load_identity(
    cert: Option<&Path>,
    key: Option<&Path>,
) -> anyhow::Result<Option<ClientIdentity>> {
    match (cert, key) {
        (Some(cert), Some(key)) => {
            info!(cert = %cert.display(), "Client certificate configured");
            Ok(Some(ClientIdentity::load(cert, key)?))
        }
        (None, None) => Ok(None),
        _ => anyhow::bail!("--client-cert and --client-key must be given together"),
    }
}

/// Resolve a default file path: config dir first, then `~/.alarmd/<file>`.
fn default_path(configured: Option<PathBuf>, file: &str) -> anyhow::Result<PathBuf> {
    if let Some(path) = configured {
        return Ok(path);
    }
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".alarmd").join(file))
}
