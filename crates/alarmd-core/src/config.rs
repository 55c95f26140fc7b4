//! Configuration resolution for alarmd.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/alarmd/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete alarmd configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub alarms: AlarmSourceConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            schedule: ScheduleConfig::default(),
            delivery: DeliveryConfig::default(),
            security: SecurityConfig::default(),
            alarms: AlarmSourceConfig::default(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    pub database_path: Option<PathBuf>,
}

/// Periodic loop timing. Start delays stagger the loops so each stage sees
/// the previous stage's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub reconcile_interval_secs: u64,
    pub reconcile_start_delay_secs: u64,
    pub delivery_interval_secs: u64,
    pub delivery_start_delay_secs: u64,
    pub janitor_interval_secs: u64,
    pub janitor_start_delay_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 60,
            reconcile_start_delay_secs: 0,
            delivery_interval_secs: 60,
            delivery_start_delay_secs: 10,
            janitor_interval_secs: 24 * 60 * 60,
            janitor_start_delay_secs: 20,
        }
    }
}

impl ScheduleConfig {
    pub const fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub const fn reconcile_start_delay(&self) -> Duration {
        Duration::from_secs(self.reconcile_start_delay_secs)
    }

    pub const fn delivery_interval(&self) -> Duration {
        Duration::from_secs(self.delivery_interval_secs)
    }

    pub const fn delivery_start_delay(&self) -> Duration {
        Duration::from_secs(self.delivery_start_delay_secs)
    }

    pub const fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }

    pub const fn janitor_start_delay(&self) -> Duration {
        Duration::from_secs(self.janitor_start_delay_secs)
    }
}

/// Outbound delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Per-request timeout; a timeout counts as a transport failure.
    pub request_timeout_secs: u64,
    /// PEM client certificate presented to the destination (mutual TLS).
    pub client_cert_path: Option<PathBuf>,
    /// PEM private key for `client_cert_path`.
    pub client_key_path: Option<PathBuf>,
    /// Destination-type severity vocabulary (e.g. `eSight`).
    pub severity_profile: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 20,
            client_cert_path: None,
            client_key_path: None,
            severity_profile: "eSight".to_string(),
        }
    }
}

impl DeliveryConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// At-rest secret handling.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    /// File holding the 32-byte credential encryption key.
    pub credential_key_path: Option<PathBuf>,
}

/// Alarm source configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlarmSourceConfig {
    /// JSON snapshot of currently asserted alarms.
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.schedule;
        for (name, value) in [
            ("schedule.reconcile_interval_secs", s.reconcile_interval_secs),
            ("schedule.delivery_interval_secs", s.delivery_interval_secs),
            ("schedule.janitor_interval_secs", s.janitor_interval_secs),
            ("delivery.request_timeout_secs", self.delivery.request_timeout_secs),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }

        if self.delivery.client_cert_path.is_some() != self.delivery.client_key_path.is_some() {
            return Err(Error::Config(
                "delivery.client_cert_path and delivery.client_key_path must be set together"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
///
/// `explicit` is a config file named on the command line; it must exist.
/// File layers are merged key by key, so a later file only overrides the
/// settings it actually names.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut layers = Vec::new();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            layers.push(load_config_file(&global_path)?);
        }
    }
    if let Some(path) = explicit {
        layers.push(load_config_file(path)?);
    }

    let mut config = resolve_layers(layers)?;
    apply_env_overrides(&mut config);

    config.validate()?;
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("alarmd").join("settings.json"))
}

/// Get the default database path.
pub fn database_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("alarmd").join("events.db"))
}

/// Get the default credential key path.
pub fn credential_key_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("alarmd").join("credential.key"))
}

fn config_dir() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
}

/// Read one config file as an untyped JSON object.
fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let layer: Value = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    if !layer.is_object() {
        return Err(Error::Config(format!(
            "Config file {} must contain a JSON object",
            path.display()
        )));
    }
    Ok(layer)
}

/// Merge layers in order, later ones winning, then fill gaps with defaults.
fn resolve_layers(layers: Vec<Value>) -> Result<Config> {
    let mut merged = Value::Object(Map::new());
    for layer in layers {
        merge_layer(&mut merged, layer);
    }
    serde_json::from_value(merged).map_err(|e| Error::Config(format!("Invalid configuration: {e}")))
}

fn merge_layer(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_layer(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("ALARMD_DB_PATH") {
        config.storage.database_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("ALARMD_ALARM_SOURCE") {
        config.alarms.source_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("ALARMD_CREDENTIAL_KEY") {
        config.security.credential_key_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("ALARMD_REQUEST_TIMEOUT") {
        if let Ok(n) = val.parse() {
            config.delivery.request_timeout_secs = n;
        }
    }
    if let Ok(val) = std::env::var("ALARMD_LOG_LEVEL") {
        config.log_level = val;
    }
}
