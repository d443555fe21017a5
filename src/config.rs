use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::detection::window::{DEFAULT_ANALYSIS_SLICE, DEFAULT_WINDOW_CAPACITY};
use crate::inference::{ModelSettings, KNOWN_MODELS, PRIMARY_MODEL};
use crate::input::upload::{DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_MAX_UPLOAD_BYTES};
use crate::input::UploadPolicy;
use crate::monitoring::{MonitoringSettings, DEFAULT_MAX_ALERTS};
use crate::output::OutputFormat;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the NetSage daemon and CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ingest: IngestConfig,
    pub monitoring: MonitoringConfig,
    pub inference: InferenceConfig,
    pub capture: CaptureConfig,
    pub persistence: PersistenceConfig,
    pub alerting: AlertConfig,
    pub output: OutputConfig,
}

/// Log upload and live log inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_upload_bytes: u64,
    pub allowed_extensions: Vec<String>,
    /// Log file to follow in the daemon
    pub tail_file: Option<PathBuf>,
    /// Read the whole file first instead of only new lines
    pub tail_from_start: bool,
    /// UDP address to receive syslog on, e.g. "0.0.0.0:5514"
    pub syslog_address: Option<String>,
    /// Lines per batch written from live inputs
    pub batch_size: usize,
}

/// Real-time traffic monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub analysis_interval_secs: u64,
    pub window_capacity: usize,
    pub analysis_slice: usize,
    pub model_id: String,
    pub max_alerts: usize,
}

/// Model backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// "script" runs `interpreter script_path`, "http" calls the endpoint directly
    pub backend: String,
    pub interpreter: String,
    pub script_path: PathBuf,
    pub timeout_secs: u64,
    pub model: ModelSettings,
}

/// Traffic capture script
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub interpreter: String,
    pub script_path: PathBuf,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub database_path: PathBuf,
    /// Records and verdicts older than this are pruned
    pub retention_days: u32,
}

/// Alert notification channels
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,
    /// Verdicts below this risk score are only dispatched when critical
    pub min_risk_score: u8,
    pub slack: Option<SlackConfig>,
    pub discord: Option<DiscordConfig>,
    pub webhooks: Vec<WebhookConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
    pub channel: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub webhook_url: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,
    /// "POST" (default) or "PUT"
    pub method: Option<String>,
    pub headers: Option<HashMap<String, String>>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format: "json", "jsonl", or "console"
    pub format: String,
    /// Output file path (if format is not "console")
    pub file_path: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            tail_file: None,
            tail_from_start: false,
            syslog_address: None,
            batch_size: 100,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        MonitoringConfig {
            enabled: true,
            poll_interval_secs: 3,
            analysis_interval_secs: 15,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            analysis_slice: DEFAULT_ANALYSIS_SLICE,
            model_id: PRIMARY_MODEL.to_string(),
            max_alerts: DEFAULT_MAX_ALERTS,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        InferenceConfig {
            backend: "script".to_string(),
            interpreter: "python3".to_string(),
            script_path: PathBuf::from("scripts/granite_models.py"),
            timeout_secs: 120,
            model: ModelSettings::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            interpreter: "python3".to_string(),
            script_path: PathBuf::from("scripts/network_monitor.py"),
            timeout_secs: 10,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig {
            database_path: PathBuf::from("netsage.db"),
            retention_days: 30,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        AlertConfig {
            enabled: false,
            min_risk_score: 6,
            slack: None,
            discord: None,
            webhooks: Vec::new(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            format: "console".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject settings the rest of the system cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let m = &self.monitoring;

        if m.poll_interval_secs == 0 || m.analysis_interval_secs == 0 {
            return invalid("monitoring intervals must be at least one second".to_string());
        }
        if m.window_capacity == 0 {
            return invalid("monitoring.window_capacity must be positive".to_string());
        }
        if m.analysis_slice == 0 || m.analysis_slice > m.window_capacity {
            return invalid(format!(
                "monitoring.analysis_slice must be between 1 and {}",
                m.window_capacity
            ));
        }
        if !KNOWN_MODELS.contains(&m.model_id.as_str()) {
            return invalid(format!("unknown model id '{}'", m.model_id));
        }
        if !matches!(self.inference.backend.as_str(), "script" | "http") {
            return invalid(format!("unknown inference backend '{}'", self.inference.backend));
        }
        if self.ingest.batch_size == 0 {
            return invalid("ingest.batch_size must be positive".to_string());
        }
        if !(1..=10).contains(&self.alerting.min_risk_score) {
            return invalid("alerting.min_risk_score must be between 1 and 10".to_string());
        }
        if OutputFormat::parse(&self.output.format).is_none() {
            return invalid(format!("unknown output format '{}'", self.output.format));
        }
        Ok(())
    }
}

impl MonitoringConfig {
    pub fn to_settings(&self) -> MonitoringSettings {
        MonitoringSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            analysis_interval: Duration::from_secs(self.analysis_interval_secs),
            window_capacity: self.window_capacity,
            analysis_slice: self.analysis_slice,
            model_id: self.model_id.clone(),
            max_alerts: self.max_alerts,
        }
    }
}

impl IngestConfig {
    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::new(self.max_upload_bytes, &self.allowed_extensions)
    }
}
