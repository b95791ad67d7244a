//! Settings file management

use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;
use crate::logs::LogLevel;

/// Orchestrator settings file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write logs to daily files under the layout's logs directory
    #[serde(default)]
    pub log_to_file: bool,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Enable the HTTP server
    #[serde(default = "default_true")]
    pub enable_server: bool,

    /// Cap on concurrently executing deployments
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_deployments: usize,

    /// Queue processor tick in seconds
    #[serde(default = "default_queue_interval")]
    pub queue_interval_secs: u64,

    /// Health monitor interval in seconds
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,

    /// Upper bound on one health probe in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub health_probe_timeout_ms: u64,

    /// Probes slower than this many milliseconds are classified as degraded
    #[serde(default = "default_degraded_threshold")]
    pub health_degraded_threshold_ms: u64,

    /// Issue real HTTP probes instead of simulated ones
    #[serde(default)]
    pub use_http_probe: bool,

    /// Multiplier on simulated stage latency; 0 runs stages instantly
    #[serde(default = "default_time_scale")]
    pub stage_time_scale: f64,

    /// Finished jobs kept in memory for polling
    #[serde(default = "default_job_retention")]
    pub job_retention: usize,

    /// Requestors allowed to deploy; empty allows everyone
    #[serde(default)]
    pub allowed_requestors: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    3
}

fn default_queue_interval() -> u64 {
    5
}

fn default_health_interval() -> u64 {
    120
}

fn default_probe_timeout() -> u64 {
    5000
}

fn default_degraded_threshold() -> u64 {
    1000
}

fn default_time_scale() -> f64 {
    1.0
}

fn default_job_retention() -> usize {
    100
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            server: ServerSettings::default(),
            enable_server: true,
            max_concurrent_deployments: default_max_concurrent(),
            queue_interval_secs: default_queue_interval(),
            health_interval_secs: default_health_interval(),
            health_probe_timeout_ms: default_probe_timeout(),
            health_degraded_threshold_ms: default_degraded_threshold(),
            use_http_probe: false,
            stage_time_scale: default_time_scale(),
            job_retention: default_job_retention(),
            allowed_requestors: Vec::new(),
        }
    }
}

impl Settings {
    /// Reject settings the orchestrator cannot run with
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.max_concurrent_deployments == 0 {
            return Err(OrchestratorError::ConfigError(
                "max_concurrent_deployments must be at least 1".to_string(),
            ));
        }
        if self.job_retention == 0 {
            return Err(OrchestratorError::ConfigError(
                "job_retention must be at least 1".to_string(),
            ));
        }
        if !self.stage_time_scale.is_finite() || self.stage_time_scale < 0.0 {
            return Err(OrchestratorError::ConfigError(format!(
                "stage_time_scale must be a non-negative number, got {}",
                self.stage_time_scale
            )));
        }
        if self.server.host.trim().is_empty() {
            return Err(OrchestratorError::ConfigError(
                "server.host is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
