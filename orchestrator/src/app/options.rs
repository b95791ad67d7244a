//! Application configuration options

use std::time::Duration;

use crate::health::monitor::MonitorSettings;
use crate::orchestrator::OrchestratorSettings;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::{dispatcher, health};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Enable the HTTP server
    pub enable_server: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Dispatcher worker options
    pub dispatcher: dispatcher::Options,

    /// Health worker options
    pub health: health::Options,

    /// Orchestrator settings
    pub orchestrator: OrchestratorSettings,

    /// Multiplier on simulated stage latency
    pub stage_time_scale: f64,

    /// Issue real HTTP health probes
    pub use_http_probe: bool,

    /// Requestors allowed to deploy; empty allows everyone
    pub allowed_requestors: Vec<String>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            layout: StorageLayout::default(),
            enable_server: true,
            server: ServerOptions::default(),
            dispatcher: dispatcher::Options::default(),
            health: health::Options::default(),
            orchestrator: OrchestratorSettings::default(),
            stage_time_scale: 1.0,
            use_http_probe: false,
            allowed_requestors: Vec::new(),
        }
    }
}

impl AppOptions {
    /// Build options from a settings file
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        Self {
            layout,
            enable_server: settings.enable_server,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            dispatcher: dispatcher::Options {
                interval: Duration::from_secs(settings.queue_interval_secs.max(1)),
            },
            health: health::Options {
                interval: Duration::from_secs(settings.health_interval_secs.max(1)),
                ..Default::default()
            },
            orchestrator: OrchestratorSettings {
                max_concurrent_deployments: settings.max_concurrent_deployments,
                job_retention: settings.job_retention,
                monitor: MonitorSettings {
                    probe_timeout: Duration::from_millis(settings.health_probe_timeout_ms),
                    degraded_threshold: Duration::from_millis(
                        settings.health_degraded_threshold_ms,
                    ),
                },
            },
            stage_time_scale: settings.stage_time_scale,
            use_http_probe: settings.use_http_probe,
            allowed_requestors: settings.allowed_requestors.clone(),
            ..Default::default()
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
