//! Environment health monitor

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::errors::OrchestratorError;
use crate::health::probe::HealthProbe;
use crate::models::environment::{Environment, HealthSnapshot, HealthStatus};
use crate::registry::environments::EnvironmentRegistry;

/// Health monitor settings
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Upper bound on a single probe
    pub probe_timeout: Duration,

    /// Probes slower than this are classified as degraded
    pub degraded_threshold: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            degraded_threshold: Duration::from_millis(1000),
        }
    }
}

/// Classify a probe outcome
pub fn classify(
    outcome: &Result<(), OrchestratorError>,
    elapsed: Duration,
    degraded_threshold: Duration,
) -> HealthStatus {
    match outcome {
        Ok(()) if elapsed < degraded_threshold => HealthStatus::Healthy,
        Ok(()) => HealthStatus::Degraded,
        Err(_) => HealthStatus::Down,
    }
}

/// Probes every registered environment and records the result
pub struct HealthMonitor {
    registry: Arc<EnvironmentRegistry>,
    probe: Arc<dyn HealthProbe>,
    settings: MonitorSettings,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<EnvironmentRegistry>,
        probe: Arc<dyn HealthProbe>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            registry,
            probe,
            settings,
        }
    }

    async fn check_one(&self, environment: &Environment) -> HealthSnapshot {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(
            self.settings.probe_timeout,
            self.probe.probe(environment),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::ProbeFailure(format!(
                "timed out after {:?}",
                self.settings.probe_timeout
            ))),
        };
        let elapsed = started.elapsed();

        if let Err(e) = &outcome {
            warn!("Health probe failed for {} ({}): {}", environment.name, environment.id, e);
        }

        HealthSnapshot {
            status: classify(&outcome, elapsed, self.settings.degraded_threshold),
            last_check: Utc::now(),
            response_time_ms: elapsed.as_millis() as u64,
        }
    }

    /// Probe all environments concurrently. One failing probe never stops
    /// the others.
    pub async fn check_all(&self) -> Vec<(String, HealthSnapshot)> {
        let environments = self.registry.list();
        debug!("Probing {} environments", environments.len());

        let snapshots = join_all(environments.iter().map(|env| self.check_one(env))).await;

        let mut results = Vec::with_capacity(snapshots.len());
        for (env, snapshot) in environments.iter().zip(snapshots) {
            if let Err(e) = self.registry.apply_health_snapshot(&env.id, snapshot.clone()) {
                warn!("Unable to record health for {}: {}", env.id, e);
                continue;
            }
            results.push((env.id.clone(), snapshot));
        }
        results
    }
}
