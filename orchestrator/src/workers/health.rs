//! Health monitor worker

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::models::environment::HealthStatus;
use crate::orchestrator::Orchestrator;

/// Health worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Interval between probe passes
    pub interval: Duration,

    /// Delay before the first pass
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// Run the health worker
pub async fn run<S, F>(
    options: &Options,
    orchestrator: Arc<Orchestrator>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Health worker starting...");

    let mut wait = options.initial_delay;
    loop {
        // Check for shutdown
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Health worker shutting down...");
                return;
            }
            _ = sleep_fn(wait) => {
                // Continue with probe pass
            }
        }
        wait = options.interval;

        let results = orchestrator.check_health().await;
        let unhealthy = results
            .iter()
            .filter(|(_, snapshot)| snapshot.status != HealthStatus::Healthy)
            .count();
        debug!(
            "Health pass complete: {} environments, {} not healthy",
            results.len(),
            unhealthy
        );
    }
}
