//! Queue processor worker

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::orchestrator::Orchestrator;

/// Dispatcher worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Tick interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Run the dispatcher worker.
///
/// Each tick starts as many queued jobs as there are free slots. Jobs run on
/// their own tasks, so a long canary window never stalls the tick loop.
pub async fn run<S, F>(
    options: &Options,
    orchestrator: Arc<Orchestrator>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!(
        "Dispatcher worker starting (interval {:?}, max {} concurrent)...",
        options.interval,
        orchestrator.max_concurrent_deployments()
    );

    loop {
        // Check for shutdown
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Dispatcher worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with tick
            }
        }

        let started = orchestrator.dispatch_ready();
        if started.is_empty() {
            debug!(
                "Dispatcher tick: nothing started ({} queued, {} in flight)",
                orchestrator.queue_len(),
                orchestrator.in_flight_count()
            );
        } else {
            info!("Dispatcher started {} job(s): {:?}", started.len(), started);
        }
    }
}
