//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::authn::authorizer::{AllowAll, AllowList, Authorizer};
use crate::deploy::work::SimulatedWork;
use crate::errors::OrchestratorError;
use crate::health::probe::{HealthProbe, HttpProbe, SimulatedProbe};
use crate::orchestrator::{Collaborators, Orchestrator};
use crate::storage::store::{DeploymentStore, JsonFileStore};

/// Main application state
pub struct AppState {
    /// The orchestrator shared by workers and the HTTP server
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, OrchestratorError> {
        info!("Initializing application state...");

        options.layout.setup().await?;

        let store: Arc<dyn DeploymentStore> = Arc::new(JsonFileStore::new(
            options.layout.environments_file(),
            options.layout.jobs_file(),
        ));

        let authorizer: Arc<dyn Authorizer> = if options.allowed_requestors.is_empty() {
            Arc::new(AllowAll)
        } else {
            Arc::new(AllowList::new(options.allowed_requestors.iter().cloned()))
        };

        let probe: Arc<dyn HealthProbe> = if options.use_http_probe {
            Arc::new(HttpProbe::new(options.orchestrator.monitor.probe_timeout)?)
        } else {
            Arc::new(SimulatedProbe)
        };

        let collaborators = Collaborators {
            store,
            authorizer,
            work: Arc::new(SimulatedWork::new(options.stage_time_scale)),
            probe,
        };

        let orchestrator =
            Arc::new(Orchestrator::load(collaborators, options.orchestrator.clone()).await?);

        Ok(Self { orchestrator })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), OrchestratorError> {
        info!("Shutting down application state...");
        let in_flight = self.orchestrator.in_flight_count();
        let queued = self.orchestrator.queue_len();
        if in_flight > 0 || queued > 0 {
            warn!(
                "Abandoning {} in-flight and {} queued deployment(s)",
                in_flight, queued
            );
        }
        Ok(())
    }
}
