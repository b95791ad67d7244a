//! Environment health probes

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::errors::OrchestratorError;
use crate::models::environment::Environment;

/// Issues one health probe against an environment
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, environment: &Environment) -> Result<(), OrchestratorError>;
}

/// Probe that always responds immediately
#[derive(Debug, Default, Clone)]
pub struct SimulatedProbe;

#[async_trait]
impl HealthProbe for SimulatedProbe {
    async fn probe(&self, _environment: &Environment) -> Result<(), OrchestratorError> {
        Ok(())
    }
}

/// Probe issuing `GET <url>/health`
pub struct HttpProbe {
    client: Client,
    path: String,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, OrchestratorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            path: "health".to_string(),
        })
    }

    /// Resolve the probe URL relative to the environment's base URL
    pub fn probe_url(&self, base: &str) -> Result<Url, OrchestratorError> {
        let mut base = Url::parse(base)
            .map_err(|e| OrchestratorError::ProbeFailure(format!("invalid url {}: {}", base, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(&self.path)
            .map_err(|e| OrchestratorError::ProbeFailure(e.to_string()))
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, environment: &Environment) -> Result<(), OrchestratorError> {
        let base = environment.url.as_deref().ok_or_else(|| {
            OrchestratorError::ProbeFailure(format!("{} has no url", environment.id))
        })?;
        let url = self.probe_url(base)?;
        debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(OrchestratorError::ProbeFailure(format!(
                "{} responded {}",
                environment.id,
                response.status()
            )));
        }
        Ok(())
    }
}
