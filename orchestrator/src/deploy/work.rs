//! Pluggable stage work

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::OrchestratorError;
use crate::models::deployment::{DeploymentJob, StageName};

/// Side effect of a single stage.
///
/// Failures are reported as [`OrchestratorError::StageFailure`] with a short
/// reason that ends up in the stage logs.
/// For [`StageName::CanaryValidation`] an `Err` means the canary metrics did
/// not look good and the deployment is not promoted.
#[async_trait]
pub trait StageWork: Send + Sync {
    async fn perform(&self, stage: StageName, job: &DeploymentJob) -> Result<(), OrchestratorError>;
}

/// Nominal latency of a simulated stage
pub fn nominal_latency(stage: StageName) -> Duration {
    match stage {
        StageName::Build => Duration::from_millis(3000),
        StageName::Test => Duration::from_millis(2000),
        StageName::SecurityScan => Duration::from_millis(1500),
        StageName::Deploy => Duration::from_millis(2500),
        StageName::HealthCheck => Duration::from_millis(1000),
        StageName::CanaryValidation => Duration::ZERO,
        StageName::Finalize => Duration::from_millis(500),
        StageName::Rollback => Duration::from_millis(2000),
    }
}

/// Simulated work: sleeps and always succeeds
#[derive(Debug, Clone)]
pub struct SimulatedWork {
    /// Multiplier on nominal latencies; 0 runs stages instantly
    time_scale: f64,
}

impl SimulatedWork {
    pub fn new(time_scale: f64) -> Self {
        Self {
            time_scale: time_scale.max(0.0),
        }
    }

    /// Run every stage instantly
    pub fn instant() -> Self {
        Self::new(0.0)
    }

    fn latency(&self, stage: StageName, job: &DeploymentJob) -> Duration {
        match (stage, &job.config.canary) {
            // The canary window is caller-configured and not scaled
            (StageName::CanaryValidation, Some(canary)) => {
                Duration::from_secs(canary.duration_secs)
            }
            _ => nominal_latency(stage).mul_f64(self.time_scale),
        }
    }
}

impl Default for SimulatedWork {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[async_trait]
impl StageWork for SimulatedWork {
    async fn perform(&self, stage: StageName, job: &DeploymentJob) -> Result<(), OrchestratorError> {
        let wait = self.latency(stage, job);
        debug!("Simulating {} for job {} ({:?})", stage, job.id, wait);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }
}
