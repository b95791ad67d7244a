//! Stage executor and rollback handler

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::cache::jobs::JobHandle;
use crate::deploy::fsm::{JobEvent, JobFsm};
use crate::deploy::notify::{JobNotification, Notifier};
use crate::deploy::work::StageWork;
use crate::errors::OrchestratorError;
use crate::models::deployment::{
    DeploymentJob, JobStatus, RolloutStrategy, Stage, StageName, StageStatus,
};
use crate::registry::environments::{EnvironmentRegistry, RollbackOutcome};

/// Size of the simulated test suite reported by the Test stage
pub const TEST_SUITE_SIZE: u32 = 128;

/// Runs a job's stages sequentially and drives its status
pub struct JobExecutor {
    registry: Arc<EnvironmentRegistry>,
    work: Arc<dyn StageWork>,
    notifier: Notifier,
}

impl JobExecutor {
    pub fn new(
        registry: Arc<EnvironmentRegistry>,
        work: Arc<dyn StageWork>,
        notifier: Notifier,
    ) -> Self {
        Self {
            registry,
            work,
            notifier,
        }
    }

    /// Execute a job to its settled status
    pub async fn run(&self, job: &JobHandle) -> JobStatus {
        let (job_id, env_id) = {
            let j = job.read().await;
            (j.id.clone(), j.environment_id.clone())
        };
        info!("Starting deployment job {} on {}", job_id, env_id);

        {
            let mut j = job.write().await;
            if let Err(e) = self.transition(&mut j, JobEvent::Start) {
                error!("Job {} cannot start: {}", job_id, e);
                return j.status;
            }
            j.started_at = Some(Utc::now());
        }

        let stage_count = job.read().await.stages.len();
        for index in 0..stage_count {
            if let Err(e) = self.run_stage(job, index).await {
                return self.fail(job, index, e).await;
            }
        }

        let version = job.read().await.config.version.clone();
        if let Err(e) = self.registry.apply_deployment_result(&env_id, &version).await {
            error!("Failed to record deployment result for {}: {}", env_id, e);
        }

        let mut j = job.write().await;
        if let Err(e) = self.transition(&mut j, JobEvent::Complete) {
            error!("Job {} cannot complete: {}", job_id, e);
        }
        info!("Deployment job {} completed ({})", job_id, version);
        j.status
    }

    fn transition(&self, job: &mut DeploymentJob, event: JobEvent) -> Result<(), OrchestratorError> {
        let mut fsm = JobFsm::resume(job.status, job.error.clone());
        let status = fsm
            .process(event)
            .map_err(OrchestratorError::InvalidTransition)?;

        let changed = status != job.status;
        job.status = status;
        job.error = fsm.error().map(String::from);
        if status.is_terminal() && job.ended_at.is_none() {
            job.ended_at = Some(Utc::now());
        }

        if changed {
            self.notifier.send(JobNotification::StatusChanged {
                job_id: job.id.clone(),
                status,
            });
        }
        Ok(())
    }

    async fn log(&self, job: &JobHandle, index: usize, line: impl Into<String>) {
        let line = line.into();
        let mut j = job.write().await;
        debug!("[{}] {}: {}", j.id, j.stages[index].name, line);
        j.stages[index].log(line);
    }

    async fn run_stage(&self, job: &JobHandle, index: usize) -> Result<(), OrchestratorError> {
        let (job_id, name, snapshot) = {
            let mut j = job.write().await;
            let name = j.stages[index].name;

            let phase = match name {
                StageName::Deploy => Some(JobEvent::EnterDeploy),
                StageName::HealthCheck => Some(JobEvent::EnterVerification),
                _ => None,
            };
            if let Some(event) = phase {
                self.transition(&mut j, event)?;
            }

            j.stages[index]
                .begin()
                .map_err(OrchestratorError::InvalidTransition)?;
            (j.id.clone(), name, j.clone())
        };

        info!("[{}] Stage {} started", job_id, name);
        self.notifier.send(JobNotification::StageStarted {
            job_id: job_id.clone(),
            stage: name,
        });

        let outcome = self.execute_stage(job, index, name, &snapshot).await;

        let status = {
            let mut j = job.write().await;
            let status = match &outcome {
                Ok(()) => StageStatus::Completed,
                Err(e) => {
                    j.stages[index].log(format!("Stage failed: {}", e));
                    StageStatus::Failed
                }
            };
            j.stages[index]
                .finish(status)
                .map_err(OrchestratorError::InvalidTransition)?;
            status
        };

        match &outcome {
            Ok(()) => info!("[{}] Stage {} completed", job_id, name),
            Err(e) => warn!("[{}] Stage {} failed: {}", job_id, name, e),
        }
        self.notifier.send(JobNotification::StageFinished {
            job_id,
            stage: name,
            status,
        });

        outcome
    }

    async fn execute_stage(
        &self,
        job: &JobHandle,
        index: usize,
        name: StageName,
        snapshot: &DeploymentJob,
    ) -> Result<(), OrchestratorError> {
        let config = &snapshot.config;

        match name {
            StageName::Build => {
                self.log(job, index, format!("Compiling {} (build {})", config.version, config.build_id)).await;
                self.log(job, index, "Resolving dependencies").await;
                self.work.perform(name, snapshot).await?;
                self.log(job, index, format!("Packaging artifact {}", config.build_id)).await;
                self.log(job, index, "Build completed successfully").await;

                let mut j = job.write().await;
                let build_logs = j.stages[index].logs.join("\n");
                j.artifacts.build_logs = Some(build_logs);
            }

            StageName::Test => {
                self.log(job, index, "Running unit tests").await;
                self.log(job, index, "Running integration tests").await;
                self.work.perform(name, snapshot).await?;
                let summary = format!("{}/{} passed", TEST_SUITE_SIZE, TEST_SUITE_SIZE);
                self.log(job, index, format!("Test results: {}", summary)).await;

                job.write().await.artifacts.test_results = Some(summary);
            }

            StageName::SecurityScan => {
                self.log(job, index, "Scanning dependencies for known vulnerabilities").await;
                self.work.perform(name, snapshot).await?;
                self.log(job, index, "No security issues found").await;
            }

            StageName::Deploy => {
                let live = self.registry.begin_deployment(&snapshot.environment_id).await?;
                job.write().await.previous_version = live;

                match config.rollout_strategy {
                    RolloutStrategy::BlueGreen => {
                        self.log(job, index, format!("Creating parallel environment for {}", config.version)).await;
                        self.work.perform(name, snapshot).await?;
                        self.log(job, index, format!("Switching traffic to {}", config.version)).await;
                    }
                    RolloutStrategy::Rolling | RolloutStrategy::Canary => {
                        self.log(
                            job,
                            index,
                            format!(
                                "Rolling out {} to {} instances",
                                config.version, config.resources.replicas
                            ),
                        )
                        .await;
                        self.work.perform(name, snapshot).await?;
                        self.log(job, index, "Rollout complete").await;
                    }
                }
            }

            StageName::HealthCheck => {
                self.log(job, index, format!("Checking {}", config.health_check_endpoint)).await;
                let started = Instant::now();
                self.work.perform(name, snapshot).await?;
                let elapsed = started.elapsed().as_millis();
                self.log(job, index, "Health check passed").await;

                job.write().await.artifacts.performance_metrics =
                    Some(format!("health_check_response_ms={}", elapsed));
            }

            StageName::CanaryValidation => {
                let canary = config
                    .canary
                    .as_ref()
                    .ok_or_else(|| {
                        OrchestratorError::StageFailure("missing canary configuration".to_string())
                    })?;
                self.log(job, index, format!("Routing {}% of traffic to canary", canary.percentage)).await;
                self.log(job, index, format!("Observing canary metrics for {}s", canary.duration_secs)).await;
                self.work.perform(name, snapshot).await?;
                self.log(job, index, "Canary metrics look good").await;
                self.log(job, index, "Promoting canary to full deployment").await;
            }

            StageName::Finalize => {
                self.log(job, index, "Cleaning up old versions").await;
                self.work.perform(name, snapshot).await?;
                self.log(job, index, "Deployment finalized").await;
            }

            StageName::Rollback => {
                let env_id = &snapshot.environment_id;
                if !snapshot.deploy_started() {
                    self.log(job, index, format!("Nothing was deployed to {}, environment left untouched", env_id)).await;
                    return Ok(());
                }

                self.log(job, index, format!("Rolling back {} from {}", env_id, config.version)).await;
                self.work.perform(name, snapshot).await?;
                let outcome = self
                    .registry
                    .apply_rollback(env_id, &config.version, snapshot.previous_version.as_deref())
                    .await?;
                match outcome {
                    RollbackOutcome::Restored(version) => {
                        self.log(job, index, format!("Restored version {}", version)).await;
                    }
                    RollbackOutcome::Superseded(current) => {
                        let current = current.as_deref().unwrap_or("no version");
                        self.log(
                            job,
                            index,
                            format!("{} is now at {} from a later deployment, leaving it in place", env_id, current),
                        )
                        .await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn fail(&self, job: &JobHandle, index: usize, cause: OrchestratorError) -> JobStatus {
        let (job_id, env_id, deployed, rollback_index) = {
            let mut j = job.write().await;
            let message = format!("{} failed: {}", j.stages[index].name, cause);
            if let Err(e) = self.transition(&mut j, JobEvent::Fail(message)) {
                error!("Job {} cannot record failure: {}", j.id, e);
            }

            // Appended in the same critical section so pollers never see a
            // failed, rollback-enabled job without its Rollback stage.
            let rollback_index = if j.config.rollback_enabled {
                j.stages.push(Stage::new(StageName::Rollback));
                Some(j.stages.len() - 1)
            } else {
                None
            };
            (j.id.clone(), j.environment_id.clone(), j.deploy_started(), rollback_index)
        };
        warn!("Deployment job {} failed: {}", job_id, cause);

        let Some(rollback_index) = rollback_index else {
            if deployed {
                self.mark_error(&env_id).await;
            }
            return job.read().await.status;
        };

        self.rollback(job, rollback_index).await
    }

    async fn mark_error(&self, env_id: &str) {
        if let Err(e) = self.registry.mark_error(env_id).await {
            warn!("Unable to mark {} as errored: {}", env_id, e);
        }
    }

    async fn rollback(&self, job: &JobHandle, index: usize) -> JobStatus {
        let outcome = self.run_stage(job, index).await;

        if let Err(e) = &outcome {
            error!("Rollback failed: {}", e);
            let (env_id, deployed) = {
                let j = job.read().await;
                (j.environment_id.clone(), j.deploy_started())
            };
            if deployed {
                self.mark_error(&env_id).await;
            }
        }

        let mut j = job.write().await;
        let event = match outcome {
            Ok(()) => JobEvent::RollbackSucceeded,
            Err(e) => JobEvent::RollbackFailed(e.to_string()),
        };
        j.rollback_completed_at = Some(Utc::now());
        if let Err(e) = self.transition(&mut j, event) {
            error!("Job {} cannot record rollback: {}", j.id, e);
        }
        info!("Deployment job {} settled as {}", j.id, j.status);
        j.status
    }
}
