//! Deployment orchestrator
//!
//! Owns the environment registry, the FIFO job queue and the in-flight set.
//! Jobs are admitted by [`Orchestrator::request_deployment`], started by
//! [`Orchestrator::dispatch_ready`] (driven by the dispatcher worker) and
//! observed by polling [`Orchestrator::get_job`].
//!
//! The queue is unbounded; only concurrently executing jobs are capped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

use crate::authn::authorizer::Authorizer;
use crate::cache::jobs::{JobCache, JobHandle};
use crate::deploy::executor::JobExecutor;
use crate::deploy::notify::{JobNotification, Notifier};
use crate::deploy::pipeline::new_job;
use crate::deploy::work::StageWork;
use crate::errors::OrchestratorError;
use crate::health::monitor::{HealthMonitor, MonitorSettings};
use crate::health::probe::HealthProbe;
use crate::models::deployment::{DeploymentConfig, DeploymentJob, JobStatus, RolloutStrategy};
use crate::models::environment::{Environment, EnvironmentSpec, HealthSnapshot};
use crate::models::records::JobRecord;
use crate::registry::environments::EnvironmentRegistry;
use crate::storage::store::DeploymentStore;

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Cap on concurrently executing jobs
    pub max_concurrent_deployments: usize,

    /// Finished jobs kept in memory for polling
    pub job_retention: usize,

    pub monitor: MonitorSettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_deployments: 3,
            job_retention: 100,
            monitor: MonitorSettings::default(),
        }
    }
}

/// Collaborators injected by the composition root
pub struct Collaborators {
    pub store: Arc<dyn DeploymentStore>,
    pub authorizer: Arc<dyn Authorizer>,
    pub work: Arc<dyn StageWork>,
    pub probe: Arc<dyn HealthProbe>,
}

#[derive(Default)]
struct DispatchState {
    queue: VecDeque<String>,
    in_flight: Vec<String>,
}

pub struct Orchestrator {
    registry: Arc<EnvironmentRegistry>,
    store: Arc<dyn DeploymentStore>,
    authorizer: Arc<dyn Authorizer>,
    executor: Arc<JobExecutor>,
    monitor: HealthMonitor,
    jobs: JobCache,
    dispatch: Mutex<DispatchState>,
    notifier: Notifier,
    max_concurrent: usize,
}

impl Orchestrator {
    /// Build an orchestrator over an already loaded registry
    pub fn new(
        registry: Arc<EnvironmentRegistry>,
        collaborators: Collaborators,
        settings: OrchestratorSettings,
    ) -> Self {
        let notifier = Notifier::default();
        let executor = Arc::new(JobExecutor::new(
            registry.clone(),
            collaborators.work,
            notifier.clone(),
        ));
        let monitor = HealthMonitor::new(registry.clone(), collaborators.probe, settings.monitor);

        Self {
            registry,
            store: collaborators.store,
            authorizer: collaborators.authorizer,
            executor,
            monitor,
            jobs: JobCache::new(settings.job_retention),
            dispatch: Mutex::new(DispatchState::default()),
            notifier,
            max_concurrent: settings.max_concurrent_deployments.max(1),
        }
    }

    /// Load environments from the store and build an orchestrator
    pub async fn load(
        collaborators: Collaborators,
        settings: OrchestratorSettings,
    ) -> Result<Self, OrchestratorError> {
        let registry = Arc::new(EnvironmentRegistry::load(collaborators.store.clone()).await?);
        Ok(Self::new(registry, collaborators, settings))
    }

    fn dispatch_state(&self) -> std::sync::MutexGuard<'_, DispatchState> {
        self.dispatch.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn max_concurrent_deployments(&self) -> usize {
        self.max_concurrent
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobNotification> {
        self.notifier.subscribe()
    }

    // ============================== ENVIRONMENTS ================================= //

    pub async fn register_environment(
        &self,
        spec: EnvironmentSpec,
    ) -> Result<String, OrchestratorError> {
        self.registry.register(spec).await
    }

    pub fn list_environments(&self) -> Vec<Environment> {
        self.registry.list()
    }

    pub fn get_environment(&self, id: &str) -> Result<Environment, OrchestratorError> {
        self.registry.get(id)
    }

    // ================================ REQUESTS ================================== //

    /// Admit a deployment into the queue and return its job id
    pub async fn request_deployment(
        &self,
        environment_id: &str,
        mut config: DeploymentConfig,
        requestor_id: &str,
    ) -> Result<String, OrchestratorError> {
        let environment = self.registry.get(environment_id)?;

        if !self.authorizer.can_deploy(requestor_id, &environment).await {
            warn!(
                "Requestor {} may not deploy to {}",
                requestor_id, environment_id
            );
            return Err(OrchestratorError::PermissionDenied(format!(
                "{} may not deploy to {}",
                requestor_id, environment_id
            )));
        }

        if config.environment_id.is_empty() {
            config.environment_id = environment_id.to_string();
        }
        validate_config(environment_id, &config)?;

        let job = new_job(config, requestor_id);
        let job_id = job.id.clone();
        info!(
            "Queued deployment {} of {} to {} ({})",
            job_id, job.config.version, environment_id, job.config.rollout_strategy
        );

        self.jobs.insert(job_id.clone(), Arc::new(RwLock::new(job)));
        self.dispatch_state().queue.push_back(job_id.clone());
        Ok(job_id)
    }

    // ================================= QUERIES ================================== //

    pub async fn get_job(&self, job_id: &str) -> Result<DeploymentJob, OrchestratorError> {
        let handle = self
            .jobs
            .get(job_id)
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;
        let job = handle.read().await.clone();
        Ok(job)
    }

    async fn snapshot(&self, ids: Vec<String>) -> Vec<DeploymentJob> {
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(handle) = self.jobs.get(&id) {
                jobs.push(handle.read().await.clone());
            }
        }
        jobs
    }

    /// Jobs currently executing, in start order
    pub async fn list_active_deployments(&self) -> Vec<DeploymentJob> {
        let ids = self.dispatch_state().in_flight.clone();
        self.snapshot(ids).await
    }

    /// Jobs waiting for a free slot, in FIFO order
    pub async fn queued_jobs(&self) -> Vec<DeploymentJob> {
        let ids: Vec<String> = self.dispatch_state().queue.iter().cloned().collect();
        self.snapshot(ids).await
    }

    pub fn in_flight_count(&self) -> usize {
        self.dispatch_state().in_flight.len()
    }

    pub fn queue_len(&self) -> usize {
        self.dispatch_state().queue.len()
    }

    /// Persisted job history, newest first
    pub async fn list_deployment_history(
        &self,
        environment_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<JobRecord>, OrchestratorError> {
        self.store.list_history(environment_id, limit).await
    }

    // ================================ DISPATCH ================================== //

    /// One queue-processor tick: start queued jobs while slots are free.
    /// Returns the ids of the jobs started.
    pub fn dispatch_ready(self: &Arc<Self>) -> Vec<String> {
        let started: Vec<String> = {
            let mut state = self.dispatch_state();
            let mut started = Vec::new();
            while state.in_flight.len() < self.max_concurrent {
                let Some(job_id) = state.queue.pop_front() else {
                    break;
                };
                state.in_flight.push(job_id.clone());
                started.push(job_id);
            }
            started
        };

        for job_id in &started {
            let Some(handle) = self.jobs.get(job_id) else {
                error!("Queued job {} vanished from the job cache", job_id);
                self.release(job_id);
                continue;
            };
            self.spawn_job(job_id.clone(), handle);
        }

        started
    }

    fn spawn_job(self: &Arc<Self>, job_id: String, handle: JobHandle) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let runner = {
                let executor = this.executor.clone();
                let handle = handle.clone();
                tokio::spawn(async move { executor.run(&handle).await })
            };

            let aborted = match runner.await {
                Ok(status) => {
                    info!("Job {} finished as {}", job_id, status);
                    None
                }
                Err(e) => Some(OrchestratorError::Internal(format!("executor aborted: {}", e))),
            };

            this.finish(&job_id, &handle, aborted).await;
        });
    }

    async fn finish(&self, job_id: &str, handle: &JobHandle, aborted: Option<OrchestratorError>) {
        let record = {
            let mut job = handle.write().await;
            if let Some(e) = aborted {
                error!("Job {} aborted: {}", job_id, e);
                settle_aborted(&mut job, &e);
            }
            if !job.status.is_terminal() {
                warn!("Job {} left the executor as {}", job_id, job.status);
            }
            JobRecord::from(&*job)
        };
        if let Err(e) = self.store.save_job(&record).await {
            warn!("Failed to persist job {}: {}", job_id, e);
        }

        self.release(job_id);
        self.jobs.mark_finished(job_id);
    }

    fn release(&self, job_id: &str) {
        self.dispatch_state().in_flight.retain(|id| id != job_id);
    }

    // ================================= HEALTH =================================== //

    /// Probe every environment once and record the snapshots
    pub async fn check_health(&self) -> Vec<(String, HealthSnapshot)> {
        self.monitor.check_all().await
    }
}

/// Force a job whose executor died into a settled failure so pollers and
/// the dispatch loop never wait on it
fn settle_aborted(job: &mut DeploymentJob, cause: &OrchestratorError) {
    if job.is_settled() {
        return;
    }
    let now = Utc::now();
    if !job.status.is_terminal() {
        job.status = JobStatus::Failed;
        job.error = Some(cause.to_string());
        job.ended_at.get_or_insert(now);
    }
    if job.status == JobStatus::Failed && job.config.rollback_enabled {
        job.rollback_completed_at.get_or_insert(now);
    }
}

fn validate_config(environment_id: &str, config: &DeploymentConfig) -> Result<(), OrchestratorError> {
    if config.environment_id != environment_id {
        return Err(OrchestratorError::ValidationError(format!(
            "configuration targets {} but the request targets {}",
            config.environment_id, environment_id
        )));
    }
    if config.version.trim().is_empty() {
        return Err(OrchestratorError::ValidationError(
            "version is required".to_string(),
        ));
    }
    if config.rollout_strategy == RolloutStrategy::Canary {
        match &config.canary {
            None => {
                return Err(OrchestratorError::ValidationError(
                    "canary strategy requires a canary configuration".to_string(),
                ))
            }
            Some(canary) if canary.percentage == 0 || canary.percentage > 100 => {
                return Err(OrchestratorError::ValidationError(format!(
                    "canary percentage must be within 1-100, got {}",
                    canary.percentage
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

