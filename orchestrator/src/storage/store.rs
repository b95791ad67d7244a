//! Durable store collaborator
//!
//! The orchestrator keeps environments and in-flight jobs in memory. The
//! store is where environments are loaded from at startup, where status
//! updates are written back, and where finished jobs are recorded for
//! history queries.

use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::OrchestratorError;
use crate::filesys::file::File;
use crate::models::records::{EnvironmentRecord, JobRecord};

/// Durable store interface
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Load every stored environment, in registration order
    async fn load_environments(&self) -> Result<Vec<EnvironmentRecord>, OrchestratorError>;

    /// Insert or replace an environment record
    async fn save_environment(&self, record: &EnvironmentRecord) -> Result<(), OrchestratorError>;

    /// Insert or replace a job record
    async fn save_job(&self, record: &JobRecord) -> Result<(), OrchestratorError>;

    /// Stored jobs, newest first, optionally filtered by environment
    async fn list_history(
        &self,
        environment_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<JobRecord>, OrchestratorError>;
}

fn upsert_environment(records: &mut Vec<EnvironmentRecord>, record: &EnvironmentRecord) {
    match records.iter_mut().find(|r| r.id == record.id) {
        Some(existing) => *existing = record.clone(),
        None => records.push(record.clone()),
    }
}

fn upsert_job(records: &mut Vec<JobRecord>, record: &JobRecord) {
    match records.iter_mut().find(|r| r.id == record.id) {
        Some(existing) => *existing = record.clone(),
        None => records.push(record.clone()),
    }
}

fn select_history(records: &[JobRecord], environment_id: Option<&str>, limit: usize) -> Vec<JobRecord> {
    let mut history: Vec<JobRecord> = records
        .iter()
        .filter(|r| environment_id.map_or(true, |id| r.environment_id == id))
        .cloned()
        .collect();
    history.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
    history.truncate(limit);
    history
}

// ================================= MEMORY ======================================= //

/// In-memory store for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryStore {
    environments: RwLock<Vec<EnvironmentRecord>>,
    jobs: RwLock<Vec<JobRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with environment records
    pub fn with_environments(records: Vec<EnvironmentRecord>) -> Self {
        Self {
            environments: RwLock::new(records),
            jobs: RwLock::new(Vec::new()),
        }
    }

    pub fn environment(&self, id: &str) -> Option<EnvironmentRecord> {
        let environments = self.environments.read().unwrap_or_else(|e| e.into_inner());
        environments.iter().find(|r| r.id == id).cloned()
    }

    pub fn job(&self, id: &str) -> Option<JobRecord> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.iter().find(|r| r.id == id).cloned()
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn load_environments(&self) -> Result<Vec<EnvironmentRecord>, OrchestratorError> {
        let environments = self.environments.read().unwrap_or_else(|e| e.into_inner());
        Ok(environments.clone())
    }

    async fn save_environment(&self, record: &EnvironmentRecord) -> Result<(), OrchestratorError> {
        let mut environments = self.environments.write().unwrap_or_else(|e| e.into_inner());
        upsert_environment(&mut environments, record);
        Ok(())
    }

    async fn save_job(&self, record: &JobRecord) -> Result<(), OrchestratorError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        upsert_job(&mut jobs, record);
        Ok(())
    }

    async fn list_history(
        &self,
        environment_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<JobRecord>, OrchestratorError> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        Ok(select_history(&jobs, environment_id, limit))
    }
}

// ================================== FILE ======================================== //

/// Store backed by two JSON documents: `environments.json` and `jobs.json`
pub struct JsonFileStore {
    environments_file: File,
    jobs_file: File,
    // Serializes read-modify-write cycles on the documents
    write_lock: Mutex<()>,
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct EnvironmentsDocument {
    #[serde(default)]
    environments: Vec<EnvironmentRecord>,
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct JobsDocument {
    #[serde(default)]
    jobs: Vec<JobRecord>,
}

impl JsonFileStore {
    pub fn new(environments_file: File, jobs_file: File) -> Self {
        Self {
            environments_file,
            jobs_file,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl DeploymentStore for JsonFileStore {
    async fn load_environments(&self) -> Result<Vec<EnvironmentRecord>, OrchestratorError> {
        let doc: EnvironmentsDocument = self
            .environments_file
            .read_json_or_default()
            .await
            .map_err(|e| OrchestratorError::StorageError(format!("load environments: {}", e)))?;
        debug!(
            "Loaded {} environments from {}",
            doc.environments.len(),
            self.environments_file.path().display()
        );
        Ok(doc.environments)
    }

    async fn save_environment(&self, record: &EnvironmentRecord) -> Result<(), OrchestratorError> {
        let _guard = self.write_lock.lock().await;
        let mut doc: EnvironmentsDocument = self.environments_file.read_json_or_default().await?;
        upsert_environment(&mut doc.environments, record);
        self.environments_file
            .write_json(&doc)
            .await
            .map_err(|e| OrchestratorError::StorageError(format!("save environment: {}", e)))
    }

    async fn save_job(&self, record: &JobRecord) -> Result<(), OrchestratorError> {
        let _guard = self.write_lock.lock().await;
        let mut doc: JobsDocument = self.jobs_file.read_json_or_default().await?;
        upsert_job(&mut doc.jobs, record);
        self.jobs_file
            .write_json(&doc)
            .await
            .map_err(|e| OrchestratorError::StorageError(format!("save job: {}", e)))
    }

    async fn list_history(
        &self,
        environment_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<JobRecord>, OrchestratorError> {
        let doc: JobsDocument = self.jobs_file.read_json_or_default().await?;
        Ok(select_history(&doc.jobs, environment_id, limit))
    }
}
