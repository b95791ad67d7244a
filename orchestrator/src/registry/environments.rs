//! Environment registry

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::errors::OrchestratorError;
use crate::models::environment::{
    Environment, EnvironmentSpec, EnvironmentStatus, HealthSnapshot,
};
use crate::models::records::EnvironmentRecord;
use crate::storage::store::DeploymentStore;
use crate::utils::generate_uuid;

/// Result of a rollback request against the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The environment now runs this version again
    Restored(String),
    /// A later deployment owns the environment; it was left untouched
    Superseded(Option<String>),
}

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    records: HashMap<String, Environment>,
}

/// Known deployment targets.
///
/// Every mutation happens under one write lock, so a deployment result and a
/// health snapshot landing on the same record at the same time both survive.
/// The lock is never held across an await; persistence works on a clone.
pub struct EnvironmentRegistry {
    inner: RwLock<Inner>,
    store: Arc<dyn DeploymentStore>,
}

impl EnvironmentRegistry {
    /// Create an empty registry
    pub fn new(store: Arc<dyn DeploymentStore>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            store,
        }
    }

    /// Create a registry populated from the store
    pub async fn load(store: Arc<dyn DeploymentStore>) -> Result<Self, OrchestratorError> {
        let records = store.load_environments().await?;
        let registry = Self::new(store);
        {
            let mut inner = registry.write();
            for record in records {
                let env = record.into_environment();
                if inner.records.contains_key(&env.id) {
                    warn!("Duplicate environment {} in store, keeping the first", env.id);
                    continue;
                }
                inner.order.push(env.id.clone());
                inner.records.insert(env.id.clone(), env);
            }
            info!("Loaded {} environments", inner.order.len());
        }
        Ok(registry)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new environment and persist it
    pub async fn register(&self, spec: EnvironmentSpec) -> Result<String, OrchestratorError> {
        if spec.name.trim().is_empty() {
            return Err(OrchestratorError::ValidationError(
                "environment name is required".to_string(),
            ));
        }

        let env = Environment {
            id: generate_uuid(),
            name: spec.name.trim().to_string(),
            env_type: spec.env_type,
            status: spec.status,
            url: spec.url,
            version: spec.version,
            last_deployment: None,
            health: HealthSnapshot::healthy_now(),
            resources: spec.resources,
            scaling: spec.scaling,
        };

        self.store
            .save_environment(&EnvironmentRecord::from(&env))
            .await?;

        let id = env.id.clone();
        {
            let mut inner = self.write();
            inner.order.push(id.clone());
            inner.records.insert(id.clone(), env);
        }

        info!("Registered environment {}", id);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<Environment, OrchestratorError> {
        self.read()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::EnvironmentNotFound(id.to_string()))
    }

    /// Snapshot of every environment, in registration order
    pub fn list(&self) -> Vec<Environment> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<F>(&self, id: &str, f: F) -> Result<Environment, OrchestratorError>
    where
        F: FnOnce(&mut Environment),
    {
        self.update_with(id, f).map(|(env, ())| env)
    }

    /// Mutate a record under the write lock, returning the closure's verdict
    fn update_with<F, R>(&self, id: &str, f: F) -> Result<(Environment, R), OrchestratorError>
    where
        F: FnOnce(&mut Environment) -> R,
    {
        let mut inner = self.write();
        let env = inner
            .records
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::EnvironmentNotFound(id.to_string()))?;
        let verdict = f(env);
        Ok((env.clone(), verdict))
    }

    async fn persist(&self, env: &Environment) {
        if let Err(e) = self.store.save_environment(&EnvironmentRecord::from(env)).await {
            warn!("Failed to persist environment {}: {}", env.id, e);
        }
    }

    /// Record a successful deployment
    pub async fn apply_deployment_result(
        &self,
        id: &str,
        new_version: &str,
    ) -> Result<(), OrchestratorError> {
        let env = self.update(id, |env| {
            env.status = EnvironmentStatus::Active;
            env.version = Some(new_version.to_string());
            env.last_deployment = Some(Utc::now());
        })?;
        info!("Environment {} now at version {}", id, new_version);
        self.persist(&env).await;
        Ok(())
    }

    /// Overwrite the health fields only
    pub fn apply_health_snapshot(
        &self,
        id: &str,
        snapshot: HealthSnapshot,
    ) -> Result<(), OrchestratorError> {
        self.update(id, |env| env.health = snapshot)?;
        debug!("Updated health snapshot for {}", id);
        Ok(())
    }

    /// Mark an environment as receiving a deployment, returning the version
    /// live at that moment
    pub async fn begin_deployment(&self, id: &str) -> Result<Option<String>, OrchestratorError> {
        let (env, live) = self.update_with(id, |env| {
            env.status = EnvironmentStatus::Deploying;
            env.version.clone()
        })?;
        self.persist(&env).await;
        Ok(live)
    }

    /// Restore the version that was live before a failed deployment.
    ///
    /// The check and the write happen under one lock. If another job has
    /// moved the environment to a version other than `failed_version` or
    /// `previous_version`, that newer state is left in place.
    pub async fn apply_rollback(
        &self,
        id: &str,
        failed_version: &str,
        previous_version: Option<&str>,
    ) -> Result<RollbackOutcome, OrchestratorError> {
        let (env, outcome) = self.update_with(id, |env| {
            let current = env.version.as_deref();
            if current != Some(failed_version) && current != previous_version {
                return Ok::<_, OrchestratorError>(RollbackOutcome::Superseded(env.version.clone()));
            }
            let previous = previous_version.ok_or_else(|| {
                OrchestratorError::RollbackFailure("no previous version to restore".to_string())
            })?;
            env.status = EnvironmentStatus::Active;
            env.version = Some(previous.to_string());
            Ok(RollbackOutcome::Restored(previous.to_string()))
        })?;
        let outcome = outcome?;

        match &outcome {
            RollbackOutcome::Restored(version) => {
                info!("Environment {} rolled back to {}", id, version);
                self.persist(&env).await;
            }
            RollbackOutcome::Superseded(current) => {
                info!(
                    "Environment {} moved on to {:?}, skipping rollback",
                    id, current
                );
            }
        }
        Ok(outcome)
    }

    /// Mark an environment as broken by an unrecovered deployment
    pub async fn mark_error(&self, id: &str) -> Result<(), OrchestratorError> {
        let env = self.update(id, |env| env.status = EnvironmentStatus::Error)?;
        self.persist(&env).await;
        Ok(())
    }
}
