//! Persisted record shapes exchanged with the durable store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::deployment::{DeploymentJob, JobStatus, StageStatus};
use crate::models::environment::{
    Environment, EnvironmentStatus, EnvironmentType, HealthSnapshot, ResourceProfile,
    ScalingProfile,
};

/// Resource and scaling configuration of a stored environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfigRecord {
    pub resources: ResourceProfile,
    pub scaling: ScalingProfile,
}

/// Stored environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub env_type: EnvironmentType,
    pub status: EnvironmentStatus,
    pub url: Option<String>,
    pub version: Option<String>,
    pub config: EnvironmentConfigRecord,
    #[serde(default)]
    pub last_deployment: Option<DateTime<Utc>>,
}

impl From<&Environment> for EnvironmentRecord {
    fn from(env: &Environment) -> Self {
        Self {
            id: env.id.clone(),
            name: env.name.clone(),
            env_type: env.env_type,
            status: env.status,
            url: env.url.clone(),
            version: env.version.clone(),
            config: EnvironmentConfigRecord {
                resources: env.resources.clone(),
                scaling: env.scaling.clone(),
            },
            last_deployment: env.last_deployment,
        }
    }
}

impl EnvironmentRecord {
    /// Rehydrate a stored environment. Health is not persisted and starts
    /// as healthy until the monitor's first pass.
    pub fn into_environment(self) -> Environment {
        Environment {
            id: self.id,
            name: self.name,
            env_type: self.env_type,
            status: self.status,
            url: self.url,
            version: self.version,
            last_deployment: self.last_deployment,
            health: HealthSnapshot::healthy_now(),
            resources: self.config.resources,
            scaling: self.config.scaling,
        }
    }
}

/// One step of a stored job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStepRecord {
    pub action: String,
    pub status: StageStatus,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Stored job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub environment_id: String,
    pub status: JobStatus,
    pub steps: Vec<JobStepRecord>,
    pub metadata: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl From<&DeploymentJob> for JobRecord {
    fn from(job: &DeploymentJob) -> Self {
        let steps = job
            .stages
            .iter()
            .map(|stage| JobStepRecord {
                action: stage.name.to_string(),
                status: stage.status,
                timestamp: stage.ended_at.or(stage.started_at),
            })
            .collect();

        let metadata = serde_json::json!({
            "version": job.config.version,
            "build_id": job.config.build_id,
            "strategy": job.config.rollout_strategy.to_string(),
            "requested_by": job.requested_by,
            "previous_version": job.previous_version,
            "started_at": job.started_at,
            "ended_at": job.ended_at,
            "rollback_completed_at": job.rollback_completed_at,
            "error": job.error,
        });

        Self {
            id: job.id.clone(),
            environment_id: job.environment_id.clone(),
            status: job.status,
            steps,
            metadata,
            recorded_at: job.ended_at.unwrap_or_else(Utc::now),
        }
    }
}
