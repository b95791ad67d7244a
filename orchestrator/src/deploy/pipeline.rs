//! Stage pipeline builder

use chrono::Utc;

use crate::models::deployment::{
    DeploymentConfig, DeploymentJob, JobArtifacts, JobStatus, RolloutStrategy, Stage, StageName,
};
use crate::utils::generate_uuid;

/// Ordered stage names for a configuration. Canary Validation sits between
/// Health Check and Finalize, and only for the canary strategy.
pub fn stage_plan(config: &DeploymentConfig) -> Vec<StageName> {
    let mut plan = vec![
        StageName::Build,
        StageName::Test,
        StageName::SecurityScan,
        StageName::Deploy,
        StageName::HealthCheck,
    ];
    if config.rollout_strategy == RolloutStrategy::Canary {
        plan.push(StageName::CanaryValidation);
    }
    plan.push(StageName::Finalize);
    plan
}

/// Build the pending stage list for a configuration
pub fn build_stages(config: &DeploymentConfig) -> Vec<Stage> {
    stage_plan(config).into_iter().map(Stage::new).collect()
}

/// Construct a pending job for an admitted request
pub fn new_job(config: DeploymentConfig, requested_by: &str) -> DeploymentJob {
    DeploymentJob {
        id: generate_uuid(),
        environment_id: config.environment_id.clone(),
        requested_by: requested_by.to_string(),
        stages: build_stages(&config),
        config,
        status: JobStatus::Pending,
        created_at: Utc::now(),
        started_at: None,
        ended_at: None,
        rollback_completed_at: None,
        previous_version: None,
        error: None,
        artifacts: JobArtifacts::default(),
    }
}
