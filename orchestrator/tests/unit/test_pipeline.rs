//! End-to-end pipeline tests against the in-memory store

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::Semaphore;

use deploy_orchestrator::authn::authorizer::AllowList;
use deploy_orchestrator::deploy::notify::JobNotification;
use deploy_orchestrator::errors::OrchestratorError;
use deploy_orchestrator::models::deployment::{
    DeploymentConfig, JobStatus, RolloutStrategy, StageName, StageStatus,
};
use deploy_orchestrator::models::environment::{
    EnvironmentSpec, EnvironmentStatus, EnvironmentType,
};

use crate::common::{harness, harness_with, wait_idle, wait_settled, ScriptedWork};

async fn staging(harness: &crate::common::Harness, version: Option<&str>) -> String {
    let mut spec = EnvironmentSpec::new("staging-1", EnvironmentType::Staging);
    if let Some(version) = version {
        spec = spec.with_version(version);
    }
    harness.orchestrator.register_environment(spec).await.unwrap()
}

#[tokio::test]
async fn test_rolling_deployment_completes() {
    let h = harness(ScriptedWork::succeeding(), 3);
    let env_id = staging(&h, None).await;

    let config = DeploymentConfig::new(&env_id, "v2.0.0", RolloutStrategy::Rolling);
    let job_id = h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .unwrap();

    let job = wait_settled(&h.orchestrator, &job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.stages.len(), 6);
    assert!(job.stage(StageName::CanaryValidation).is_none());
    assert!(job.stages.iter().all(|s| s.status == StageStatus::Completed));
    assert!(job.started_at.is_some());
    assert!(job.ended_at.is_some());
    assert!(job.error.is_none());

    assert_eq!(job.artifacts.test_results.as_deref(), Some("128/128 passed"));
    assert!(job.artifacts.build_logs.is_some());
    let deploy = job.stage(StageName::Deploy).unwrap();
    assert!(deploy.logs.iter().any(|l| l.contains("Rolling out v2.0.0")));

    let env = h.orchestrator.get_environment(&env_id).unwrap();
    assert_eq!(env.version.as_deref(), Some("v2.0.0"));
    assert_eq!(env.status, EnvironmentStatus::Active);
    assert!(env.last_deployment.is_some());
}

#[tokio::test]
async fn test_stages_run_in_order() {
    let h = harness(ScriptedWork::succeeding(), 3);
    let env_id = staging(&h, None).await;

    let config = DeploymentConfig::new(&env_id, "v2.0.0", RolloutStrategy::BlueGreen);
    let job_id = h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .unwrap();
    let job = wait_settled(&h.orchestrator, &job_id).await;

    for pair in job.stages.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        assert!(prev.ended_at.unwrap() <= next.started_at.unwrap());
    }

    let deploy = job.stage(StageName::Deploy).unwrap();
    assert!(deploy.logs[0].contains("Creating parallel environment"));
    assert!(deploy.logs.iter().any(|l| l.contains("Switching traffic")));
}

#[tokio::test]
async fn test_failed_test_stage_halts_pipeline() {
    let h = harness(ScriptedWork::failing_at(&[StageName::Test]), 3);
    let env_id = staging(&h, Some("v1.0.0")).await;

    let config = DeploymentConfig::new(&env_id, "v2.0.0", RolloutStrategy::Rolling);
    let job_id = h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .unwrap();

    let job = wait_settled(&h.orchestrator, &job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.ended_at.is_some());
    assert!(job.error.as_deref().unwrap().contains("Test"));
    assert!(job.stage(StageName::Rollback).is_none());

    let test = job.stage(StageName::Test).unwrap();
    assert_eq!(test.status, StageStatus::Failed);
    assert!(test.logs.iter().any(|l| l.starts_with("Stage failed:")));

    let after: Vec<_> = job.stages.iter().skip(2).collect();
    assert_eq!(after.len(), 4);
    assert!(after.iter().all(|s| s.status == StageStatus::Pending));

    // Nothing reached the environment
    assert!(job.previous_version.is_none());
    let env = h.orchestrator.get_environment(&env_id).unwrap();
    assert_eq!(env.version.as_deref(), Some("v1.0.0"));
    assert_eq!(env.status, EnvironmentStatus::Active);
}

#[tokio::test]
async fn test_failure_after_deploy_marks_environment_error() {
    let h = harness(ScriptedWork::failing_at(&[StageName::HealthCheck]), 3);
    let env_id = staging(&h, Some("v1.0.0")).await;

    let config = DeploymentConfig::new(&env_id, "v2.0.0", RolloutStrategy::Rolling);
    let job_id = h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .unwrap();

    let job = wait_settled(&h.orchestrator, &job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.previous_version.as_deref(), Some("v1.0.0"));

    let env = h.orchestrator.get_environment(&env_id).unwrap();
    assert_eq!(env.version.as_deref(), Some("v1.0.0"));
    assert_eq!(env.status, EnvironmentStatus::Error);
}

#[tokio::test]
async fn test_rollback_before_deploy_leaves_environment_untouched() {
    let h = harness(ScriptedWork::failing_at(&[StageName::Build]), 3);
    let env_id = h
        .orchestrator
        .register_environment(
            EnvironmentSpec::new("prod-1", EnvironmentType::Production).with_version("v1.0.0"),
        )
        .await
        .unwrap();

    let config = DeploymentConfig::new(&env_id, "v2.0.0", RolloutStrategy::BlueGreen)
        .with_rollback(true);
    let job_id = h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .unwrap();

    let job = wait_settled(&h.orchestrator, &job_id).await;
    assert_eq!(job.status, JobStatus::RolledBack);
    assert!(job.rollback_completed_at.is_some());
    assert_eq!(
        job.stage(StageName::Deploy).unwrap().status,
        StageStatus::Pending
    );

    let rollback = job.stage(StageName::Rollback).unwrap();
    assert_eq!(rollback.status, StageStatus::Completed);
    assert!(rollback.logs.iter().any(|l| l.contains("Nothing was deployed")));

    let env = h.orchestrator.get_environment(&env_id).unwrap();
    assert_eq!(env.version.as_deref(), Some("v1.0.0"));
    assert_eq!(env.status, EnvironmentStatus::Active);
}

#[tokio::test]
async fn test_rollback_restores_previous_version() {
    let h = harness(ScriptedWork::failing_at(&[StageName::HealthCheck]), 3);
    let env_id = staging(&h, Some("v1.0.0")).await;

    let config = DeploymentConfig::new(&env_id, "v2.0.0", RolloutStrategy::Rolling)
        .with_rollback(true);
    let job_id = h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .unwrap();

    let job = wait_settled(&h.orchestrator, &job_id).await;
    assert_eq!(job.status, JobStatus::RolledBack);
    assert_eq!(job.previous_version.as_deref(), Some("v1.0.0"));
    assert!(job.rollback_completed_at.is_some());
    assert_eq!(job.stages.len(), 7);

    let rollback = job.stages.last().unwrap();
    assert_eq!(rollback.name, StageName::Rollback);
    assert_eq!(rollback.status, StageStatus::Completed);
    assert!(rollback.logs.iter().any(|l| l == "Restored version v1.0.0"));
    assert_eq!(
        job.stage(StageName::Finalize).unwrap().status,
        StageStatus::Pending
    );

    let env = h.orchestrator.get_environment(&env_id).unwrap();
    assert_eq!(env.version.as_deref(), Some("v1.0.0"));
    assert_eq!(env.status, EnvironmentStatus::Active);
}

#[tokio::test]
async fn test_rollback_failure_leaves_job_failed() {
    let h = harness(
        ScriptedWork::failing_at(&[StageName::Deploy, StageName::Rollback]),
        3,
    );
    let env_id = staging(&h, Some("v1.0.0")).await;

    let config = DeploymentConfig::new(&env_id, "v2.0.0", RolloutStrategy::Rolling)
        .with_rollback(true);
    let job_id = h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .unwrap();

    let job = wait_settled(&h.orchestrator, &job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.rollback_completed_at.is_some());
    assert!(job.error.as_deref().unwrap().contains("rollback failed"));
    assert_eq!(
        job.stage(StageName::Rollback).unwrap().status,
        StageStatus::Failed
    );

    let env = h.orchestrator.get_environment(&env_id).unwrap();
    assert_eq!(env.status, EnvironmentStatus::Error);
    assert_eq!(env.version.as_deref(), Some("v1.0.0"));
}

#[tokio::test]
async fn test_rollback_without_previous_version_fails() {
    let h = harness(ScriptedWork::failing_at(&[StageName::Deploy]), 3);
    let env_id = staging(&h, None).await;

    let config = DeploymentConfig::new(&env_id, "v1.0.0", RolloutStrategy::Rolling)
        .with_rollback(true);
    let job_id = h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .unwrap();

    let job = wait_settled(&h.orchestrator, &job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    let rollback = job.stage(StageName::Rollback).unwrap();
    assert_eq!(rollback.status, StageStatus::Failed);
    assert!(rollback
        .logs
        .iter()
        .any(|l| l.contains("no previous version")));

    let env = h.orchestrator.get_environment(&env_id).unwrap();
    assert!(env.version.is_none());
    assert_eq!(env.status, EnvironmentStatus::Error);
}

async fn wait_for_status(h: &crate::common::Harness, job_id: &str, status: JobStatus) {
    for _ in 0..500 {
        if h.orchestrator.get_job(job_id).await.unwrap().status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} never reached {}", job_id, status);
}

#[tokio::test]
async fn test_rollback_keeps_later_deployment() {
    let gate = Arc::new(Semaphore::new(0));
    let work = ScriptedWork::default()
        .hold_for("v3.0.0", StageName::HealthCheck, gate.clone())
        .fail_for("v3.0.0", StageName::HealthCheck);
    let h = harness(work, 2);
    let env_id = staging(&h, Some("v1.0.0")).await;

    // v3 deploys first and parks in its health check
    let config = DeploymentConfig::new(&env_id, "v3.0.0", RolloutStrategy::Rolling)
        .with_rollback(true);
    let slow = h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .unwrap();
    assert_eq!(h.orchestrator.dispatch_ready(), vec![slow.clone()]);
    wait_for_status(&h, &slow, JobStatus::Testing).await;

    // v2 lands while v3 is still verifying
    let config = DeploymentConfig::new(&env_id, "v2.0.0", RolloutStrategy::Rolling);
    let fast = h
        .orchestrator
        .request_deployment(&env_id, config, "bob")
        .await
        .unwrap();
    let job = wait_settled(&h.orchestrator, &fast).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(
        h.orchestrator.get_environment(&env_id).unwrap().version.as_deref(),
        Some("v2.0.0")
    );

    gate.add_permits(1);
    let job = wait_settled(&h.orchestrator, &slow).await;
    assert_eq!(job.status, JobStatus::RolledBack);
    assert_eq!(job.previous_version.as_deref(), Some("v1.0.0"));
    let rollback = job.stage(StageName::Rollback).unwrap();
    assert_eq!(rollback.status, StageStatus::Completed);
    assert!(rollback.logs.iter().any(|l| l.contains("leaving it in place")));

    let env = h.orchestrator.get_environment(&env_id).unwrap();
    assert_eq!(env.version.as_deref(), Some("v2.0.0"));
    assert_eq!(env.status, EnvironmentStatus::Active);
}

#[tokio::test]
async fn test_end_time_is_fixed_before_rollback() {
    let gate = Arc::new(Semaphore::new(0));
    let work = ScriptedWork::failing_at(&[StageName::HealthCheck])
        .hold_at(StageName::Rollback, gate.clone());
    let h = harness(work, 3);
    let env_id = staging(&h, Some("v1.0.0")).await;
    let mut rx = h.orchestrator.subscribe();

    let config = DeploymentConfig::new(&env_id, "v2.0.0", RolloutStrategy::Rolling)
        .with_rollback(true);
    let job_id = h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .unwrap();
    h.orchestrator.dispatch_ready();

    let failed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(JobNotification::StatusChanged { job_id: id, status })
                    if id == job_id && status == JobStatus::Failed =>
                {
                    break;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("notification channel closed"),
            }
        }
    })
    .await;
    assert!(failed.is_ok());

    // Rollback is parked, the primary run is already over
    let job = h.orchestrator.get_job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(!job.is_settled());
    assert!(job.rollback_completed_at.is_none());
    let ended_at = job.ended_at.unwrap();

    gate.add_permits(1);
    let job = wait_settled(&h.orchestrator, &job_id).await;
    assert_eq!(job.status, JobStatus::RolledBack);
    assert_eq!(job.ended_at, Some(ended_at));
    assert!(ended_at <= job.rollback_completed_at.unwrap());
}

#[tokio::test]
async fn test_aborted_executor_settles_job() {
    let h = harness(ScriptedWork::default().panicking_at(StageName::Test), 3);
    let env_id = staging(&h, Some("v1.0.0")).await;

    let config = DeploymentConfig::new(&env_id, "v2.0.0", RolloutStrategy::Rolling)
        .with_rollback(true);
    let job_id = h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .unwrap();

    let job = wait_settled(&h.orchestrator, &job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("executor aborted"));
    assert!(job.ended_at.is_some());
    assert!(job.rollback_completed_at.is_some());

    wait_idle(&h.orchestrator).await;
    assert!(h.store.job(&job_id).is_some());
}

#[tokio::test]
async fn test_canary_validation_between_health_check_and_finalize() {
    let h = harness(ScriptedWork::succeeding(), 3);
    let env_id = staging(&h, None).await;

    let config = DeploymentConfig::new(&env_id, "v2.0.0", RolloutStrategy::Canary)
        .with_canary(10, 0);
    let job_id = h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .unwrap();

    let job = wait_settled(&h.orchestrator, &job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(
        job.stage_names(),
        vec![
            StageName::Build,
            StageName::Test,
            StageName::SecurityScan,
            StageName::Deploy,
            StageName::HealthCheck,
            StageName::CanaryValidation,
            StageName::Finalize,
        ]
    );

    let canary = job.stage(StageName::CanaryValidation).unwrap();
    assert!(canary.logs.iter().any(|l| l.contains("Routing 10%")));
    assert!(canary.logs.iter().any(|l| l.contains("metrics look good")));
    assert!(canary.logs.iter().any(|l| l.contains("Promoting canary")));
}

#[tokio::test]
async fn test_five_jobs_with_cap_of_three() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(ScriptedWork::gated(gate.clone()), 3);
    let env_id = staging(&h, None).await;

    let mut job_ids = Vec::new();
    for i in 0..5 {
        let config =
            DeploymentConfig::new(&env_id, format!("v{}.0.0", i), RolloutStrategy::Rolling);
        job_ids.push(
            h.orchestrator
                .request_deployment(&env_id, config, "alice")
                .await
                .unwrap(),
        );
    }
    assert_eq!(h.orchestrator.queue_len(), 5);

    let started = h.orchestrator.dispatch_ready();
    assert_eq!(started, job_ids[..3].to_vec());
    assert_eq!(h.orchestrator.in_flight_count(), 3);
    assert_eq!(h.orchestrator.queue_len(), 2);

    // Started jobs park in Build until the gate opens
    for _ in 0..100 {
        let mut building = 0;
        for id in &job_ids[..3] {
            if h.orchestrator.get_job(id).await.unwrap().status == JobStatus::Building {
                building += 1;
            }
        }
        if building == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for id in &job_ids[..3] {
        assert_eq!(
            h.orchestrator.get_job(id).await.unwrap().status,
            JobStatus::Building
        );
    }
    for id in &job_ids[3..] {
        assert_eq!(
            h.orchestrator.get_job(id).await.unwrap().status,
            JobStatus::Pending
        );
    }

    // No free slot, nothing new starts
    assert!(h.orchestrator.dispatch_ready().is_empty());
    let queued: Vec<String> = h
        .orchestrator
        .queued_jobs()
        .await
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(queued, job_ids[3..].to_vec());

    let active = h.orchestrator.list_active_deployments().await;
    assert_eq!(active.len(), 3);

    gate.add_permits(5);
    for _ in 0..500 {
        h.orchestrator.dispatch_ready();
        assert!(h.orchestrator.in_flight_count() <= 3);
        if h.orchestrator.queue_len() == 0 && h.orchestrator.in_flight_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for id in &job_ids {
        assert_eq!(
            h.orchestrator.get_job(id).await.unwrap().status,
            JobStatus::Completed
        );
    }
}

#[tokio::test]
async fn test_unknown_environment_is_rejected() {
    let h = harness(ScriptedWork::succeeding(), 3);

    let config = DeploymentConfig::new("missing", "v1", RolloutStrategy::Rolling);
    let err = h
        .orchestrator
        .request_deployment("missing", config, "alice")
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::EnvironmentNotFound(_)));
    assert_eq!(h.orchestrator.queue_len(), 0);
}

#[tokio::test]
async fn test_unauthorized_requestor_is_rejected() {
    let h = harness_with(
        ScriptedWork::succeeding(),
        Arc::new(AllowList::new(["alice"])),
        3,
    );
    let env_id = staging(&h, None).await;

    let config = DeploymentConfig::new(&env_id, "v1", RolloutStrategy::Rolling);
    let err = h
        .orchestrator
        .request_deployment(&env_id, config.clone(), "mallory")
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::PermissionDenied(_)));
    assert_eq!(h.orchestrator.queue_len(), 0);

    assert!(h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .is_ok());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let h = harness(ScriptedWork::succeeding(), 3);
    let env_id = staging(&h, None).await;

    // Canary without a canary configuration
    let config = DeploymentConfig::new(&env_id, "v1", RolloutStrategy::Canary);
    let err = h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ValidationError(_)));

    // Configuration aimed at a different environment
    let config = DeploymentConfig::new("other", "v1", RolloutStrategy::Rolling);
    let err = h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ValidationError(_)));
}

#[tokio::test]
async fn test_unknown_job() {
    let h = harness(ScriptedWork::succeeding(), 3);
    let err = h.orchestrator.get_job("nope").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::JobNotFound(_)));
}

#[tokio::test]
async fn test_history_is_persisted_newest_first() {
    let h = harness(ScriptedWork::succeeding(), 1);
    let env_id = staging(&h, None).await;

    let mut job_ids = Vec::new();
    for version in ["v1", "v2"] {
        let config = DeploymentConfig::new(&env_id, version, RolloutStrategy::Rolling);
        let job_id = h
            .orchestrator
            .request_deployment(&env_id, config, "alice")
            .await
            .unwrap();
        // Space the two jobs out so their end times differ
        wait_settled(&h.orchestrator, &job_id).await;
        wait_idle(&h.orchestrator).await;
        job_ids.push(job_id);
    }

    let history = h
        .orchestrator
        .list_deployment_history(Some(&env_id), 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, job_ids[1]);
    assert_eq!(history[1].id, job_ids[0]);
    assert_eq!(history[0].steps.len(), 6);
    assert_eq!(history[0].steps[0].action, "Build");
    assert_eq!(history[0].metadata["version"], "v2");

    let limited = h
        .orchestrator
        .list_deployment_history(Some(&env_id), 1)
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);

    let other = h
        .orchestrator
        .list_deployment_history(Some("other-env"), 10)
        .await
        .unwrap();
    assert!(other.is_empty());

    assert!(h.store.job(&job_ids[0]).is_some());
}

#[tokio::test]
async fn test_status_notifications() {
    let h = harness(ScriptedWork::succeeding(), 3);
    let env_id = staging(&h, None).await;
    let mut rx = h.orchestrator.subscribe();

    let config = DeploymentConfig::new(&env_id, "v2.0.0", RolloutStrategy::Rolling);
    let job_id = h
        .orchestrator
        .request_deployment(&env_id, config, "alice")
        .await
        .unwrap();
    wait_settled(&h.orchestrator, &job_id).await;

    let mut statuses = Vec::new();
    let mut stages_started = 0;
    loop {
        match rx.try_recv() {
            Ok(JobNotification::StatusChanged { status, .. }) => statuses.push(status),
            Ok(JobNotification::StageStarted { .. }) => stages_started += 1,
            Ok(_) => {}
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }

    assert_eq!(
        statuses,
        vec![
            JobStatus::Building,
            JobStatus::Deploying,
            JobStatus::Testing,
            JobStatus::Completed,
        ]
    );
    assert_eq!(stages_started, 6);
}
