//! Deployment job models

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the Deploy stage rolls the new version out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RolloutStrategy {
    BlueGreen,
    Rolling,
    Canary,
}

impl fmt::Display for RolloutStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlueGreen => write!(f, "blue-green"),
            Self::Rolling => write!(f, "rolling"),
            Self::Canary => write!(f, "canary"),
        }
    }
}

/// Canary rollout parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanaryConfig {
    /// Share of traffic routed to the canary (0-100)
    pub percentage: u8,

    /// How long canary metrics are observed before promotion
    pub duration_secs: u64,
}

/// Requested resources. Opaque to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    #[serde(default)]
    pub cpu: String,
    #[serde(default)]
    pub memory: String,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
}

fn default_replicas() -> u32 {
    1
}

/// Deployment configuration. Immutable once the job starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub version: String,
    pub build_id: String,

    /// Filled from the request's target environment when omitted
    #[serde(default)]
    pub environment_id: String,
    #[serde(default)]
    pub rollback_enabled: bool,
    #[serde(default = "default_health_endpoint")]
    pub health_check_endpoint: String,
    #[serde(default)]
    pub environment_variables: HashMap<String, String>,
    #[serde(default)]
    pub resources: ResourceRequest,
    pub rollout_strategy: RolloutStrategy,
    #[serde(default)]
    pub canary: Option<CanaryConfig>,
}

fn default_health_endpoint() -> String {
    "/health".to_string()
}

impl DeploymentConfig {
    pub fn new(
        environment_id: impl Into<String>,
        version: impl Into<String>,
        rollout_strategy: RolloutStrategy,
    ) -> Self {
        let version = version.into();
        Self {
            build_id: format!("build-{}", version),
            version,
            environment_id: environment_id.into(),
            rollback_enabled: false,
            health_check_endpoint: default_health_endpoint(),
            environment_variables: HashMap::new(),
            resources: ResourceRequest::default(),
            rollout_strategy,
            canary: None,
        }
    }

    pub fn with_rollback(mut self, enabled: bool) -> Self {
        self.rollback_enabled = enabled;
        self
    }

    pub fn with_canary(mut self, percentage: u8, duration_secs: u64) -> Self {
        self.canary = Some(CanaryConfig {
            percentage,
            duration_secs,
        });
        self
    }
}

/// Overall job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    Building,
    Deploying,
    Testing,
    Completed,
    Failed,
    RolledBack,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::RolledBack)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Deploying => "deploying",
            Self::Testing => "testing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled-back",
        };
        f.write_str(s)
    }
}

/// Per-stage status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Fixed pipeline stage names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageName {
    Build,
    Test,
    #[serde(rename = "Security Scan")]
    SecurityScan,
    Deploy,
    #[serde(rename = "Health Check")]
    HealthCheck,
    #[serde(rename = "Canary Validation")]
    CanaryValidation,
    Finalize,
    Rollback,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "Build",
            Self::Test => "Test",
            Self::SecurityScan => "Security Scan",
            Self::Deploy => "Deploy",
            Self::HealthCheck => "Health Check",
            Self::CanaryValidation => "Canary Validation",
            Self::Finalize => "Finalize",
            Self::Rollback => "Rollback",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a job's pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: StageName,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub logs: Vec<String>,
}

impl Stage {
    pub fn new(name: StageName) -> Self {
        Self {
            name,
            status: StageStatus::Pending,
            started_at: None,
            ended_at: None,
            duration_ms: None,
            logs: Vec::new(),
        }
    }

    /// pending -> running
    pub fn begin(&mut self) -> Result<(), String> {
        if self.status != StageStatus::Pending {
            return Err(format!("{} cannot start from {}", self.name, self.status));
        }
        self.status = StageStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// running -> completed | failed
    pub fn finish(&mut self, status: StageStatus) -> Result<(), String> {
        if self.status != StageStatus::Running
            || !matches!(status, StageStatus::Completed | StageStatus::Failed)
        {
            return Err(format!(
                "{} cannot move from {} to {}",
                self.name, self.status, status
            ));
        }
        let now = Utc::now();
        self.status = status;
        self.ended_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|start| (now - start).num_milliseconds().max(0) as u64);
        Ok(())
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }
}

/// Artifacts captured while a job runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobArtifacts {
    pub build_logs: Option<String>,
    pub test_results: Option<String>,
    pub performance_metrics: Option<String>,
}

/// A single deployment request tracked through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentJob {
    pub id: String,
    pub environment_id: String,
    pub requested_by: String,
    pub config: DeploymentConfig,
    pub status: JobStatus,
    pub stages: Vec<Stage>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,

    /// Set once, when the primary run first reaches a terminal status
    pub ended_at: Option<DateTime<Utc>>,
    pub rollback_completed_at: Option<DateTime<Utc>>,

    /// Environment version observed when the Deploy stage began; rollback target
    pub previous_version: Option<String>,
    pub error: Option<String>,
    pub artifacts: JobArtifacts,
}

impl DeploymentJob {
    pub fn stage(&self, name: StageName) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stage_names(&self) -> Vec<StageName> {
        self.stages.iter().map(|s| s.name).collect()
    }

    /// Whether the Deploy stage was reached, i.e. the environment may have
    /// been touched
    pub fn deploy_started(&self) -> bool {
        self.stage(StageName::Deploy)
            .is_some_and(|s| s.status != StageStatus::Pending)
    }

    /// Terminal, and no rollback is still pending
    pub fn is_settled(&self) -> bool {
        match self.status {
            JobStatus::Completed | JobStatus::RolledBack => true,
            JobStatus::Failed => {
                !self.config.rollback_enabled || self.rollback_completed_at.is_some()
            }
            _ => false,
        }
    }
}
