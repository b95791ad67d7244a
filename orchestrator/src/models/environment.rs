//! Environment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of deployment target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentType {
    Development,
    Staging,
    Production,
    Testing,
}

/// Lifecycle status of an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    Active,
    Inactive,
    Deploying,
    Error,
}

/// Health classification from the last probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
}

/// Latest health observation for an environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,

    /// Probe latency in milliseconds
    pub response_time_ms: u64,
}

impl HealthSnapshot {
    pub fn healthy_now() -> Self {
        Self {
            status: HealthStatus::Healthy,
            last_check: Utc::now(),
            response_time_ms: 0,
        }
    }
}

/// Resource allocation. Opaque to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceProfile {
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: f64,
    #[serde(default)]
    pub storage: f64,
}

/// Scaling profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingProfile {
    pub min_instances: u32,
    pub max_instances: u32,
    pub current_instances: u32,
    #[serde(default)]
    pub auto_scaling: bool,
}

impl Default for ScalingProfile {
    fn default() -> Self {
        Self {
            min_instances: 1,
            max_instances: 1,
            current_instances: 1,
            auto_scaling: false,
        }
    }
}

/// A registered deployment target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub env_type: EnvironmentType,
    pub status: EnvironmentStatus,

    /// Base URL used by the health monitor
    pub url: Option<String>,

    /// Currently deployed version, if anything was ever deployed
    pub version: Option<String>,
    pub last_deployment: Option<DateTime<Utc>>,
    pub health: HealthSnapshot,
    pub resources: ResourceProfile,
    pub scaling: ScalingProfile,
}

/// Caller-supplied fields for registering an environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub env_type: EnvironmentType,
    pub status: EnvironmentStatus,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub resources: ResourceProfile,
    #[serde(default)]
    pub scaling: ScalingProfile,
}

impl EnvironmentSpec {
    pub fn new(name: impl Into<String>, env_type: EnvironmentType) -> Self {
        Self {
            name: name.into(),
            env_type,
            status: EnvironmentStatus::Active,
            url: None,
            version: None,
            resources: ResourceProfile::default(),
            scaling: ScalingProfile::default(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}
