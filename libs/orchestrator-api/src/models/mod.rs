//! Orchestrator API models

use serde::{Deserialize, Serialize};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Response to a successful environment registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentCreatedResponse {
    pub id: String,
}

/// Response to an admitted deployment request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentAcceptedResponse {
    pub job_id: String,
    pub environment_id: String,
    pub queued_at: chrono::DateTime<chrono::Utc>,
}

/// Generic list envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> ListResponse<T> {
    pub fn new(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

/// Query parameters for deployment history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub environment_id: Option<String>,
    pub limit: Option<usize>,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error kind, e.g. `environment_not_found`
    pub error: String,
    pub message: String,
}
