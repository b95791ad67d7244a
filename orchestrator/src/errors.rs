//! Error types for the deployment orchestrator

use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Environment not found: {0}")]
    EnvironmentNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Carries the bare reason; it is logged under the stage that failed
    #[error("{0}")]
    StageFailure(String),

    #[error("{0}")]
    RollbackFailure(String),

    #[error("Probe failure: {0}")]
    ProbeFailure(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Stable snake_case identifier used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::IoError(_) => "io_error",
            OrchestratorError::JsonError(_) => "json_error",
            OrchestratorError::HttpError(_) => "http_error",
            OrchestratorError::EnvironmentNotFound(_) => "environment_not_found",
            OrchestratorError::PermissionDenied(_) => "permission_denied",
            OrchestratorError::JobNotFound(_) => "job_not_found",
            OrchestratorError::StageFailure(_) => "stage_failure",
            OrchestratorError::RollbackFailure(_) => "rollback_failure",
            OrchestratorError::ProbeFailure(_) => "probe_failure",
            OrchestratorError::InvalidTransition(_) => "invalid_transition",
            OrchestratorError::ValidationError(_) => "validation_error",
            OrchestratorError::StorageError(_) => "storage_error",
            OrchestratorError::ConfigError(_) => "config_error",
            OrchestratorError::ServerError(_) => "server_error",
            OrchestratorError::ShutdownError(_) => "shutdown_error",
            OrchestratorError::Internal(_) => "internal_error",
        }
    }
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}
