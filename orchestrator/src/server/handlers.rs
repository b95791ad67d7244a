//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use http::{HeaderMap, StatusCode};
use orchestrator_api::models::{
    DeploymentAcceptedResponse, EnvironmentCreatedResponse, ErrorResponse, HealthResponse,
    HistoryQuery, ListResponse, VersionResponse,
};

use crate::errors::OrchestratorError;
use crate::models::deployment::DeploymentConfig;
use crate::models::environment::EnvironmentSpec;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Header carrying the id of the caller requesting a deployment
pub const REQUESTOR_HEADER: &str = "x-requestor-id";

/// Default page size for history queries
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = match &self {
            OrchestratorError::EnvironmentNotFound(_) | OrchestratorError::JobNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            OrchestratorError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            OrchestratorError::ValidationError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "deployd".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

pub async fn list_environments_handler(
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    Json(ListResponse::new(state.orchestrator.list_environments()))
}

pub async fn register_environment_handler(
    State(state): State<Arc<ServerState>>,
    Json(spec): Json<EnvironmentSpec>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let id = state.orchestrator.register_environment(spec).await?;
    Ok((StatusCode::CREATED, Json(EnvironmentCreatedResponse { id })))
}

pub async fn get_environment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, OrchestratorError> {
    Ok(Json(state.orchestrator.get_environment(&id)?))
}

pub async fn request_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(environment_id): Path<String>,
    headers: HeaderMap,
    Json(config): Json<DeploymentConfig>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let requestor = headers
        .get(REQUESTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            OrchestratorError::PermissionDenied(format!("missing {} header", REQUESTOR_HEADER))
        })?;

    let job_id = state
        .orchestrator
        .request_deployment(&environment_id, config, requestor)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DeploymentAcceptedResponse {
            job_id,
            environment_id,
            queued_at: Utc::now(),
        }),
    ))
}

pub async fn get_job_handler(
    State(state): State<Arc<ServerState>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, OrchestratorError> {
    Ok(Json(state.orchestrator.get_job(&job_id).await?))
}

pub async fn active_deployments_handler(
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    Json(ListResponse::new(state.orchestrator.list_active_deployments().await))
}

pub async fn queued_deployments_handler(
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    Json(ListResponse::new(state.orchestrator.queued_jobs().await))
}

pub async fn deployment_history_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, OrchestratorError> {
    let history = state
        .orchestrator
        .list_deployment_history(
            query.environment_id.as_deref(),
            query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        )
        .await?;
    Ok(Json(ListResponse::new(history)))
}
