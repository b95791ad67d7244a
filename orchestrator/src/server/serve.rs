//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::OrchestratorError;
use crate::server::handlers::{
    active_deployments_handler, deployment_history_handler, get_environment_handler,
    get_job_handler, health_handler, list_environments_handler, queued_deployments_handler,
    register_environment_handler, request_deployment_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the API router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Environments
        .route(
            "/environments",
            get(list_environments_handler).post(register_environment_handler),
        )
        .route("/environments/{id}", get(get_environment_handler))
        .route(
            "/environments/{id}/deployments",
            post(request_deployment_handler),
        )
        // Jobs
        .route("/jobs/{id}", get(get_job_handler))
        .route("/deployments/active", get(active_deployments_handler))
        .route("/deployments/queued", get(queued_deployments_handler))
        .route("/deployments/history", get(deployment_history_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), OrchestratorError>>, OrchestratorError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| OrchestratorError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| OrchestratorError::ServerError(e.to_string()))
    });

    Ok(handle)
}
