//! HTTP API tests

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use deploy_orchestrator::server::serve::router;
use deploy_orchestrator::server::state::ServerState;

use crate::common::{harness, wait_idle, wait_settled, Harness, ScriptedWork};

fn app(h: &Harness) -> Router {
    router(Arc::new(ServerState::new(h.orchestrator.clone())))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value, requestor: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(requestor) = requestor {
        builder = builder.header("x-requestor-id", requestor);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn register(app: &Router) -> String {
    let (status, body) = send(
        app,
        post(
            "/environments",
            json!({"name": "staging-1", "type": "staging", "status": "active", "version": "v1.0.0"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_and_version() {
    let h = harness(ScriptedWork::succeeding(), 3);
    let app = app(&h);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, get("/version")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_register_and_list_environments() {
    let h = harness(ScriptedWork::succeeding(), 3);
    let app = app(&h);
    let id = register(&app).await;

    let (status, body) = send(&app, get("/environments")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["id"], id.as_str());
    assert_eq!(body["items"][0]["type"], "staging");

    let (status, body) = send(&app, get(&format!("/environments/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], "v1.0.0");
    assert_eq!(body["health"]["status"], "healthy");

    let (status, body) = send(&app, get("/environments/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "environment_not_found");
}

#[tokio::test]
async fn test_deployment_round_trip() {
    let h = harness(ScriptedWork::succeeding(), 3);
    let app = app(&h);
    let env_id = register(&app).await;

    let (status, body) = send(
        &app,
        post(
            &format!("/environments/{}/deployments", env_id),
            json!({"version": "v2.0.0", "build_id": "b-42", "rollout_strategy": "blue-green"}),
            Some("alice"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["environment_id"], env_id.as_str());
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, get("/deployments/queued")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    wait_settled(&h.orchestrator, &job_id).await;
    wait_idle(&h.orchestrator).await;

    let (status, body) = send(&app, get(&format!("/jobs/{}", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["requested_by"], "alice");
    assert_eq!(body["stages"].as_array().unwrap().len(), 6);
    assert_eq!(body["stages"][2]["name"], "Security Scan");

    let (_, body) = send(&app, get("/deployments/active")).await;
    assert_eq!(body["total"], 0);

    let (status, body) = send(
        &app,
        get(&format!("/deployments/history?environment_id={}&limit=5", env_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["id"], job_id.as_str());
    assert_eq!(body["items"][0]["status"], "completed");
}

#[tokio::test]
async fn test_deployment_errors() {
    let h = harness(ScriptedWork::succeeding(), 3);
    let app = app(&h);
    let env_id = register(&app).await;
    let config = json!({"version": "v2.0.0", "build_id": "b-42", "rollout_strategy": "rolling"});

    // Missing requestor
    let (status, body) = send(
        &app,
        post(&format!("/environments/{}/deployments", env_id), config.clone(), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "permission_denied");

    // Unknown environment
    let (status, _) = send(
        &app,
        post("/environments/nope/deployments", config, Some("alice")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Canary without canary settings
    let (status, body) = send(
        &app,
        post(
            &format!("/environments/{}/deployments", env_id),
            json!({"version": "v2.0.0", "build_id": "b-42", "rollout_strategy": "canary"}),
            Some("alice"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = send(&app, get("/jobs/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
