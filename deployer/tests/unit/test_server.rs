//! Receiver endpoints driven through the router

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::Router;
use deploy_api::models::{DeploymentResult, MetadataResponse, METADATA_FILE, TOKEN_HEADER};
use deployer::receiver::auth::UNAUTHORIZED;
use deployer::receiver::pipeline::DeploymentReceiver;
use deployer::server::serve::router;
use deployer::server::state::ServerState;
use deployer::storage::layout::TargetLayout;
use deployer::storage::settings::Settings;
use http::{Request, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::common::{write, FakeRunner};

struct Fixture {
    target: TempDir,
    runner: Arc<FakeRunner>,
    app: Router,
}

fn fixture() -> Fixture {
    let target = tempfile::tempdir().unwrap();
    let settings: Settings = serde_json::from_value(json!({
        "environments": {
            "production": {
                "deploy_token": "s3cret",
                "commands": ["down", "up"]
            },
            "staging": {}
        }
    }))
    .unwrap();

    let runner = Arc::new(FakeRunner::default());
    let receiver = DeploymentReceiver::new(TargetLayout::new(target.path()), runner.clone());
    let state = ServerState::new(Arc::new(settings), Arc::new(receiver));
    Fixture {
        target,
        runner,
        app: router(Arc::new(state)),
    }
}

fn run_request(token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post("/deployer/run").header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header(TOKEN_HEADER, token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn metadata_request(token: &str, env: &str) -> Request<Body> {
    Request::get(format!("/deployer/metadata?env={env}"))
        .header(TOKEN_HEADER, token)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_wrong_token_changes_nothing() {
    let fx = fixture();
    write(fx.target.path(), "deploy.zip", "pending package");
    write(fx.target.path(), "old.php", "<?php");

    let (status, body) = send(
        &fx.app,
        run_request(
            Some("guess"),
            json!({"env": "production", "delete": ["old.php"], "commands": ["down"]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], UNAUTHORIZED);
    assert!(fx.target.path().join("deploy.zip").is_file());
    assert!(fx.target.path().join("old.php").is_file());
    assert!(!fx.target.path().join(METADATA_FILE).exists());
    assert!(fx.runner.calls().is_empty());
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let fx = fixture();
    let (status, _) = send(&fx.app, run_request(None, json!({"env": "production"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_environment_without_token_rejects_everyone() {
    let fx = fixture();
    let (status, _) = send(&fx.app, run_request(Some(""), json!({"env": "staging"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_environment_is_a_bad_request() {
    let fx = fixture();
    let (status, body) = send(
        &fx.app,
        run_request(Some("s3cret"), json!({"env": "nowhere"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid environment: nowhere");
}

#[tokio::test]
async fn test_malformed_body_is_a_bad_request() {
    let fx = fixture();
    let request = Request::post("/deployer/run")
        .header("content-type", "application/json")
        .header(TOKEN_HEADER, "s3cret")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&fx.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_malformed_body_with_wrong_token_is_unauthorized() {
    let fx = fixture();
    write(fx.target.path(), "deploy.zip", "pending package");
    let request = Request::post("/deployer/run")
        .header("content-type", "application/json")
        .header(TOKEN_HEADER, "guess")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&fx.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], UNAUTHORIZED);
    assert!(fx.target.path().join("deploy.zip").is_file());
}

#[tokio::test]
async fn test_unexpected_fault_is_a_located_server_error() {
    let fx = fixture();
    std::fs::write(fx.target.path().join(METADATA_FILE), [0xff, 0xfe, 0x00]).unwrap();

    let (status, body) = send(&fx.app, metadata_request("s3cret", "production")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("IO error"));
    assert!(body["file"].as_str().unwrap().ends_with("handlers.rs"));
    assert!(body["line"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_run_falls_back_to_environment_commands() {
    let fx = fixture();
    let (status, body) = send(
        &fx.app,
        run_request(Some("s3cret"), json!({"env": "production", "extract": false})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let result: DeploymentResult = serde_json::from_value(body).unwrap();
    assert!(result.success);
    assert_eq!(result.environment, "production");
    assert_eq!(result.extraction.message, "Extraction skipped");
    assert_eq!(result.commands.len(), 2);
    assert_eq!(fx.runner.calls(), vec!["down", "up"]);
}

#[tokio::test]
async fn test_explicit_empty_command_list_runs_nothing() {
    let fx = fixture();
    let (status, body) = send(
        &fx.app,
        run_request(Some("s3cret"), json!({"env": "production", "commands": []})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["extraction"]["success"], false);
    assert_eq!(body["commands"], json!([]));
    assert!(fx.runner.calls().is_empty());
}

#[tokio::test]
async fn test_metadata_endpoint() {
    let fx = fixture();

    let (status, body) = send(&fx.app, metadata_request("s3cret", "production")).await;
    assert_eq!(status, StatusCode::OK);
    let response: MetadataResponse = serde_json::from_value(body).unwrap();
    assert!(!response.exists);
    assert_eq!(response.environment.as_deref(), Some("production"));

    write(
        fx.target.path(),
        METADATA_FILE,
        &json!({
            "environment": "production",
            "deployed_at": "2024-05-01T10:00:00Z",
            "deployment_type": "incremental",
            "git": {"available": true, "branch": "main", "commit_hash": "abc123"}
        })
        .to_string(),
    );
    let (status, body) = send(&fx.app, metadata_request("s3cret", "production")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exists"], true);
    assert_eq!(body["commit_hash"], "abc123");
    assert_eq!(body["deployment_type"], "incremental");

    let (status, _) = send(&fx.app, metadata_request("wrong", "production")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_version_endpoint() {
    let fx = fixture();
    let request = Request::get("/deployer/version").body(Body::empty()).unwrap();
    let (status, body) = send(&fx.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("version").is_some());
}
