//! Client workflows against a live receiver

use std::path::Path;
use std::sync::Arc;

use deploy_api::models::DeploymentType;
use deployer::app::deploy::deploy;
use deployer::app::options::{CommandOptions, DeployOptions};
use deployer::app::remote_cmd::run_commands;
use deployer::errors::DeployerError;
use deployer::receiver::pipeline::DeploymentReceiver;
use deployer::server::serve::router;
use deployer::server::state::ServerState;
use deployer::storage::layout::TargetLayout;
use deployer::storage::settings::Settings;
use deployer::sync::changeset::ChangeMethod;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::common::{sample_project, write, FakeRunner};

fn settings_json(base_url: &str, token: &str, project: &Path, target: &Path) -> Value {
    json!({
        "project": {"root": project.to_str().unwrap()},
        "environments": {
            "production": {
                "remote_base_url": base_url,
                "deploy_token": token,
                "commands": ["migrate --force", "up"],
                "transport": {"kind": "local", "path": target.to_str().unwrap()}
            }
        }
    })
}

/// Start a receiver for `target` and return the client settings pointing at it
async fn start_receiver(
    project: &Path,
    target: &Path,
    client_token: &str,
    runner: Arc<FakeRunner>,
) -> Settings {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let server_settings: Settings =
        serde_json::from_value(settings_json(&base_url, "s3cret", project, target)).unwrap();
    let receiver = DeploymentReceiver::new(TargetLayout::new(target), runner);
    let app = router(Arc::new(ServerState::new(
        Arc::new(server_settings),
        Arc::new(receiver),
    )));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    serde_json::from_value(settings_json(&base_url, client_token, project, target)).unwrap()
}

fn production() -> DeployOptions {
    DeployOptions {
        environment: "production".to_string(),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_first_then_incremental_deployment() {
    let project = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    sample_project(project.path());
    let runner = Arc::new(FakeRunner::default());
    let settings = start_receiver(project.path(), target.path(), "s3cret", runner.clone()).await;

    let first = deploy(&settings, &production()).await.unwrap();
    assert!(first.succeeded());
    assert!(first.uploaded);
    assert!(first.change_set.first_deployment);
    assert_eq!(first.apply.extraction.deployment_type, Some(DeploymentType::Full));
    assert_eq!(first.commands.len(), 2);
    assert_eq!(runner.calls(), vec!["migrate", "up"]);
    assert!(target.path().join("app/Models/User.php").is_file());
    assert!(target.path().join("vendor/autoload.php").is_file());
    assert!(target.path().join("storage/framework/sessions").is_dir());
    assert!(!target.path().join("deploy.zip").exists());

    write(project.path(), "routes/web.php", "<?php // changed");
    let second = deploy(&settings, &production()).await.unwrap();
    assert!(second.succeeded());
    assert!(!second.change_set.first_deployment);
    assert_eq!(second.change_set.method, ChangeMethod::HashDiff);
    assert!(second.change_set.added.is_empty());
    assert_eq!(
        second.change_set.modified.iter().collect::<Vec<_>>(),
        vec!["routes/web.php"]
    );
    assert!(!second.change_set.include_vendor);
    assert_eq!(
        second.apply.extraction.deployment_type,
        Some(DeploymentType::Incremental)
    );
    assert_eq!(
        std::fs::read_to_string(target.path().join("routes/web.php")).unwrap(),
        "<?php // changed"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bootstrap_deployment_skips_commands() {
    let project = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    sample_project(project.path());
    let runner = Arc::new(FakeRunner::default());
    let settings = start_receiver(project.path(), target.path(), "s3cret", runner.clone()).await;

    let options = DeployOptions {
        bootstrap: true,
        ..production()
    };
    let report = deploy(&settings, &options).await.unwrap();
    assert!(report.succeeded());
    assert!(report.commands.is_empty());
    assert!(runner.calls().is_empty());
    assert!(target.path().join("bootstrap/cache").is_dir());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_extraction_skips_commands() {
    let project = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    sample_project(project.path());
    let runner = Arc::new(FakeRunner::default());
    let settings = start_receiver(project.path(), target.path(), "s3cret", runner.clone()).await;

    let options = DeployOptions {
        skip_upload: true,
        ..production()
    };
    let report = deploy(&settings, &options).await.unwrap();
    assert!(!report.uploaded);
    assert!(!report.apply.extraction.success);
    assert!(report.commands.is_empty());
    assert!(!report.succeeded());
    assert!(runner.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_token_aborts_before_packaging() {
    let project = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    sample_project(project.path());
    let runner = Arc::new(FakeRunner::default());
    let settings = start_receiver(project.path(), target.path(), "wrong", runner.clone()).await;

    let result = deploy(&settings, &production()).await;
    assert!(matches!(result, Err(DeployerError::AuthError(_))));
    assert!(!target.path().join("deploy.zip").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_commands_carry_on_past_failures() {
    let project = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::failing(&["queue:restart"]));
    let settings = start_receiver(project.path(), target.path(), "s3cret", runner.clone()).await;

    let options = CommandOptions {
        environment: "production".to_string(),
        commands: vec!["queue:restart".to_string(), "optimize".to_string()],
    };
    let report = run_commands(&settings, &options).await.unwrap();
    assert!(!report.succeeded());
    assert!(!report.commands[0].success);
    assert!(report.commands[1].success);
    assert_eq!(runner.calls(), vec!["queue:restart", "optimize"]);
    assert!(report.endpoint.ends_with("/deployer/run"));
}

#[tokio::test]
async fn test_incomplete_environment_fails_before_any_request() {
    let settings: Settings = serde_json::from_value(json!({
        "environments": {"production": {"deploy_token": "s3cret"}}
    }))
    .unwrap();

    let result = deploy(&settings, &production()).await;
    assert!(matches!(result, Err(DeployerError::ConfigError(_))));

    let options = CommandOptions {
        environment: "production".to_string(),
        commands: vec![],
    };
    let result = run_commands(&settings, &options).await;
    assert!(matches!(result, Err(DeployerError::ValidationError(_))));
}
