//! Receiver pipeline behaviour

use std::sync::Arc;

use deploy_api::models::RunRequest;
use deployer::receiver::pipeline::DeploymentReceiver;
use deployer::storage::layout::TargetLayout;

use crate::common::{write, FakeRunner};

fn request(delete: &[&str], extract: bool) -> RunRequest {
    RunRequest {
        env: "production".to_string(),
        commands: None,
        zipname: None,
        delete: delete.iter().map(|p| p.to_string()).collect(),
        extract,
    }
}

#[tokio::test]
async fn test_deletions_are_confined_to_the_target() {
    let root = tempfile::tempdir().unwrap();
    let target = root.path().join("app");
    write(&target, ".env", "APP_KEY=secret");
    write(&target, "cache/tmp.txt", "stale");
    write(root.path(), "etc/passwd", "root:x:0:0");

    let receiver = DeploymentReceiver::new(
        TargetLayout::new(&target),
        Arc::new(FakeRunner::default()),
    );
    let paths: Vec<String> = [".env", "../etc/passwd", "cache/tmp.txt"]
        .iter()
        .map(|p| p.to_string())
        .collect();
    let report = receiver.delete_many(&paths).await;

    assert!(report.success);
    assert_eq!(report.deleted, vec!["cache/tmp.txt"]);
    assert_eq!(
        report.skipped,
        vec![".env (protected)", "../etc/passwd (invalid path)"]
    );
    assert!(report.failed.is_empty());
    assert_eq!(report.message, "Deleted 1 item(s)");

    assert!(target.join(".env").is_file());
    assert!(!target.join("cache/tmp.txt").exists());
    assert!(root.path().join("etc/passwd").is_file());
}

#[tokio::test]
async fn test_failing_command_does_not_stop_the_next() {
    let root = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::failing(&["migrate"]));
    let receiver = DeploymentReceiver::new(TargetLayout::new(root.path()), runner.clone());

    let commands = vec!["migrate --force".to_string(), "cache:clear".to_string()];
    let result = receiver.apply(&request(&[], false), &commands).await;

    assert!(result.success);
    assert!(result.extraction.success);
    assert_eq!(result.commands.len(), 2);

    let first = &result.commands[0];
    assert_eq!(first.command, "migrate --force");
    assert!(!first.success);
    assert!(first.error.as_deref().unwrap().contains("migrate exploded"));
    assert!(first.output.is_empty());

    let second = &result.commands[1];
    assert_eq!(second.command, "cache:clear");
    assert!(second.success);
    assert_eq!(second.output, "cache:clear done");
    assert!(second.error.is_none());

    assert_eq!(runner.calls(), vec!["migrate", "cache:clear"]);
}

#[tokio::test]
async fn test_missing_package_still_runs_deletions_and_commands() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "public/hot", "http://localhost:5173");
    let runner = Arc::new(FakeRunner::default());
    let receiver = DeploymentReceiver::new(TargetLayout::new(root.path()), runner.clone());

    let commands = vec!["up".to_string()];
    let result = receiver.apply(&request(&["public/hot"], true), &commands).await;

    assert!(result.success);
    assert!(!result.extraction.success);
    assert_eq!(result.extraction.message, "Zip file deploy.zip not found");
    assert_eq!(result.deletions.unwrap().deleted, vec!["public/hot"]);
    assert!(result.auto_deletions.is_none());
    assert_eq!(result.commands.len(), 1);
    assert!(result.commands[0].success);
    assert!(receiver.store().read().await.unwrap().is_none());
}

#[tokio::test]
async fn test_package_name_cannot_escape_the_target() {
    let root = tempfile::tempdir().unwrap();
    let receiver = DeploymentReceiver::new(
        TargetLayout::new(root.path()),
        Arc::new(FakeRunner::default()),
    );

    let (report, metadata) = receiver.extract("../deploy.zip").await;
    assert!(!report.success);
    assert_eq!(report.message, "Invalid package name ../deploy.zip");
    assert!(metadata.is_none());
}

#[tokio::test]
async fn test_corrupt_package_is_reported_and_removed() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "deploy.zip", "this is not an archive");
    let receiver = DeploymentReceiver::new(
        TargetLayout::new(root.path()),
        Arc::new(FakeRunner::default()),
    );

    let (report, _) = receiver.extract("deploy.zip").await;
    assert!(!report.success);
    assert_eq!(report.message, "Could not open deploy.zip");
    assert!(!root.path().join("deploy.zip").exists());
}

#[tokio::test]
async fn test_empty_command_is_a_failed_result() {
    let root = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::default());
    let receiver = DeploymentReceiver::new(TargetLayout::new(root.path()), runner.clone());

    let results = receiver
        .run_commands(&["   ".to_string(), "config:cache".to_string()])
        .await;
    assert!(!results[0].success);
    assert_eq!(results[0].error.as_deref(), Some("Empty command"));
    assert!(results[1].success);
    assert_eq!(runner.calls(), vec!["config:cache"]);
}
