//! Packages built from a project and applied to a target

use std::fs;
use std::path::Path;
use std::sync::Arc;

use deploy_api::models::{DeploymentMetadata, DeploymentType, METADATA_FILE};
use deployer::package::builder::PackageBuilder;
use deployer::receiver::pipeline::DeploymentReceiver;
use deployer::storage::layout::{ProjectLayout, TargetLayout};
use deployer::sync::changeset::PreviousDeployment;
use zip::ZipArchive;

use crate::common::{resolver, sample_project, FakeRunner};

fn entry_names(archive: &Path) -> Vec<String> {
    let archive = ZipArchive::new(fs::File::open(archive).unwrap()).unwrap();
    archive.file_names().map(String::from).collect()
}

#[tokio::test]
async fn test_first_deployment_package_contents() {
    let project = tempfile::tempdir().unwrap();
    sample_project(project.path());
    let out = tempfile::tempdir().unwrap();

    let change_set = resolver(project.path(), false).resolve(None, false).await.unwrap();
    let builder = PackageBuilder::new(ProjectLayout::new(project.path()), "production");
    let package = builder
        .build(&change_set, &out.path().join("deploy.zip"))
        .await
        .unwrap();

    let names = entry_names(&package.path);
    for expected in [
        "app/Models/User.php",
        "composer.json",
        "vendor/autoload.php",
        "vendor/acme/lib/src/Lib.php",
        "storage/",
        "storage/framework/sessions/",
        "storage/logs/laravel.log",
        "bootstrap/cache/",
        METADATA_FILE,
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {expected} in {names:?}");
    }
    assert!(!names.iter().any(|n| n == ".env"));
    assert_eq!(names.iter().filter(|n| *n == METADATA_FILE).count(), 1);
    assert_eq!(names.last().map(String::as_str), Some(METADATA_FILE));

    assert_eq!(package.metadata.deployment_type, DeploymentType::Full);
    assert_eq!(package.metadata.environment, "production");
    assert_eq!(package.metadata.deployed_files_count, package.files);
    assert!(package.metadata.dependencies.as_ref().unwrap().vendor_included);
    assert!(package.skipped.is_empty());
}

#[tokio::test]
async fn test_metadata_survives_build_and_extraction() {
    let project = tempfile::tempdir().unwrap();
    sample_project(project.path());
    let target = tempfile::tempdir().unwrap();

    let change_set = resolver(project.path(), false).resolve(None, false).await.unwrap();
    let builder = PackageBuilder::new(ProjectLayout::new(project.path()), "production");
    let package = builder
        .build(&change_set, &target.path().join("deploy.zip"))
        .await
        .unwrap();

    let receiver = DeploymentReceiver::new(
        TargetLayout::new(target.path()),
        Arc::new(FakeRunner::default()),
    );
    let (report, metadata) = receiver.extract("deploy.zip").await;

    assert!(report.success, "{}", report.message);
    assert_eq!(report.deployment_type, Some(DeploymentType::Full));
    assert_eq!(report.message, format!("Full deployment: {} files", report.files_total));
    assert_eq!(metadata.as_ref(), Some(&package.metadata));

    let stored = receiver.store().read().await.unwrap();
    assert_eq!(stored, Some(package.metadata.clone()));

    assert!(!target.path().join("deploy.zip").exists());
    assert!(target.path().join("app/Models/User.php").is_file());
    assert!(target.path().join("vendor/acme/lib/src/Lib.php").is_file());
    assert!(target.path().join("storage/framework/sessions").is_dir());
    assert!(target.path().join("bootstrap/cache").is_dir());
    assert!(!target.path().join(".env").exists());
}

#[tokio::test]
async fn test_removed_sources_are_deleted_on_the_target() {
    let project = tempfile::tempdir().unwrap();
    sample_project(project.path());
    let target = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(project.path());
    let resolver = resolver(project.path(), false);
    let receiver = DeploymentReceiver::new(
        TargetLayout::new(target.path()),
        Arc::new(FakeRunner::default()),
    );

    let first = resolver.resolve(None, false).await.unwrap();
    PackageBuilder::new(layout.clone(), "production")
        .build(&first, &target.path().join("deploy.zip"))
        .await
        .unwrap();
    let (report, metadata) = receiver.extract("deploy.zip").await;
    assert!(report.success);
    assert!(target.path().join("public/index.php").is_file());

    fs::remove_file(project.path().join("public/index.php")).unwrap();
    let previous = PreviousDeployment::from(&metadata.unwrap());
    let second = resolver.resolve(Some(&previous), false).await.unwrap();
    PackageBuilder::new(layout, "production")
        .build(&second, &target.path().join("deploy.zip"))
        .await
        .unwrap();

    let request = serde_json::from_value(serde_json::json!({
        "env": "production",
        "commands": [],
    }))
    .unwrap();
    let result = receiver.apply(&request, &[]).await;

    assert!(result.extraction.success);
    assert_eq!(result.extraction.deployment_type, Some(DeploymentType::Incremental));
    let auto = result.auto_deletions.unwrap();
    assert_eq!(auto.deleted, vec!["public/index.php".to_string()]);
    assert!(!target.path().join("public/index.php").exists());
    assert!(target.path().join("routes/web.php").is_file());
}

#[tokio::test]
async fn test_partial_extraction_keeps_the_previous_record() {
    let project = tempfile::tempdir().unwrap();
    sample_project(project.path());
    let target = tempfile::tempdir().unwrap();
    let receiver = DeploymentReceiver::new(
        TargetLayout::new(target.path()),
        Arc::new(FakeRunner::default()),
    );

    let change_set = resolver(project.path(), false).resolve(None, false).await.unwrap();
    let builder = PackageBuilder::new(ProjectLayout::new(project.path()), "production");
    let previous = DeploymentMetadata {
        deployed_files_count: 7,
        files: None,
        ..builder.metadata(&change_set, 0)
    };
    receiver.store().write(&previous).await.unwrap();

    builder
        .build(&change_set, &target.path().join("deploy.zip"))
        .await
        .unwrap();
    // a directory where the package wants a file
    fs::create_dir_all(target.path().join("routes/web.php")).unwrap();

    let (report, metadata) = receiver.extract("deploy.zip").await;
    assert!(!report.success);
    assert_eq!(report.message, "Extraction failed");
    assert_eq!(report.deployment_type, Some(DeploymentType::Full));
    assert!(report.files_extracted < report.files_total);
    assert!(metadata.is_none());

    let stored = receiver.store().read().await.unwrap();
    assert_eq!(stored, Some(previous));
    assert!(!target.path().join("deploy.zip").exists());
}
