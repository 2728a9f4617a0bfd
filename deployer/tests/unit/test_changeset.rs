//! Change detection against real trees

use std::collections::BTreeSet;
use std::fs;

use deploy_api::models::DeploymentType;
use deployer::package::builder::PackageBuilder;
use deployer::storage::layout::ProjectLayout;
use deployer::sync::changeset::{ChangeMethod, PreviousDeployment};
use deployer::sync::vcs::{GitRepository, VersionControl};

use crate::common::{git, git_available, resolver, sample_project, write};

fn set(paths: &[&str]) -> BTreeSet<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

#[tokio::test]
async fn test_first_deployment_ships_everything() {
    let root = tempfile::tempdir().unwrap();
    sample_project(root.path());

    let change_set = resolver(root.path(), false).resolve(None, false).await.unwrap();

    assert_eq!(change_set.method, ChangeMethod::Full);
    assert!(change_set.first_deployment);
    assert!(change_set.include_vendor);
    assert!(change_set.include_bootstrap_dirs);
    assert_eq!(change_set.deployment_type(), DeploymentType::Full);
    assert_eq!(
        change_set.added,
        set(&[
            "app/Models/User.php",
            "composer.json",
            "composer.lock",
            "public/index.php",
            "routes/web.php",
        ])
    );
    assert!(change_set.modified.is_empty());
    assert!(change_set.deleted.is_empty());
}

#[tokio::test]
async fn test_hash_diff_after_deploying_is_empty() {
    let root = tempfile::tempdir().unwrap();
    sample_project(root.path());
    let resolver = resolver(root.path(), false);

    let first = resolver.resolve(None, false).await.unwrap();
    let builder = PackageBuilder::new(ProjectLayout::new(root.path()), "production");
    let metadata = builder.metadata(&first, first.added.len());
    let previous = PreviousDeployment::from(&metadata);

    let second = resolver.resolve(Some(&previous), false).await.unwrap();
    assert_eq!(second.method, ChangeMethod::HashDiff);
    assert!(second.added.is_empty());
    assert!(second.modified.is_empty());
    assert!(second.deleted.is_empty());
    assert!(!second.include_vendor);
    assert!(!second.include_bootstrap_dirs);
    assert!(!second.first_deployment);
    assert_eq!(second.deployment_type(), DeploymentType::Incremental);
    assert!(second.is_empty());
}

#[tokio::test]
async fn test_hash_diff_classifies_edits() {
    let root = tempfile::tempdir().unwrap();
    sample_project(root.path());
    let resolver = resolver(root.path(), false);

    let first = resolver.resolve(None, false).await.unwrap();
    let builder = PackageBuilder::new(ProjectLayout::new(root.path()), "production");
    let previous = PreviousDeployment::from(&builder.metadata(&first, 0));

    write(root.path(), "routes/web.php", "<?php // new routes");
    write(root.path(), "app/Http/Kernel.php", "<?php class Kernel {}");
    write(root.path(), "composer.lock", r#"{"packages": [{"name": "acme/lib"}]}"#);
    write(root.path(), "storage/logs/today.log", "ignored");
    write(root.path(), "node_modules/left-pad/index.js", "ignored");
    fs::remove_file(root.path().join("public/index.php")).unwrap();

    let change_set = resolver.resolve(Some(&previous), false).await.unwrap();
    assert_eq!(change_set.added, set(&["app/Http/Kernel.php"]));
    assert_eq!(change_set.modified, set(&["composer.lock", "routes/web.php"]));
    assert_eq!(change_set.deleted, set(&["public/index.php"]));
    assert!(change_set.include_vendor);
}

#[tokio::test]
async fn test_bootstrap_flag_adds_directories_to_incremental_deployments() {
    let root = tempfile::tempdir().unwrap();
    sample_project(root.path());
    let resolver = resolver(root.path(), false);

    let first = resolver.resolve(None, false).await.unwrap();
    let builder = PackageBuilder::new(ProjectLayout::new(root.path()), "production");
    let previous = PreviousDeployment::from(&builder.metadata(&first, 0));

    let change_set = resolver.resolve(Some(&previous), true).await.unwrap();
    assert!(change_set.include_bootstrap_dirs);
    assert!(!change_set.first_deployment);
}

#[tokio::test]
async fn test_vcs_diff_classifies_commits() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let dir = root.path();
    write(dir, "app/A.php", "<?php // a");
    write(dir, "app/B.php", "<?php // b");
    write(dir, "app/C.php", "<?php // c, long enough to be recognised as a rename");
    git(dir, &["init", "-q"]);
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", "initial"]);
    let first = git(dir, &["rev-parse", "HEAD"]);

    write(dir, "app/A.php", "<?php // a, edited");
    git(dir, &["rm", "-q", "app/B.php"]);
    git(dir, &["mv", "app/C.php", "app/D.php"]);
    write(dir, "app/E.php", "<?php // e");
    write(dir, "storage/logs/today.log", "excluded");
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", "second"]);
    let head = git(dir, &["rev-parse", "HEAD"]);

    let previous = PreviousDeployment {
        commit_hash: Some(first.clone()),
        ..Default::default()
    };
    let change_set = resolver(dir, true)
        .resolve(Some(&previous), false)
        .await
        .unwrap();

    assert_eq!(change_set.method, ChangeMethod::VcsDiff);
    assert_eq!(change_set.added, set(&["app/D.php", "app/E.php"]));
    assert_eq!(change_set.modified, set(&["app/A.php"]));
    assert_eq!(change_set.deleted, set(&["app/B.php", "app/C.php"]));
    assert_eq!(change_set.vcs_previous_commit.as_deref(), Some(first.as_str()));
    assert_eq!(change_set.vcs_commit.as_deref(), Some(head.as_str()));

    let record = change_set.vcs_record();
    assert!(record.available);
    assert!(record.branch.is_some());
    assert_eq!(record.commit_hash.as_deref(), Some(head.as_str()));
}

#[tokio::test]
async fn test_vcs_diff_reports_copies_as_additions() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let dir = root.path();
    let original: String = (1..=12)
        .map(|n| format!("<?php // settings line {n}\n"))
        .collect();
    write(dir, "config/app.php", &original);
    git(dir, &["init", "-q"]);
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", "initial"]);
    let first = git(dir, &["rev-parse", "HEAD"]);

    write(dir, "config/app.php", &format!("{original}<?php // extra\n"));
    write(dir, "config/copy.php", &original);
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", "copy"]);
    let head = git(dir, &["rev-parse", "HEAD"]);

    let diff = GitRepository::new(dir, true)
        .diff_name_status(&first, &head)
        .await
        .unwrap();
    assert!(
        diff.lines()
            .any(|l| l.starts_with('C') && l.ends_with("config/app.php\tconfig/copy.php")),
        "no copy in {diff:?}"
    );

    let previous = PreviousDeployment {
        commit_hash: Some(first),
        ..Default::default()
    };
    let change_set = resolver(dir, true)
        .resolve(Some(&previous), false)
        .await
        .unwrap();
    assert_eq!(change_set.method, ChangeMethod::VcsDiff);
    assert_eq!(change_set.added, set(&["config/copy.php"]));
    assert_eq!(change_set.modified, set(&["config/app.php"]));
    assert!(change_set.deleted.is_empty());
}

#[tokio::test]
async fn test_unknown_recorded_commit_falls_back_to_hashes() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let dir = root.path();
    write(dir, "app/A.php", "<?php // a");
    git(dir, &["init", "-q"]);
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", "initial"]);

    let previous = PreviousDeployment {
        commit_hash: Some("0123456789abcdef0123456789abcdef01234567".to_string()),
        ..Default::default()
    };
    let change_set = resolver(dir, true)
        .resolve(Some(&previous), false)
        .await
        .unwrap();

    assert_eq!(change_set.method, ChangeMethod::HashDiff);
    assert_eq!(change_set.added, set(&["app/A.php"]));
    assert!(change_set.current_hashes.is_some());
}

#[tokio::test]
async fn test_disabled_vcs_is_reported_unavailable() {
    let root = tempfile::tempdir().unwrap();
    sample_project(root.path());

    let previous = PreviousDeployment {
        commit_hash: Some("abc123".to_string()),
        ..Default::default()
    };
    let change_set = resolver(root.path(), false)
        .resolve(Some(&previous), false)
        .await
        .unwrap();

    assert_eq!(change_set.method, ChangeMethod::HashDiff);
    assert!(change_set.vcs.is_none());
    assert!(!change_set.vcs_record().available);
}
