//! Git history as a change source

use std::collections::BTreeSet;
use std::path::PathBuf;

use async_trait::async_trait;
use deploy_api::models::METADATA_FILE;
use tokio::process::Command;
use tracing::debug;

use crate::errors::DeployerError;
use crate::storage::layout::DEPENDENCY_DIR;
use crate::sync::filter::PathFilter;

/// Access to the version-control state of the local project
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Whether the project is a work tree this tool may diff
    async fn is_available(&self) -> bool;

    /// Current commit hash
    async fn head(&self) -> Result<String, DeployerError>;

    /// Current branch name
    async fn branch(&self) -> Result<String, DeployerError>;

    /// Raw `--name-status` diff between two commits, with the metadata file
    /// and the dependency directory left out
    async fn diff_name_status(&self, from: &str, to: &str) -> Result<String, DeployerError>;
}

/// Git repository driven through the `git` binary
#[derive(Debug, Clone)]
pub struct GitRepository {
    root: PathBuf,
    enabled: bool,
}

impl GitRepository {
    /// Open the repository at `root`. When `enabled` is false the repository
    /// always reports itself unavailable.
    pub fn new(root: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            root: root.into(),
            enabled,
        }
    }

    async fn git(&self, args: &[&str]) -> Result<String, DeployerError> {
        debug!("Running git {}", args.join(" "));
        let output = Command::new("git")
            .current_dir(&self.root)
            .args(["-c", "core.quotepath=off"])
            .args(args)
            .output()
            .await
            .map_err(|e| DeployerError::VcsError(format!("Failed to run git: {e}")))?;

        if !output.status.success() {
            return Err(DeployerError::VcsError(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl VersionControl for GitRepository {
    async fn is_available(&self) -> bool {
        if !self.enabled {
            return false;
        }
        matches!(
            self.git(&["rev-parse", "--is-inside-work-tree"]).await,
            Ok(out) if out.trim() == "true"
        )
    }

    async fn head(&self) -> Result<String, DeployerError> {
        Ok(self.git(&["rev-parse", "HEAD"]).await?.trim().to_string())
    }

    async fn branch(&self) -> Result<String, DeployerError> {
        Ok(self
            .git(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await?
            .trim()
            .to_string())
    }

    async fn diff_name_status(&self, from: &str, to: &str) -> Result<String, DeployerError> {
        let exclude_metadata = format!(":(exclude){METADATA_FILE}");
        let exclude_dependencies = format!(":(exclude){DEPENDENCY_DIR}");
        self.git(&[
            "diff",
            "--name-status",
            "-M",
            "-C",
            from,
            to,
            "--",
            ".",
            &exclude_metadata,
            &exclude_dependencies,
        ])
        .await
    }
}

/// Paths classified from a name-status diff
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcsChanges {
    pub added: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
}

/// Classify `git diff --name-status` output.
///
/// Renames become a deletion of the old path plus an addition of the new
/// one; copies add the new path. Every path must pass `filter`. Unknown
/// status letters are ignored.
pub fn parse_name_status(diff: &str, filter: &PathFilter) -> VcsChanges {
    let mut changes = VcsChanges::default();
    let keep = |path: &str| !path.is_empty() && !filter.is_excluded(path);

    for line in diff.lines() {
        let mut fields = line.split('\t');
        let (Some(status), Some(first)) = (fields.next(), fields.next()) else {
            continue;
        };
        let second = fields.next();

        match (status.chars().next(), second) {
            (Some('A'), _) if keep(first) => {
                changes.added.insert(first.to_string());
            }
            (Some('M') | Some('T'), _) if keep(first) => {
                changes.modified.insert(first.to_string());
            }
            (Some('D'), _) if keep(first) => {
                changes.deleted.insert(first.to_string());
            }
            (Some('R'), Some(new_path)) => {
                if keep(first) {
                    changes.deleted.insert(first.to_string());
                }
                if keep(new_path) {
                    changes.added.insert(new_path.to_string());
                }
            }
            (Some('C'), Some(new_path)) if keep(new_path) => {
                changes.added.insert(new_path.to_string());
            }
            _ => {}
        }
    }

    changes
}
