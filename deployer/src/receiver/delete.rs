//! Path-safe deletion inside the target root

use std::path::{Component, Path};

use deploy_api::models::DeleteReport;
use tokio::fs;
use tracing::{debug, warn};

use crate::storage::layout::{TargetLayout, PROTECTED_BASENAMES};

enum Rejection {
    InvalidPath,
    Protected,
}

fn check_path(relative: &str) -> Result<(), Rejection> {
    if relative.is_empty() || relative.contains("..") || relative.contains('\\') {
        return Err(Rejection::InvalidPath);
    }
    let path = Path::new(relative);
    let mut normal = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            _ => return Err(Rejection::InvalidPath),
        }
    }
    if normal == 0 {
        return Err(Rejection::InvalidPath);
    }

    let basename = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    if PROTECTED_BASENAMES.contains(&basename.as_ref()) {
        return Err(Rejection::Protected);
    }
    Ok(())
}

/// Delete each path relative to the target root.
///
/// Leading slashes are ignored. Paths with a `..` segment and protected
/// basenames are skipped, as are paths that do not exist. Directories are
/// removed recursively and reported with a trailing `/`.
pub async fn delete_many(layout: &TargetLayout, paths: &[String]) -> DeleteReport {
    let mut report = DeleteReport::default();

    for raw in paths {
        let relative = raw.trim_start_matches('/').trim_end_matches('/');

        match check_path(relative) {
            Err(Rejection::InvalidPath) => {
                report.skipped.push(format!("{relative} (invalid path)"));
                continue;
            }
            Err(Rejection::Protected) => {
                report.skipped.push(format!("{relative} (protected)"));
                continue;
            }
            Ok(()) => {}
        }

        let full_path = layout.resolve(relative);
        let meta = match fs::symlink_metadata(&full_path).await {
            Ok(meta) => meta,
            Err(_) => {
                report.skipped.push(format!("{relative} (not found)"));
                continue;
            }
        };

        let result = if meta.is_dir() {
            fs::remove_dir_all(&full_path).await.map(|_| format!("{relative}/"))
        } else {
            fs::remove_file(&full_path).await.map(|_| relative.to_string())
        };

        match result {
            Ok(deleted) => {
                debug!("Deleted {}", deleted);
                report.deleted.push(deleted);
            }
            Err(e) => {
                warn!("Failed to delete {}: {}", relative, e);
                report.failed.push(format!("{relative} ({e})"));
            }
        }
    }

    report.success = report.failed.is_empty();
    report.message = format!("Deleted {} item(s)", report.deleted.len());
    report
}
