//! Lazy directory walking with relative paths

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::DeployerError;
use crate::sync::filter::PathFilter;

/// One entry yielded by a tree walk
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Slash-separated path relative to the walk root
    pub relative: String,

    /// Absolute path on disk
    pub path: PathBuf,

    pub is_dir: bool,
}

/// Slash-separated form of `path` relative to `root`
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Walk everything below `root` in file-name order.
///
/// Excluded directories are pruned without being descended into. The root
/// itself is not yielded.
pub fn walk<'a>(
    root: &'a Path,
    filter: Option<&'a PathFilter>,
) -> impl Iterator<Item = Result<WalkEntry, DeployerError>> + 'a {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| match filter {
            Some(filter) => !filter.is_excluded(&relative_path(root, entry.path())),
            None => true,
        })
        .map(move |entry| {
            let entry = entry?;
            Ok(WalkEntry {
                relative: relative_path(root, entry.path()),
                path: entry.path().to_path_buf(),
                is_dir: entry.file_type().is_dir(),
            })
        })
}

/// Walk only the files below `root`
pub fn walk_files<'a>(
    root: &'a Path,
    filter: Option<&'a PathFilter>,
) -> impl Iterator<Item = Result<WalkEntry, DeployerError>> + 'a {
    walk(root, filter).filter(|entry| !matches!(entry, Ok(e) if e.is_dir))
}
