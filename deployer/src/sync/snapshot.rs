//! Read access to the local tree being deployed

use std::collections::BTreeMap;

use tracing::warn;

use crate::errors::DeployerError;
use crate::filesys::walk::walk_files;
use crate::storage::layout::ProjectLayout;
use crate::sync::filter::PathFilter;
use crate::utils::{sha256_file, sha256_file_if_exists};

/// Blocking read access to a file tree.
///
/// Implementations are called from the blocking thread pool.
pub trait TreeSnapshot: Send + Sync {
    /// Content hash of every non-excluded file
    fn hash_files(&self, filter: &PathFilter) -> Result<BTreeMap<String, String>, DeployerError>;

    /// Content hash of one file, if it exists
    fn hash_file(&self, relative: &str) -> Option<String>;
}

/// The project tree on the local disk
#[derive(Debug, Clone)]
pub struct LocalTree {
    layout: ProjectLayout,
}

impl LocalTree {
    pub fn new(layout: ProjectLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }
}

impl TreeSnapshot for LocalTree {
    fn hash_files(&self, filter: &PathFilter) -> Result<BTreeMap<String, String>, DeployerError> {
        let mut hashes = BTreeMap::new();
        for entry in walk_files(&self.layout.root, Some(filter)) {
            let entry = entry?;
            match sha256_file(&entry.path) {
                Ok(hash) => {
                    hashes.insert(entry.relative, hash);
                }
                // Vanished or unreadable between listing and hashing
                Err(e) => warn!("Skipping {}: {}", entry.relative, e),
            }
        }
        Ok(hashes)
    }

    fn hash_file(&self, relative: &str) -> Option<String> {
        sha256_file_if_exists(&self.layout.resolve(relative))
    }
}
