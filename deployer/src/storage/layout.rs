//! Project and target tree layouts

use std::path::{Path, PathBuf};

use deploy_api::models::{LEGACY_METADATA_FILE, METADATA_FILE};

use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Dependency directory, shipped only when the dependency manifests change
pub const DEPENDENCY_DIR: &str = "vendor";

/// Dependency manifest file
pub const DEPENDENCY_MANIFEST: &str = "composer.json";

/// Dependency lock file
pub const DEPENDENCY_LOCK: &str = "composer.lock";

/// Directories the application needs present on the target, shipped verbatim
/// (including empty subdirectories) on first deployment
pub const BOOTSTRAP_DIRS: [&str; 2] = ["storage", "bootstrap/cache"];

/// Basenames a deletion request may never remove
pub const PROTECTED_BASENAMES: [&str; 4] = [".env", "artisan", "composer.json", "composer.lock"];

/// Log directory on the target, relative to its root
pub const REMOTE_LOG_DIR: &str = "storage/logs";

/// Layout of the local project being deployed
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    /// Project root
    pub root: PathBuf,
}

impl ProjectLayout {
    /// Create a new project layout
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path of a project-relative path
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Dependency directory
    pub fn dependency_dir(&self) -> PathBuf {
        self.root.join(DEPENDENCY_DIR)
    }

    /// Dependency manifest
    pub fn manifest_file(&self) -> PathBuf {
        self.root.join(DEPENDENCY_MANIFEST)
    }

    /// Dependency lock file
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(DEPENDENCY_LOCK)
    }
}

/// Layout of the target root on the receiving side
#[derive(Debug, Clone)]
pub struct TargetLayout {
    /// Target root that packages extract into
    pub root: PathBuf,
}

impl TargetLayout {
    /// Create a new target layout
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Target root as a directory
    pub fn root_dir(&self) -> Dir {
        Dir::new(&self.root)
    }

    /// Absolute path of a target-relative path
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Current metadata file
    pub fn metadata_file(&self) -> File {
        File::new(self.root.join(METADATA_FILE))
    }

    /// Legacy metadata file
    pub fn legacy_metadata_file(&self) -> File {
        File::new(self.root.join(LEGACY_METADATA_FILE))
    }

    /// Uploaded package location, if the name is a plain file name
    pub fn package_file(&self, name: &str) -> Option<File> {
        if !is_plain_file_name(name) {
            return None;
        }
        Some(File::new(self.root.join(name)))
    }
}

/// Whether a name is a single path component with no traversal
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && Path::new(name).components().count() == 1
}
