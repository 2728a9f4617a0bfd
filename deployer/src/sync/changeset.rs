//! Change detection between the local tree and the last deployment

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use deploy_api::models::{
    DependencyRecord, DeploymentMetadata, DeploymentType, MetadataResponse, VcsRecord,
};
use tracing::{debug, info, warn};

use crate::errors::DeployerError;
use crate::storage::layout::{DEPENDENCY_LOCK, DEPENDENCY_MANIFEST};
use crate::sync::filter::PathFilter;
use crate::sync::snapshot::TreeSnapshot;
use crate::sync::vcs::{parse_name_status, VersionControl};

/// How a change set was computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeMethod {
    Full,
    VcsDiff,
    HashDiff,
}

impl fmt::Display for ChangeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeMethod::Full => write!(f, "full"),
            ChangeMethod::VcsDiff => write!(f, "vcs-diff"),
            ChangeMethod::HashDiff => write!(f, "hash-diff"),
        }
    }
}

/// Version-control state of the local project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcsState {
    pub branch: Option<String>,
    pub commit: Option<String>,
}

/// Files to ship and remove for one deployment attempt
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub method: ChangeMethod,
    pub added: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
    pub include_vendor: bool,

    /// Hashes of the whole non-excluded tree (full and hash-diff only)
    pub current_hashes: Option<BTreeMap<String, String>>,

    pub vcs_commit: Option<String>,
    pub vcs_previous_commit: Option<String>,

    /// No previous deployment was found
    pub first_deployment: bool,

    /// Ship the bootstrap directories verbatim, empty ones included
    pub include_bootstrap_dirs: bool,

    /// Local version-control state, when version control is usable
    pub vcs: Option<VcsState>,
}

impl ChangeSet {
    fn empty(method: ChangeMethod) -> Self {
        Self {
            method,
            added: BTreeSet::new(),
            modified: BTreeSet::new(),
            deleted: BTreeSet::new(),
            include_vendor: false,
            current_hashes: None,
            vcs_commit: None,
            vcs_previous_commit: None,
            first_deployment: false,
            include_bootstrap_dirs: false,
            vcs: None,
        }
    }

    /// Deployment type recorded in the metadata
    pub fn deployment_type(&self) -> DeploymentType {
        if self.first_deployment {
            DeploymentType::Full
        } else {
            DeploymentType::Incremental
        }
    }

    /// Added and modified paths, in order
    pub fn shipped_paths(&self) -> impl Iterator<Item = &String> {
        self.added.iter().chain(self.modified.iter())
    }

    /// Whether there is nothing to ship or remove
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
            && !self.include_vendor
            && !self.include_bootstrap_dirs
    }

    /// Version-control block for the metadata
    pub fn vcs_record(&self) -> VcsRecord {
        match &self.vcs {
            Some(state) => VcsRecord {
                available: true,
                branch: Some(state.branch.clone().unwrap_or_else(|| "unknown".to_string())),
                commit_hash: self.vcs_commit.clone().or_else(|| state.commit.clone()),
                previous_commit: self.vcs_previous_commit.clone(),
            },
            None => VcsRecord::default(),
        }
    }

    /// Keep the three sets disjoint. A path both added and modified stays
    /// added; anything shipped is no longer deleted.
    fn normalize(&mut self) {
        self.modified.retain(|path| !self.added.contains(path));
        self.deleted
            .retain(|path| !self.added.contains(path) && !self.modified.contains(path));
    }
}

/// What the resolver needs to know about the last deployment
#[derive(Debug, Clone, Default)]
pub struct PreviousDeployment {
    pub commit_hash: Option<String>,
    pub dependencies: Option<DependencyRecord>,
    pub files: BTreeMap<String, String>,
}

impl PreviousDeployment {
    /// Previous deployment described by a metadata response, if one exists
    pub fn from_response(response: MetadataResponse) -> Option<Self> {
        if !response.exists {
            return None;
        }
        let commit_hash = response
            .git
            .and_then(|vcs| vcs.commit_hash)
            .or(response.commit_hash)
            .filter(|hash| !hash.is_empty());
        Some(Self {
            commit_hash,
            dependencies: response.dependencies,
            files: response.files.unwrap_or_default(),
        })
    }
}

impl From<&DeploymentMetadata> for PreviousDeployment {
    fn from(meta: &DeploymentMetadata) -> Self {
        Self {
            commit_hash: meta
                .vcs
                .as_ref()
                .and_then(|vcs| vcs.commit_hash.clone())
                .filter(|hash| !hash.is_empty()),
            dependencies: meta.dependencies.clone(),
            files: meta.files.clone().unwrap_or_default(),
        }
    }
}

/// Whether the dependency directory must ship.
///
/// Never without a local manifest. Otherwise when nothing was recorded, when
/// the manifest changed, or when the lock changed (compared only if both
/// sides have a lock hash).
pub fn should_include_vendor(
    previous: Option<&DependencyRecord>,
    manifest_hash: Option<&str>,
    lock_hash: Option<&str>,
) -> bool {
    let Some(manifest_hash) = manifest_hash else {
        return false;
    };
    let Some(previous) = previous else {
        return true;
    };
    if previous.manifest_hash.as_deref() != Some(manifest_hash) {
        return true;
    }
    matches!(
        (lock_hash, previous.lock_hash.as_deref()),
        (Some(current), Some(recorded)) if current != recorded
    )
}

/// Compare a hash map of the current tree against the recorded one
pub fn diff_hashes(
    previous: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
) -> (BTreeSet<String>, BTreeSet<String>, BTreeSet<String>) {
    let mut added = BTreeSet::new();
    let mut modified = BTreeSet::new();
    for (path, hash) in current {
        match previous.get(path) {
            None => {
                added.insert(path.clone());
            }
            Some(recorded) if recorded != hash => {
                modified.insert(path.clone());
            }
            Some(_) => {}
        }
    }
    let deleted = previous
        .keys()
        .filter(|path| !current.contains_key(*path))
        .cloned()
        .collect();
    (added, modified, deleted)
}

/// Computes the change set for a deployment attempt
pub struct ChangeSetResolver {
    tree: Arc<dyn TreeSnapshot>,
    filter: PathFilter,
    vcs: Arc<dyn VersionControl>,
}

impl ChangeSetResolver {
    pub fn new(tree: Arc<dyn TreeSnapshot>, filter: PathFilter, vcs: Arc<dyn VersionControl>) -> Self {
        Self { tree, filter, vcs }
    }

    /// Resolve what to ship given the last deployment, if any. `bootstrap`
    /// requests the bootstrap directories even when a deployment exists.
    pub async fn resolve(
        &self,
        previous: Option<&PreviousDeployment>,
        bootstrap: bool,
    ) -> Result<ChangeSet, DeployerError> {
        let vcs = if self.vcs.is_available().await {
            Some(VcsState {
                branch: self.vcs.branch().await.ok(),
                commit: self.vcs.head().await.ok(),
            })
        } else {
            None
        };

        let mut change_set = match previous {
            None => self.full().await?,
            Some(previous) => {
                let vcs_range = match (&vcs, &previous.commit_hash) {
                    (Some(VcsState { commit: Some(head), .. }), Some(recorded)) => {
                        Some((recorded.clone(), head.clone()))
                    }
                    _ => None,
                };
                let mut change_set = match vcs_range {
                    Some((from, to)) => match self.vcs_diff(&from, &to).await {
                        Ok(change_set) => change_set,
                        Err(e) => {
                            warn!("Falling back to hash comparison: {}", e);
                            self.hash_diff(&previous.files).await?
                        }
                    },
                    None => self.hash_diff(&previous.files).await?,
                };
                change_set.include_vendor = self.vendor_changed(previous).await?;
                change_set
            }
        };

        change_set.first_deployment = previous.is_none();
        change_set.include_bootstrap_dirs = previous.is_none() || bootstrap;
        change_set.vcs = vcs;
        change_set.normalize();

        info!(
            "Resolved {} change set: {} added, {} modified, {} deleted, vendor: {}",
            change_set.method,
            change_set.added.len(),
            change_set.modified.len(),
            change_set.deleted.len(),
            change_set.include_vendor
        );
        Ok(change_set)
    }

    async fn full(&self) -> Result<ChangeSet, DeployerError> {
        debug!("No previous deployment, shipping the whole tree");
        let hashes = self.hash_tree().await?;

        let mut change_set = ChangeSet::empty(ChangeMethod::Full);
        change_set.added = hashes.keys().cloned().collect();
        change_set.current_hashes = Some(hashes);
        change_set.include_vendor = true;
        Ok(change_set)
    }

    async fn vcs_diff(&self, from: &str, to: &str) -> Result<ChangeSet, DeployerError> {
        debug!("Diffing {}..{}", from, to);
        let diff = self.vcs.diff_name_status(from, to).await?;
        let changes = parse_name_status(&diff, &self.filter);

        let mut change_set = ChangeSet::empty(ChangeMethod::VcsDiff);
        change_set.added = changes.added;
        change_set.modified = changes.modified;
        change_set.deleted = changes.deleted;
        change_set.vcs_commit = Some(to.to_string());
        change_set.vcs_previous_commit = Some(from.to_string());
        Ok(change_set)
    }

    async fn hash_diff(
        &self,
        previous: &BTreeMap<String, String>,
    ) -> Result<ChangeSet, DeployerError> {
        let current = self.hash_tree().await?;
        let (added, modified, deleted) = diff_hashes(previous, &current);

        let mut change_set = ChangeSet::empty(ChangeMethod::HashDiff);
        change_set.added = added;
        change_set.modified = modified;
        change_set.deleted = deleted;
        change_set.current_hashes = Some(current);
        Ok(change_set)
    }

    async fn hash_tree(&self) -> Result<BTreeMap<String, String>, DeployerError> {
        let tree = Arc::clone(&self.tree);
        let filter = self.filter.clone();
        tokio::task::spawn_blocking(move || tree.hash_files(&filter)).await?
    }

    async fn vendor_changed(&self, previous: &PreviousDeployment) -> Result<bool, DeployerError> {
        let tree = Arc::clone(&self.tree);
        let (manifest_hash, lock_hash) = tokio::task::spawn_blocking(move || {
            (
                tree.hash_file(DEPENDENCY_MANIFEST),
                tree.hash_file(DEPENDENCY_LOCK),
            )
        })
        .await?;

        Ok(should_include_vendor(
            previous.dependencies.as_ref(),
            manifest_hash.as_deref(),
            lock_hash.as_deref(),
        ))
    }
}
