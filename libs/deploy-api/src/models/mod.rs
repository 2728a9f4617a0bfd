//! Deployment API models

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata entry embedded in every package and persisted in the target root
pub const METADATA_FILE: &str = ".deploy-meta.json";

/// Metadata filename written by older releases, still read as a fallback
pub const LEGACY_METADATA_FILE: &str = "deploy-meta.json";

/// Header carrying the shared deploy token
pub const TOKEN_HEADER: &str = "X-DEPLOY-TOKEN";

/// Run endpoint path
pub const RUN_PATH: &str = "/deployer/run";

/// Metadata endpoint path
pub const METADATA_PATH: &str = "/deployer/metadata";

/// Environment used when a request does not name one
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Package name used when a request does not name one
pub const DEFAULT_PACKAGE_NAME: &str = "deploy.zip";

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

fn default_true() -> bool {
    true
}

// =============================== METADATA ================================== //

/// Kind of deployment recorded in the metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    #[default]
    Full,
    Incremental,
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentType::Full => write!(f, "full"),
            DeploymentType::Incremental => write!(f, "incremental"),
        }
    }
}

/// Version-control state at deployment time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsRecord {
    pub available: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_commit: Option<String>,
}

/// Dependency manifest hashes at deployment time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// Hash of the dependency manifest (`composer.json`)
    #[serde(default, alias = "composer_json_hash")]
    pub manifest_hash: Option<String>,

    /// Hash of the dependency lock file (`composer.lock`)
    #[serde(default, alias = "composer_lock_hash")]
    pub lock_hash: Option<String>,

    /// Whether the dependency directory shipped with this deployment
    #[serde(default)]
    pub vendor_included: bool,
}

/// The persisted record of the most recently applied deployment.
///
/// Embedded in every package under [`METADATA_FILE`] and overwritten
/// wholesale on the target after each extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentMetadata {
    pub environment: String,

    pub deployed_at: DateTime<Utc>,

    #[serde(default)]
    pub deployment_type: DeploymentType,

    #[serde(default)]
    pub deployed_files_count: usize,

    /// Paths removed at the source since the previous deployment
    #[serde(default)]
    pub deleted_files: Vec<String>,

    #[serde(default, rename = "git", skip_serializing_if = "Option::is_none")]
    pub vcs: Option<VcsRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<DependencyRecord>,

    /// Per-file content hashes, recorded for hash-based change detection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<BTreeMap<String, String>>,
}

// ============================== RUN ENDPOINT =============================== //

/// Run endpoint request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default = "default_environment")]
    pub env: String,

    /// Explicit command list; `None` falls back to the configured lists
    #[serde(default)]
    pub commands: Option<Vec<String>>,

    #[serde(default)]
    pub zipname: Option<String>,

    /// Paths to delete before extraction
    #[serde(default)]
    pub delete: Vec<String>,

    /// Set to false for command-only calls
    #[serde(default = "default_true")]
    pub extract: bool,
}

impl RunRequest {
    /// Package name requested, or the default
    pub fn package_name(&self) -> &str {
        self.zipname
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_PACKAGE_NAME)
    }
}

/// Outcome of a batch of deletions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub success: bool,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    pub message: String,
}

/// Outcome of extracting the uploaded package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub success: bool,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_type: Option<DeploymentType>,

    #[serde(default)]
    pub files_total: usize,

    #[serde(default)]
    pub files_extracted: usize,

    #[serde(default)]
    pub duration_seconds: f64,
}

impl ExtractionReport {
    /// A failed extraction with nothing written
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            deployment_type: None,
            files_total: 0,
            files_extracted: 0,
            duration_seconds: 0.0,
        }
    }

    /// Extraction not requested by the caller
    pub fn skipped() -> Self {
        Self {
            success: true,
            message: "Extraction skipped".to_string(),
            deployment_type: None,
            files_total: 0,
            files_extracted: 0,
            duration_seconds: 0.0,
        }
    }
}

/// Outcome of one remote command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Full result of a run request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub success: bool,
    pub environment: String,
    pub started_at: DateTime<Utc>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    pub deletions: Option<DeleteReport>,
    pub auto_deletions: Option<DeleteReport>,
    pub extraction: ExtractionReport,

    #[serde(default)]
    pub commands: Vec<CommandResult>,

    /// Wall time in seconds
    #[serde(default)]
    pub total_time: f64,
}

// =========================== METADATA ENDPOINT ============================= //

/// Metadata endpoint response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataResponse {
    pub exists: bool,

    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default)]
    pub commit_hash: Option<String>,

    #[serde(default)]
    pub deployed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub deployment_type: Option<DeploymentType>,

    #[serde(default)]
    pub git: Option<VcsRecord>,

    #[serde(default)]
    pub dependencies: Option<DependencyRecord>,

    #[serde(default)]
    pub files: Option<BTreeMap<String, String>>,
}

impl MetadataResponse {
    /// Response for a target that has never been deployed
    pub fn absent(environment: &str) -> Self {
        Self {
            exists: false,
            environment: Some(environment.to_string()),
            ..Default::default()
        }
    }
}

impl From<DeploymentMetadata> for MetadataResponse {
    fn from(meta: DeploymentMetadata) -> Self {
        let branch = meta.vcs.as_ref().and_then(|vcs| vcs.branch.clone());
        let commit_hash = meta.vcs.as_ref().and_then(|vcs| vcs.commit_hash.clone());
        Self {
            exists: true,
            environment: Some(meta.environment),
            branch,
            commit_hash,
            deployed_at: Some(meta.deployed_at),
            deployment_type: Some(meta.deployment_type),
            git: meta.vcs,
            dependencies: meta.dependencies,
            files: meta.files,
        }
    }
}

/// Error envelope returned for rejected or failed requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}
