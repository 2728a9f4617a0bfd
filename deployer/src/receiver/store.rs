//! Persisted deployment metadata on the target

use deploy_api::models::{DeploymentMetadata, MetadataResponse};
use tracing::warn;

use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::storage::layout::TargetLayout;

/// Reads and writes the metadata record in the target root
#[derive(Debug, Clone)]
pub struct MetadataStore {
    layout: TargetLayout,
}

impl MetadataStore {
    pub fn new(layout: TargetLayout) -> Self {
        Self { layout }
    }

    /// The metadata file in use: the current name, else the legacy one
    async fn existing_file(&self) -> Option<File> {
        let current = self.layout.metadata_file();
        if current.exists().await {
            return Some(current);
        }
        let legacy = self.layout.legacy_metadata_file();
        if legacy.exists().await {
            return Some(legacy);
        }
        None
    }

    /// Read the latest record, if any
    pub async fn read(&self) -> Result<Option<DeploymentMetadata>, DeployerError> {
        match self.existing_file().await {
            Some(file) => Ok(Some(file.read_json().await?)),
            None => Ok(None),
        }
    }

    /// Replace the record
    pub async fn write(&self, metadata: &DeploymentMetadata) -> Result<(), DeployerError> {
        self.layout.metadata_file().write_json(metadata).await
    }

    /// Replace the record with raw bytes
    pub async fn write_raw(&self, contents: &[u8]) -> Result<(), DeployerError> {
        self.layout.metadata_file().write_atomic(contents).await
    }

    /// Metadata endpoint view of the latest record
    pub async fn describe(&self, environment: &str) -> Result<MetadataResponse, DeployerError> {
        let Some(file) = self.existing_file().await else {
            return Ok(MetadataResponse::absent(environment));
        };

        match file.read_json::<DeploymentMetadata>().await {
            Ok(metadata) => Ok(metadata.into()),
            Err(DeployerError::JsonError(e)) => {
                // present but unparseable: an empty record
                warn!("Unreadable metadata {}: {}", file.path().display(), e);
                Ok(MetadataResponse {
                    exists: true,
                    ..Default::default()
                })
            }
            Err(e) => Err(e),
        }
    }
}
