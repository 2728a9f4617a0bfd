//! Transport to a target root on a local or mounted file system

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::errors::DeployerError;
use crate::transport::{check_remote_path, Transport};

#[derive(Debug, Clone)]
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, remote: &str) -> Result<PathBuf, DeployerError> {
        Ok(self.root.join(check_remote_path(remote)?))
    }
}

fn not_found(remote: &str, err: std::io::Error) -> DeployerError {
    if err.kind() == std::io::ErrorKind::NotFound {
        DeployerError::NotFound(remote.to_string())
    } else {
        DeployerError::TransportError(format!("{remote}: {err}"))
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), DeployerError> {
        let target = self.resolve(remote)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        debug!("Copying {} to {}", local.display(), target.display());
        fs::copy(local, &target)
            .await
            .map_err(|e| DeployerError::TransportError(format!("Upload of {remote} failed: {e}")))?;
        Ok(())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), DeployerError> {
        let source = self.resolve(remote)?;
        fs::copy(&source, local)
            .await
            .map_err(|e| not_found(remote, e))?;
        Ok(())
    }

    async fn read_at(&self, remote: &str, offset: u64) -> Result<Vec<u8>, DeployerError> {
        let mut file = fs::File::open(self.resolve(remote)?)
            .await
            .map_err(|e| not_found(remote, e))?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    async fn size(&self, remote: &str) -> Result<u64, DeployerError> {
        let meta = fs::metadata(self.resolve(remote)?)
            .await
            .map_err(|e| not_found(remote, e))?;
        Ok(meta.len())
    }

    async fn close(&self) -> Result<(), DeployerError> {
        Ok(())
    }
}
