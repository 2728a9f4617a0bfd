//! Byte-blob transfer to and from the target root

pub mod local;
pub mod ssh;

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::errors::DeployerError;
use crate::storage::settings::TransportSettings;
use crate::transport::local::LocalTransport;
use crate::transport::ssh::SshTransport;

/// An open session to the target root.
///
/// Remote paths are slash-separated and relative to the target root. A
/// session is acquired with [`connect`] and must be released with
/// [`Transport::close`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Copy a local file to a remote path, creating parent directories
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), DeployerError>;

    /// Copy a remote file to a local path
    async fn download(&self, remote: &str, local: &Path) -> Result<(), DeployerError>;

    /// Bytes of a remote file from `offset` to its end
    async fn read_at(&self, remote: &str, offset: u64) -> Result<Vec<u8>, DeployerError>;

    /// Size of a remote file in bytes
    async fn size(&self, remote: &str) -> Result<u64, DeployerError>;

    /// Release the session. Further calls may fail.
    async fn close(&self) -> Result<(), DeployerError>;
}

/// Open a session described by `settings`
pub async fn connect(settings: &TransportSettings) -> Result<Box<dyn Transport>, DeployerError> {
    match settings {
        TransportSettings::Local { path } => {
            info!("Using local transport at {}", path.display());
            Ok(Box::new(LocalTransport::new(path)))
        }
        TransportSettings::Ssh {
            host,
            port,
            username,
            identity_file,
            path,
        } => {
            info!("Opening SSH session to {}@{}:{}", username, host, port);
            let transport = SshTransport::new(
                host.clone(),
                *port,
                username.clone(),
                identity_file.clone(),
                path.clone(),
            );
            transport.open().await?;
            Ok(Box::new(transport))
        }
    }
}

/// Reject remote paths that leave the target root
pub fn check_remote_path(remote: &str) -> Result<&str, DeployerError> {
    let trimmed = remote.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.split('/').any(|segment| segment == "..") {
        return Err(DeployerError::ValidationError(format!(
            "Invalid remote path: {remote}"
        )));
    }
    Ok(trimmed)
}
