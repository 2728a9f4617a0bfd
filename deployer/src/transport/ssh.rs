//! Transport over one multiplexed OpenSSH session

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::DeployerError;
use crate::transport::{check_remote_path, Transport};

/// Runs every transfer through a ControlMaster connection opened once by
/// [`SshTransport::open`] and torn down by [`Transport::close`]
#[derive(Debug)]
pub struct SshTransport {
    host: String,
    port: u16,
    username: String,
    identity_file: Option<PathBuf>,
    root: String,
    control_path: PathBuf,
}

/// Quote a string for a POSIX shell
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

impl SshTransport {
    pub fn new(
        host: String,
        port: u16,
        username: String,
        identity_file: Option<PathBuf>,
        root: String,
    ) -> Self {
        // unix socket paths are short, keep the name compact
        let id = uuid::Uuid::new_v4().simple().to_string();
        let control_path = std::env::temp_dir().join(format!("deployer-{}.sock", &id[..12]));
        Self {
            host,
            port,
            username,
            identity_file,
            root: root.trim_end_matches('/').to_string(),
            control_path,
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    /// Remote shell path of a root-relative path
    fn remote_path(&self, remote: &str) -> Result<String, DeployerError> {
        let relative = check_remote_path(remote)?;
        if self.root.is_empty() {
            Ok(format!("/{relative}"))
        } else {
            Ok(format!("{}/{}", self.root, relative))
        }
    }

    /// Base ssh invocation bound to the control socket
    fn ssh(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-S")
            .arg(&self.control_path)
            .args(["-p", &self.port.to_string()])
            .args(["-o", "BatchMode=yes"]);
        if let Some(identity) = &self.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    /// Start the master connection in the background
    pub async fn open(&self) -> Result<(), DeployerError> {
        let output = self
            .ssh()
            .args(["-M", "-f", "-N", "-o", "ControlPersist=yes"])
            .arg(self.destination())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DeployerError::TransportError(format!("Failed to run ssh: {e}")))?;

        if !output.status.success() {
            return Err(DeployerError::TransportError(format!(
                "SSH connection to {} failed: {}",
                self.host,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!("SSH master running on {}", self.control_path.display());
        Ok(())
    }

    /// Run a remote shell command, returning its stdout
    async fn exec(&self, script: &str, stdin: Stdio, remote: &str) -> Result<Vec<u8>, DeployerError> {
        debug!("ssh {}: {}", self.host, script);
        let output = self
            .ssh()
            .arg(self.destination())
            .arg(script)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DeployerError::TransportError(format!("Failed to run ssh: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such file") {
                return Err(DeployerError::NotFound(remote.to_string()));
            }
            return Err(DeployerError::TransportError(format!(
                "{}: {}",
                remote,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), DeployerError> {
        let target = self.remote_path(remote)?;
        let parent = target.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("/");
        let source = std::fs::File::open(local)?;
        let script = format!(
            "mkdir -p {} && cat > {}",
            quote(if parent.is_empty() { "/" } else { parent }),
            quote(&target)
        );
        self.exec(&script, Stdio::from(source), remote).await?;
        Ok(())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), DeployerError> {
        let source = self.remote_path(remote)?;
        let bytes = self
            .exec(&format!("cat {}", quote(&source)), Stdio::null(), remote)
            .await?;
        tokio::fs::write(local, bytes).await?;
        Ok(())
    }

    async fn read_at(&self, remote: &str, offset: u64) -> Result<Vec<u8>, DeployerError> {
        let source = self.remote_path(remote)?;
        let script = format!("tail -c +{} {}", offset + 1, quote(&source));
        self.exec(&script, Stdio::null(), remote).await
    }

    async fn size(&self, remote: &str) -> Result<u64, DeployerError> {
        let source = self.remote_path(remote)?;
        let out = self
            .exec(&format!("wc -c < {}", quote(&source)), Stdio::null(), remote)
            .await?;
        String::from_utf8_lossy(&out)
            .trim()
            .parse()
            .map_err(|e| DeployerError::TransportError(format!("Unexpected size for {remote}: {e}")))
    }

    async fn close(&self) -> Result<(), DeployerError> {
        let status = self
            .ssh()
            .args(["-O", "exit"])
            .arg(self.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| DeployerError::TransportError(format!("Failed to run ssh: {e}")))?;
        if !status.success() {
            warn!("SSH master for {} was not running", self.host);
        }
        Ok(())
    }
}
