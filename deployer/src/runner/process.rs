//! Command runner backed by a local program

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::DeployerError;
use crate::runner::{CommandRunner, CommandSpec};
use crate::storage::settings::RunnerSettings;

/// Runs every command as `<program...> <name> <args...>` inside the target
/// root, e.g. `php artisan migrate --force`
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(settings: &RunnerSettings, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: settings.program.clone(),
            working_dir: working_dir.into(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<String, DeployerError> {
        let (program, prefix) = self
            .program
            .split_first()
            .ok_or_else(|| DeployerError::ConfigError("Runner program is empty".to_string()))?;

        let args = spec.to_args();
        debug!("Running {} {} {}", self.program.join(" "), spec.name, args.join(" "));

        let child = Command::new(program)
            .args(prefix)
            .arg(&spec.name)
            .args(&args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeployerError::CommandError(format!("Failed to start {program}: {e}")))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!("{} timed out after {:?}", spec.name, self.timeout);
                return Err(DeployerError::CommandError(format!(
                    "Timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let detail = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            return Err(DeployerError::CommandError(format!(
                "{} exited with {}: {}",
                spec.name, output.status, detail
            )));
        }

        let mut text = stdout.into_owned();
        if !stderr.trim().is_empty() {
            text.push('\n');
            text.push_str(&stderr);
        }
        Ok(text)
    }
}
