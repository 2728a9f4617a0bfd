//! Read log files from the target's log directory

use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::app::options::{LogsMode, LogsOptions};
use crate::app::render::print_log_line;
use crate::app::{close_transport, transport_settings};
use crate::errors::DeployerError;
use crate::storage::layout::REMOTE_LOG_DIR;
use crate::storage::settings::Settings;
use crate::transport::{connect, Transport};
use crate::utils::format_bytes;

/// Bytes fetched per requested line when tailing
const BYTES_PER_LINE: u64 = 300;

/// Downloads above this size get a warning
const LARGE_DOWNLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Remote path of a log file, relative to the target root.
///
/// Backslashes and traversal segments are dropped so the result always
/// stays inside the log directory.
pub fn remote_log_path(file: &str) -> Result<String, DeployerError> {
    let normalized = file.replace('\\', "/");
    let clean: Vec<&str> = normalized
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect();
    if clean.is_empty() {
        return Err(DeployerError::ValidationError(format!(
            "Invalid log path: {file}"
        )));
    }
    Ok(format!("{}/{}", REMOTE_LOG_DIR, clean.join("/")))
}

/// Local name a downloaded log is saved under: `laravel.log` becomes
/// `laravel-server.log`
pub fn download_name(remote: &str) -> String {
    let name = Path::new(remote);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".to_string());
    let extension = name
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".to_string());
    format!("{stem}-server.{extension}")
}

/// Size of a log file, treating an empty file as missing
async fn log_size(transport: &dyn Transport, remote: &str) -> Result<u64, DeployerError> {
    match transport.size(remote).await? {
        0 => Err(DeployerError::NotFound(format!(
            "Log file not found or empty: {remote}"
        ))),
        size => Ok(size),
    }
}

/// The last `lines` lines of a remote log
pub async fn tail(
    transport: &dyn Transport,
    remote: &str,
    lines: usize,
) -> Result<Vec<String>, DeployerError> {
    let size = log_size(transport, remote).await?;
    let fetch = size.min((lines as u64).saturating_mul(BYTES_PER_LINE));
    let offset = size - fetch;
    let bytes = transport.read_at(remote, offset).await?;
    Ok(last_lines(&bytes, lines))
}

fn last_lines(bytes: &[u8], lines: usize) -> Vec<String> {
    let text = String::from_utf8_lossy(bytes);
    let all: Vec<&str> = text.trim_end().split('\n').collect();
    let skip = all.len().saturating_sub(lines);
    all[skip..]
        .iter()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}

/// Save a remote log under `dir`, returning the local path
pub async fn download(
    transport: &dyn Transport,
    remote: &str,
    dir: &Path,
) -> Result<PathBuf, DeployerError> {
    let size = log_size(transport, remote).await?;
    if size > LARGE_DOWNLOAD_BYTES {
        warn!("{} is large ({})", remote, format_bytes(size));
    }
    tokio::fs::create_dir_all(dir).await?;
    let local = dir.join(download_name(remote));
    transport.download(remote, &local).await?;
    info!("Saved {} ({}) to {}", remote, format_bytes(size), local.display());
    Ok(local)
}

/// Follows a growing remote log by offset
#[derive(Debug)]
pub struct LogFollower {
    remote: String,
    offset: u64,
    pending: String,
}

impl LogFollower {
    /// Follow `remote` from byte `offset`
    pub fn new(remote: impl Into<String>, offset: u64) -> Self {
        Self {
            remote: remote.into(),
            offset,
            pending: String::new(),
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Complete lines appended since the last poll. A file that shrank was
    /// rotated or cleared, so following restarts from its new end.
    pub async fn poll(&mut self, transport: &dyn Transport) -> Result<Vec<String>, DeployerError> {
        let size = transport.size(&self.remote).await?;
        if size < self.offset {
            info!("{} was truncated, following from its end", self.remote);
            self.offset = size;
            self.pending.clear();
            return Ok(Vec::new());
        }
        if size == self.offset {
            return Ok(Vec::new());
        }

        let bytes = transport.read_at(&self.remote, self.offset).await?;
        self.offset += bytes.len() as u64;
        self.pending.push_str(&String::from_utf8_lossy(&bytes));

        let Some(end) = self.pending.rfind('\n') else {
            return Ok(Vec::new());
        };
        let complete: String = self.pending.drain(..=end).collect();
        Ok(complete
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect())
    }
}

/// Tail, download or watch a log on the environment's target
pub async fn show_logs<F>(
    settings: &Settings,
    options: &LogsOptions,
    shutdown: F,
) -> Result<(), DeployerError>
where
    F: Future<Output = ()>,
{
    let name = options.environment.as_str();
    let env = settings
        .environment(name)
        .ok_or_else(|| DeployerError::ConfigError(format!("Invalid environment: {name}")))?;
    let remote = remote_log_path(&options.file)?;
    let transport = connect(transport_settings(name, env)?).await?;

    let result = match options.mode {
        LogsMode::Tail => tail(transport.as_ref(), &remote, options.lines)
            .await
            .map(|lines| lines.iter().for_each(|line| print_log_line(line))),
        LogsMode::Download => download(transport.as_ref(), &remote, &options.download_dir)
            .await
            .map(|local| println!("{}", local.display())),
        LogsMode::Watch => watch(transport.as_ref(), &remote, options, shutdown).await,
    };
    close_transport(transport.as_ref()).await;
    result
}

async fn watch<F>(
    transport: &dyn Transport,
    remote: &str,
    options: &LogsOptions,
    shutdown: F,
) -> Result<(), DeployerError>
where
    F: Future<Output = ()>,
{
    for line in tail(transport, remote, options.lines).await? {
        print_log_line(&line);
    }
    let mut follower = LogFollower::new(remote, transport.size(remote).await?);
    info!("Watching {} (Ctrl+C to stop)", remote);

    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(options.poll_interval);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            _ = interval.tick() => {
                match follower.poll(transport).await {
                    Ok(lines) => lines.iter().for_each(|line| print_log_line(line)),
                    Err(e) => warn!("Failed to poll {}: {}", remote, e),
                }
            }
        }
    }
}
