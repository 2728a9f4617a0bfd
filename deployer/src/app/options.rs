//! Client workflow options

use std::path::PathBuf;
use std::time::Duration;

use deploy_api::models::{DEFAULT_ENVIRONMENT, DEFAULT_PACKAGE_NAME};

/// Options for one deployment
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Target environment
    pub environment: String,

    /// Ignore the remote metadata and ship the whole tree
    pub full: bool,

    /// First-time setup: full tree plus bootstrap directories, no commands
    pub bootstrap: bool,

    /// Build and apply without uploading (the package is already in place)
    pub skip_upload: bool,

    /// Package name on the target
    pub package_name: String,

    /// Extra paths to delete on the target before extraction
    pub delete: Vec<String>,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            full: false,
            bootstrap: false,
            skip_upload: false,
            package_name: DEFAULT_PACKAGE_NAME.to_string(),
            delete: Vec::new(),
        }
    }
}

/// Options for running commands without deploying
#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Target environment
    pub environment: String,

    /// Commands to run, in order
    pub commands: Vec<String>,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            commands: Vec::new(),
        }
    }
}

/// What to do with a remote log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogsMode {
    /// Print the last lines
    Tail,
    /// Save a local copy
    Download,
    /// Follow appended lines until interrupted
    Watch,
}

/// Options for reading remote logs
#[derive(Debug, Clone)]
pub struct LogsOptions {
    /// Target environment
    pub environment: String,

    /// Log file, relative to the remote log directory
    pub file: String,

    pub mode: LogsMode,

    /// Lines printed in tail mode
    pub lines: usize,

    /// Delay between polls in watch mode
    pub poll_interval: Duration,

    /// Directory downloads are saved to
    pub download_dir: PathBuf,
}

impl Default for LogsOptions {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            file: "laravel.log".to_string(),
            mode: LogsMode::Tail,
            lines: 100,
            poll_interval: Duration::from_secs(3),
            download_dir: PathBuf::from("storage/logs"),
        }
    }
}
