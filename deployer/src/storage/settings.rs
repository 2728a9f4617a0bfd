//! Settings file management

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Default settings filename, looked up in the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "deployer.json";

/// Deployer settings, shared by the client and the receiver
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Emit console logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Receiver server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Local project configuration
    #[serde(default)]
    pub project: ProjectSettings,

    /// Commands run after extraction when neither the request nor the
    /// environment names any
    #[serde(default = "default_commands")]
    pub default_commands: Vec<String>,

    /// Command runner configuration
    #[serde(default)]
    pub runner: RunnerSettings,

    /// Deployment environments by name
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentSettings>,
}

fn default_true() -> bool {
    true
}

fn default_commands() -> Vec<String> {
    ["migrate --force", "config:clear", "cache:clear", "config:cache", "up"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_dir: None,
            log_json: false,
            server: ServerSettings::default(),
            project: ProjectSettings::default(),
            default_commands: default_commands(),
            runner: RunnerSettings::default(),
            environments: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file
    pub async fn load(path: &Path) -> Result<Self, DeployerError> {
        let file = File::new(path);
        if !file.exists().await {
            return Err(DeployerError::ConfigError(format!(
                "Settings file not found: {}",
                path.display()
            )));
        }
        file.read_json::<Settings>().await
    }

    /// Look up an environment by name
    pub fn environment(&self, name: &str) -> Option<&EnvironmentSettings> {
        self.environments.get(name)
    }

    /// Look up an environment the client is about to deploy to, checking
    /// that it can reach the receiver
    pub fn client_environment(&self, name: &str) -> Result<&EnvironmentSettings, DeployerError> {
        let env = self
            .environment(name)
            .ok_or_else(|| DeployerError::ConfigError(format!("Invalid environment: {name}")))?;

        if env.remote_base_url.as_deref().map_or(true, str::is_empty) {
            return Err(DeployerError::ConfigError(format!(
                "remote_base_url missing for {name}"
            )));
        }
        if env.token().is_none() {
            return Err(DeployerError::ConfigError(format!(
                "deploy_token missing for {name}"
            )));
        }
        Ok(env)
    }
}

/// Receiver server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Root of the deployed application on this host
    #[serde(default = "default_root")]
    pub target_root: PathBuf,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            target_root: default_root(),
        }
    }
}

/// Local project settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSettings {
    /// Project root
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Exclusion rules for change detection
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Incremental deployment switches
    #[serde(default)]
    pub incremental: IncrementalSettings,
}

fn default_exclude() -> Vec<String> {
    [
        ".git",
        ".env",
        ".env.*",
        "node_modules",
        "tests",
        "storage/logs",
        "storage/framework/cache",
        "storage/framework/sessions",
        "storage/framework/views",
        "*.log",
        "*.map",
        ".DS_Store",
        "Thumbs.db",
        ".idea",
        ".vscode",
        "public/hot",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            root: default_root(),
            exclude: default_exclude(),
            incremental: IncrementalSettings::default(),
        }
    }
}

/// Incremental deployment switches
#[derive(Debug, Clone, Deserialize)]
pub struct IncrementalSettings {
    /// Use the remote metadata to ship only changes
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Allow git history as the change source
    #[serde(default)]
    pub vcs_enabled: bool,
}

impl Default for IncrementalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            vcs_enabled: false,
        }
    }
}

/// Command runner settings
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSettings {
    /// Program and leading arguments every command is appended to
    #[serde(default = "default_runner_program")]
    pub program: Vec<String>,

    /// Per-command timeout in seconds
    #[serde(default = "default_runner_timeout")]
    pub timeout_secs: u64,
}

fn default_runner_program() -> Vec<String> {
    vec!["php".to_string(), "artisan".to_string()]
}

fn default_runner_timeout() -> u64 {
    600
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            program: default_runner_program(),
            timeout_secs: default_runner_timeout(),
        }
    }
}

/// One deployment environment
#[derive(Debug, Default, Deserialize)]
pub struct EnvironmentSettings {
    /// Base URL of the receiver
    #[serde(default)]
    pub remote_base_url: Option<String>,

    /// Shared secret sent in the token header
    #[serde(default)]
    pub deploy_token: Option<SecretString>,

    /// Branch deployed to this environment
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Commands overriding the global defaults
    #[serde(default)]
    pub commands: Option<Vec<String>>,

    /// How packages reach the target
    #[serde(default)]
    pub transport: Option<TransportSettings>,

    /// Timeout for run requests in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_request_timeout() -> u64 {
    300
}

impl EnvironmentSettings {
    /// The configured token, if present and non-empty
    pub fn token(&self) -> Option<&str> {
        self.deploy_token
            .as_ref()
            .map(|token| token.expose_secret())
            .filter(|token| !token.is_empty())
    }

    /// Commands for this environment, falling back to the global defaults
    pub fn commands_or<'a>(&'a self, defaults: &'a [String]) -> &'a [String] {
        self.commands.as_deref().unwrap_or(defaults)
    }
}

/// Package transport configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportSettings {
    /// Target root reachable as a local or mounted directory
    Local { path: PathBuf },

    /// Target host reachable over SSH
    Ssh {
        host: String,
        #[serde(default = "default_ssh_port")]
        port: u16,
        username: String,
        #[serde(default)]
        identity_file: Option<PathBuf>,
        /// Target root on the remote host
        path: String,
    },
}

fn default_ssh_port() -> u16 {
    22
}
