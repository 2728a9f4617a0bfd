//! Client workflows driven from the command line

pub mod deploy;
pub mod logs;
pub mod options;
pub mod remote_cmd;
pub mod render;

use std::time::Duration;

use deploy_api::models::{CommandResult, RunRequest};
use secrecy::SecretString;
use tracing::{info, warn};

use crate::errors::DeployerError;
use crate::http::client::DeployerApiClient;
use crate::storage::settings::{EnvironmentSettings, TransportSettings};
use crate::transport::Transport;

/// Build the receiver client for a validated environment
pub fn api_client(
    name: &str,
    env: &EnvironmentSettings,
) -> Result<DeployerApiClient, DeployerError> {
    let base_url = env
        .remote_base_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .ok_or_else(|| DeployerError::ConfigError(format!("remote_base_url missing for {name}")))?;
    let token = env
        .token()
        .ok_or_else(|| DeployerError::ConfigError(format!("deploy_token missing for {name}")))?;

    DeployerApiClient::new(
        base_url,
        name,
        SecretString::from(token.to_string()),
        Duration::from_secs(env.request_timeout_secs),
    )
}

/// Transport settings of an environment, required for anything that moves files
pub fn transport_settings<'a>(
    name: &str,
    env: &'a EnvironmentSettings,
) -> Result<&'a TransportSettings, DeployerError> {
    env.transport
        .as_ref()
        .ok_or_else(|| DeployerError::ConfigError(format!("No transport configured for {name}")))
}

/// Release a transport session, logging instead of failing
pub async fn close_transport(transport: &dyn Transport) {
    if let Err(e) = transport.close().await {
        warn!("Failed to close transport session: {}", e);
    }
}

/// Run one command on the receiver without extracting anything.
///
/// A failed request is reported as a failed command so callers can carry on
/// with the next one.
pub async fn run_remote_command(
    client: &DeployerApiClient,
    environment: &str,
    package_name: &str,
    command: &str,
) -> CommandResult {
    info!("Running {} on {}", command, environment);
    let request = RunRequest {
        env: environment.to_string(),
        commands: Some(vec![command.to_string()]),
        zipname: Some(package_name.to_string()),
        delete: Vec::new(),
        extract: false,
    };

    match client.run(&request).await {
        Ok(result) => result
            .commands
            .into_iter()
            .next()
            .unwrap_or_else(|| failed_command(command, "No command result returned".to_string())),
        Err(e) => failed_command(command, e.to_string()),
    }
}

fn failed_command(command: &str, error: String) -> CommandResult {
    CommandResult {
        command: command.to_string(),
        success: false,
        output: String::new(),
        error: Some(error),
        duration_ms: 0,
    }
}
