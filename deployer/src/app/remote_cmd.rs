//! Run commands on the target without deploying

use std::time::Instant;

use deploy_api::models::{CommandResult, DEFAULT_PACKAGE_NAME};
use tracing::info;

use crate::app::options::CommandOptions;
use crate::app::{api_client, run_remote_command};
use crate::errors::DeployerError;
use crate::storage::settings::Settings;
use crate::utils::round_secs;

#[derive(Debug)]
pub struct CommandReport {
    pub environment: String,
    pub endpoint: String,
    pub commands: Vec<CommandResult>,
    pub total_time: f64,
}

impl CommandReport {
    pub fn succeeded(&self) -> bool {
        self.commands.iter().all(|c| c.success)
    }
}

/// Run `options.commands` one request at a time, carrying on past failures
pub async fn run_commands(
    settings: &Settings,
    options: &CommandOptions,
) -> Result<CommandReport, DeployerError> {
    if options.commands.iter().all(|c| c.trim().is_empty()) {
        return Err(DeployerError::ValidationError(
            "No commands specified".to_string(),
        ));
    }

    let started = Instant::now();
    let name = options.environment.as_str();
    let env = settings.client_environment(name)?;
    let client = api_client(name, env)?;
    info!("Running {} command(s) on {}", options.commands.len(), name);

    let mut commands = Vec::with_capacity(options.commands.len());
    for command in options.commands.iter().filter(|c| !c.trim().is_empty()) {
        commands.push(run_remote_command(&client, name, DEFAULT_PACKAGE_NAME, command).await);
    }

    Ok(CommandReport {
        environment: name.to_string(),
        endpoint: client.run_url(),
        commands,
        total_time: round_secs(started.elapsed().as_secs_f64()),
    })
}
