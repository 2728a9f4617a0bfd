//! Deployer - Entry Point
//!
//! Ships a project tree to a remote target incrementally, and runs the
//! receiver that applies the shipped packages on the target.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use deployer::app::deploy::deploy;
use deployer::app::logs::show_logs;
use deployer::app::options::{CommandOptions, DeployOptions, LogsMode, LogsOptions};
use deployer::app::remote_cmd::run_commands;
use deployer::app::render::{print_command_report, print_deploy_report};
use deployer::errors::DeployerError;
use deployer::logs::{init_logging, LogLevel, LogOptions};
use deployer::receiver::pipeline::DeploymentReceiver;
use deployer::runner::process::ProcessRunner;
use deployer::server::serve::serve;
use deployer::server::state::ServerState;
use deployer::storage::layout::TargetLayout;
use deployer::storage::settings::{Settings, DEFAULT_SETTINGS_FILE};
use deployer::utils::version_info;
use deploy_api::models::{DEFAULT_ENVIRONMENT, DEFAULT_PACKAGE_NAME};

use tracing::{error, info, warn};

const USAGE: &str = "\
Usage: deployer <command> [--config=<path>] [--env=<name>] [options]

Commands:
  serve                      Run the receiver on the target host
  deploy                     Ship the local project
      --full                 Ignore the remote record and ship everything
      --init                 First deployment: bootstrap directories, no commands
      --skip-upload          Apply a package that is already on the target
      --zipname=<name>       Package name on the target (deploy.zip)
      --delete=<a,b,...>     Extra paths to delete on the target
  cmd <command>...           Run commands on the target without deploying
      --cmd=<a;b;...>        Commands as a single option
  logs                       Read a log from the target's storage/logs
      --path=<file>          Log file (laravel.log)
      --tail=<n>             Lines to show (100)
      --watch                Follow new lines until interrupted
      --download             Save a local copy
  version                    Print version information";

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();
    let mut positional: Vec<String> = Vec::new();

    for arg in args.iter().skip(1) {
        if let Some(flag) = arg.strip_prefix("--") {
            match flag.split_once('=') {
                // Handle --key=value format
                Some((key, value)) => cli_args.insert(key.to_string(), value.to_string()),
                // Handle standalone flags like --full
                None => cli_args.insert(flag.to_string(), "true".to_string()),
            };
        } else {
            positional.push(arg.clone());
        }
    }

    let command = positional.first().cloned().unwrap_or_default();
    let rest = positional.get(1..).unwrap_or_default();

    // Print version and exit
    if command == "version" || cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{version}"),
            Err(e) => eprintln!("Failed to render version info: {e}"),
        }
        return ExitCode::SUCCESS;
    }

    if !matches!(command.as_str(), "serve" | "deploy" | "cmd" | "logs") {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    }

    // Retrieve the settings file
    let settings_file = cli_args
        .get("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let settings = match Settings::load(&settings_file).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let log_level = match cli_args.get("log-level").map(|level| level.parse::<LogLevel>()) {
        Some(Ok(level)) => level,
        Some(Err(e)) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
        None => settings.log_level.clone(),
    };
    let log_options = LogOptions {
        log_level,
        log_dir: settings.log_dir.clone(),
        json_format: settings.log_json,
        ..Default::default()
    };
    if let Err(e) = init_logging(log_options) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let environment = cli_args
        .get("env")
        .cloned()
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

    let result = match command.as_str() {
        "serve" => run_server(settings).await,
        "deploy" => {
            let options = DeployOptions {
                environment,
                full: cli_args.contains_key("full"),
                bootstrap: cli_args.contains_key("init"),
                skip_upload: cli_args.contains_key("skip-upload"),
                package_name: cli_args
                    .get("zipname")
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_PACKAGE_NAME.to_string()),
                delete: split_list(cli_args.get("delete"), ','),
            };
            deploy(&settings, &options).await.map(|report| {
                print_deploy_report(&report);
                report.succeeded()
            })
        }
        "cmd" => {
            let mut commands = split_list(cli_args.get("cmd"), ';');
            commands.extend(rest.iter().cloned());
            let options = CommandOptions {
                environment,
                commands,
            };
            run_commands(&settings, &options).await.map(|report| {
                print_command_report(&report);
                report.succeeded()
            })
        }
        _ => match logs_options(&cli_args, environment) {
            Ok(options) => show_logs(&settings, &options, await_shutdown_signal())
                .await
                .map(|_| true),
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{} failed: {}", command, e);
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the receiver until a shutdown signal arrives
async fn run_server(settings: Settings) -> Result<bool, DeployerError> {
    let settings = Arc::new(settings);
    let target = TargetLayout::new(&settings.server.target_root);
    if !target.root_dir().exists().await {
        return Err(DeployerError::ConfigError(format!(
            "Target root does not exist: {}",
            target.root.display()
        )));
    }

    let runner = Arc::new(ProcessRunner::new(&settings.runner, &target.root));
    let receiver = Arc::new(DeploymentReceiver::new(target, runner));
    let state = Arc::new(ServerState::new(settings.clone(), receiver));

    info!(
        "Serving {} environment(s): {}",
        settings.environments.len(),
        settings
            .environments
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    );
    let handle = serve(&settings.server, state, await_shutdown_signal()).await?;
    handle.await??;
    info!("Receiver stopped");
    Ok(true)
}

fn logs_options(
    cli_args: &HashMap<String, String>,
    environment: String,
) -> Result<LogsOptions, DeployerError> {
    let defaults = LogsOptions::default();
    let mode = if cli_args.contains_key("download") {
        LogsMode::Download
    } else if cli_args.contains_key("watch") {
        LogsMode::Watch
    } else {
        LogsMode::Tail
    };
    let lines = match cli_args.get("tail") {
        Some(tail) => tail
            .parse()
            .map_err(|_| DeployerError::ValidationError(format!("Invalid --tail value: {tail}")))?,
        None => defaults.lines,
    };

    Ok(LogsOptions {
        environment,
        file: cli_args.get("path").cloned().unwrap_or(defaults.file.clone()),
        mode,
        lines,
        ..defaults
    })
}

fn split_list(value: Option<&String>, separator: char) -> Vec<String> {
    value
        .map(|value| {
            value
                .split(separator)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("SIGTERM received, shutting down...");
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Ctrl+C received, shutting down...");
                    }
                }
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Ctrl+C received, shutting down..."),
                    Err(_) => std::future::pending::<()>().await,
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received, shutting down..."),
            Err(e) => {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}
