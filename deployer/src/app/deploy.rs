//! Client deployment workflow

use std::sync::Arc;
use std::time::Instant;

use deploy_api::models::{CommandResult, DeploymentResult, RunRequest};
use tracing::{error, info, warn};

use crate::app::options::DeployOptions;
use crate::app::{api_client, close_transport, run_remote_command, transport_settings};
use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::http::client::DeployerApiClient;
use crate::package::builder::{PackageBuilder, PackageSummary};
use crate::storage::layout::{is_plain_file_name, ProjectLayout};
use crate::storage::settings::{Settings, TransportSettings};
use crate::sync::changeset::{ChangeSet, ChangeSetResolver, PreviousDeployment};
use crate::sync::filter::PathFilter;
use crate::sync::snapshot::LocalTree;
use crate::sync::vcs::GitRepository;
use crate::transport::connect;
use crate::utils::round_secs;

/// Everything one deployment did
#[derive(Debug)]
pub struct DeployReport {
    pub environment: String,
    pub change_set: ChangeSet,
    pub package: PackageSummary,
    pub uploaded: bool,

    /// Response to the extraction call
    pub apply: DeploymentResult,

    /// One result per command, in order. Empty when extraction failed or in
    /// bootstrap mode.
    pub commands: Vec<CommandResult>,

    /// Wall time in seconds
    pub total_time: f64,
}

impl DeployReport {
    /// Extraction succeeded and so did every command
    pub fn succeeded(&self) -> bool {
        self.apply.extraction.success && self.commands.iter().all(|c| c.success)
    }
}

/// Deploy the local project to `options.environment`
pub async fn deploy(
    settings: &Settings,
    options: &DeployOptions,
) -> Result<DeployReport, DeployerError> {
    let started = Instant::now();
    let name = options.environment.as_str();
    let env = settings.client_environment(name)?;
    if !is_plain_file_name(&options.package_name) {
        return Err(DeployerError::ValidationError(format!(
            "Invalid package name {}",
            options.package_name
        )));
    }
    let transport = if options.skip_upload {
        None
    } else {
        Some(transport_settings(name, env)?)
    };
    let client = api_client(name, env)?;

    let previous = if options.bootstrap {
        info!("Bootstrap mode, shipping the whole tree");
        None
    } else if options.full {
        info!("Forcing a full deployment");
        None
    } else if !settings.project.incremental.enabled {
        info!("Incremental deployment disabled, shipping the whole tree");
        None
    } else {
        fetch_previous(&client).await?
    };

    let layout = ProjectLayout::new(&settings.project.root);
    let filter = PathFilter::new(&settings.project.exclude)?;
    let resolver = ChangeSetResolver::new(
        Arc::new(LocalTree::new(layout.clone())),
        filter,
        Arc::new(GitRepository::new(
            &layout.root,
            settings.project.incremental.vcs_enabled,
        )),
    );
    let change_set = resolver.resolve(previous.as_ref(), options.bootstrap).await?;
    if change_set.is_empty() {
        info!("No file changes detected, refreshing the deployment record only");
    }

    let staging = Dir::create_temp_dir("deployer").await?;
    let result = ship(
        &client,
        name,
        options,
        transport,
        PackageBuilder::new(layout, name),
        &change_set,
        &staging,
    )
    .await;
    if let Err(e) = staging.delete().await {
        warn!("Failed to remove {}: {}", staging.path().display(), e);
    }
    let (package, apply) = result?;

    let commands = if !apply.extraction.success {
        error!("Extraction failed, skipping commands: {}", apply.extraction.message);
        Vec::new()
    } else if options.bootstrap {
        info!("Bootstrap deployment, commands skipped");
        Vec::new()
    } else {
        let mut results = Vec::new();
        for command in env.commands_or(&settings.default_commands) {
            results.push(run_remote_command(&client, name, &options.package_name, command).await);
        }
        results
    };

    Ok(DeployReport {
        environment: name.to_string(),
        change_set,
        uploaded: transport.is_some(),
        package,
        apply,
        commands,
        total_time: round_secs(started.elapsed().as_secs_f64()),
    })
}

/// Last deployment as recorded by the receiver. Any failure other than a
/// rejected token falls back to a full deployment.
async fn fetch_previous(
    client: &DeployerApiClient,
) -> Result<Option<PreviousDeployment>, DeployerError> {
    match client.fetch_metadata().await {
        Ok(response) => {
            let previous = PreviousDeployment::from_response(response);
            if previous.is_none() {
                info!("No previous deployment found");
            }
            Ok(previous)
        }
        Err(e @ DeployerError::AuthError(_)) => Err(e),
        Err(e) => {
            warn!("Could not fetch remote metadata, shipping the whole tree: {}", e);
            Ok(None)
        }
    }
}

/// Build, upload and extract
async fn ship(
    client: &DeployerApiClient,
    environment: &str,
    options: &DeployOptions,
    transport: Option<&TransportSettings>,
    builder: PackageBuilder,
    change_set: &ChangeSet,
    staging: &Dir,
) -> Result<(PackageSummary, DeploymentResult), DeployerError> {
    let output = staging.file(&options.package_name);
    let package = builder.build(change_set, output.path()).await?;

    if let Some(settings) = transport {
        let session = connect(settings).await?;
        let uploaded = session.upload(&package.path, &options.package_name).await;
        close_transport(session.as_ref()).await;
        uploaded?;
        info!("Uploaded {} to {}", options.package_name, environment);
    }

    let request = RunRequest {
        env: environment.to_string(),
        commands: Some(Vec::new()),
        zipname: Some(options.package_name.clone()),
        delete: options.delete.clone(),
        extract: true,
    };
    let apply = client.run(&request).await?;
    info!("{}", apply.extraction.message);

    Ok((package, apply))
}
