//! The apply pipeline run for every accepted deployment request

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use deploy_api::models::{
    CommandResult, DeleteReport, DeploymentMetadata, DeploymentResult, DeploymentType,
    ExtractionReport, RunRequest,
};
use tracing::{error, info, warn};

use crate::receiver::delete::delete_many;
use crate::receiver::extract::unpack;
use crate::receiver::store::MetadataStore;
use crate::runner::output::sanitize_output;
use crate::runner::parse::parse_command;
use crate::runner::CommandRunner;
use crate::storage::layout::TargetLayout;
use crate::utils::round_secs;

/// Applies packages, deletions and commands to the target root
pub struct DeploymentReceiver {
    layout: TargetLayout,
    store: MetadataStore,
    runner: Arc<dyn CommandRunner>,
}

impl DeploymentReceiver {
    pub fn new(layout: TargetLayout, runner: Arc<dyn CommandRunner>) -> Self {
        let store = MetadataStore::new(layout.clone());
        Self {
            layout,
            store,
            runner,
        }
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Run the pipeline: manual deletions, extraction, deletions recorded in
    /// the package, then `commands` in order. Every step runs regardless of
    /// how the previous one went.
    pub async fn apply(&self, request: &RunRequest, commands: &[String]) -> DeploymentResult {
        let started_at = Utc::now();
        let started = Instant::now();
        info!(
            "Applying deployment for {} ({} commands)",
            request.env,
            commands.len()
        );

        let deletions = if request.delete.is_empty() {
            None
        } else {
            Some(self.delete_many(&request.delete).await)
        };

        let (extraction, auto_deletions) = if request.extract {
            let (report, metadata) = self.extract(request.package_name()).await;
            let auto_deletions = match metadata {
                Some(metadata) if !metadata.deleted_files.is_empty() => {
                    Some(self.delete_many(&metadata.deleted_files).await)
                }
                _ => None,
            };
            (report, auto_deletions)
        } else {
            (ExtractionReport::skipped(), None)
        };

        let commands = self.run_commands(commands).await;

        DeploymentResult {
            success: true,
            environment: request.env.clone(),
            started_at,
            completed_at: Some(Utc::now()),
            deletions,
            auto_deletions,
            extraction,
            commands,
            total_time: round_secs(started.elapsed().as_secs_f64()),
        }
    }

    /// Delete paths relative to the target root
    pub async fn delete_many(&self, paths: &[String]) -> DeleteReport {
        let report = delete_many(&self.layout, paths).await;
        info!(
            "{} ({} skipped, {} failed)",
            report.message,
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    /// Extract the named package and persist its metadata.
    ///
    /// The metadata is only recorded when every entry was written; it is
    /// returned as read back from the store. The archive is removed whatever
    /// the outcome.
    pub async fn extract(&self, package_name: &str) -> (ExtractionReport, Option<DeploymentMetadata>) {
        let started = Instant::now();

        let Some(package) = self.layout.package_file(package_name) else {
            warn!("Refusing package name {}", package_name);
            return (
                ExtractionReport::failed(format!("Invalid package name {package_name}")),
                None,
            );
        };
        if !package.exists().await {
            warn!("Package {} not found", package.path().display());
            return (
                ExtractionReport::failed(format!("Zip file {package_name} not found")),
                None,
            );
        }

        let archive_path = package.path().to_path_buf();
        let root = self.layout.root.clone();
        let unpacked = tokio::task::spawn_blocking(move || unpack(&archive_path, &root)).await;

        if let Err(e) = package.delete().await {
            warn!("Failed to remove package {}: {}", package_name, e);
        }
        self.runner.invalidate_caches().await;

        let unpacked = match unpacked {
            Ok(Ok(unpacked)) => unpacked,
            Ok(Err(e)) => {
                error!("Could not open {}: {}", package_name, e);
                return (
                    ExtractionReport::failed(format!("Could not open {package_name}")),
                    None,
                );
            }
            Err(e) => {
                error!("Extraction of {} aborted: {}", package_name, e);
                return (ExtractionReport::failed("Extraction failed"), None);
            }
        };

        let success = unpacked.errors.is_empty();
        let metadata = match &unpacked.metadata {
            Some(contents) if success => self.persist_metadata(contents).await,
            Some(_) => {
                warn!("Keeping the previous metadata record after a partial extraction");
                None
            }
            None => {
                warn!("Package {} carries no metadata", package_name);
                None
            }
        };

        let deployment_type = metadata
            .as_ref()
            .map(|m| m.deployment_type)
            .or_else(|| {
                unpacked
                    .metadata
                    .as_deref()
                    .and_then(|raw| serde_json::from_slice::<DeploymentMetadata>(raw).ok())
                    .map(|m| m.deployment_type)
            })
            .unwrap_or_default();
        let message = if success {
            format!(
                "{} deployment: {} files",
                capitalized(deployment_type),
                unpacked.total
            )
        } else {
            error!(
                "{} of {} entries failed to extract: {}",
                unpacked.errors.len(),
                unpacked.total,
                unpacked.errors.join(", ")
            );
            "Extraction failed".to_string()
        };
        info!("{}", message);

        let report = ExtractionReport {
            success,
            message,
            deployment_type: Some(deployment_type),
            files_total: unpacked.total,
            files_extracted: unpacked.extracted,
            duration_seconds: round_secs(started.elapsed().as_secs_f64()),
        };
        (report, metadata)
    }

    async fn persist_metadata(&self, contents: &[u8]) -> Option<DeploymentMetadata> {
        let written = match serde_json::from_slice::<DeploymentMetadata>(contents) {
            Ok(metadata) => self.store.write(&metadata).await,
            Err(e) => {
                warn!("Package metadata does not parse, storing it verbatim: {}", e);
                self.store.write_raw(contents).await
            }
        };
        if let Err(e) = written {
            error!("Failed to store metadata: {}", e);
            return None;
        }

        match self.store.read().await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Failed to read back metadata: {}", e);
                None
            }
        }
    }

    /// Run each command in order, isolating failures
    pub async fn run_commands(&self, commands: &[String]) -> Vec<CommandResult> {
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            results.push(self.run_command(command).await);
        }
        results
    }

    async fn run_command(&self, command: &str) -> CommandResult {
        let started = Instant::now();

        let outcome = match parse_command(command) {
            None => Err("Empty command".to_string()),
            Some(spec) => {
                let runner = Arc::clone(&self.runner);
                match tokio::spawn(async move { runner.run(&spec).await }).await {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(e) => Err(format!("Command aborted: {e}")),
                }
            }
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(output) => {
                info!("{} succeeded in {}ms", command, duration_ms);
                CommandResult {
                    command: command.to_string(),
                    success: true,
                    output: sanitize_output(&output),
                    error: None,
                    duration_ms,
                }
            }
            Err(e) => {
                error!("{} failed: {}", command, e);
                CommandResult {
                    command: command.to_string(),
                    success: false,
                    output: String::new(),
                    error: Some(e),
                    duration_ms,
                }
            }
        }
    }
}

fn capitalized(deployment_type: DeploymentType) -> &'static str {
    match deployment_type {
        DeploymentType::Full => "Full",
        DeploymentType::Incremental => "Incremental",
    }
}
