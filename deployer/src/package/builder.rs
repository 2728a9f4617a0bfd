//! Deployment package creation

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, Timelike, Utc};
use deploy_api::models::{DependencyRecord, DeploymentMetadata, METADATA_FILE};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime as ZipDateTime, ZipWriter};

use crate::errors::DeployerError;
use crate::filesys::walk::{relative_path, walk, WalkEntry};
use crate::storage::layout::{ProjectLayout, BOOTSTRAP_DIRS};
use crate::sync::changeset::ChangeSet;
use crate::utils::sha256_file_if_exists;

/// What ended up in a built package
#[derive(Debug, Clone)]
pub struct PackageSummary {
    /// Archive location
    pub path: PathBuf,

    /// File entries written, excluding the metadata entry
    pub files: usize,

    /// Directory entries written
    pub directories: usize,

    /// Archive size in bytes
    pub size_bytes: u64,

    /// Listed paths that were not packaged
    pub skipped: Vec<String>,

    /// The metadata embedded in the archive
    pub metadata: DeploymentMetadata,
}

/// Builds deployment packages from a change set
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    layout: ProjectLayout,
    environment: String,
}

impl PackageBuilder {
    pub fn new(layout: ProjectLayout, environment: impl Into<String>) -> Self {
        Self {
            layout,
            environment: environment.into(),
        }
    }

    /// Build the package at `output` on the blocking pool
    pub async fn build(
        &self,
        change_set: &ChangeSet,
        output: &Path,
    ) -> Result<PackageSummary, DeployerError> {
        let builder = self.clone();
        let change_set = change_set.clone();
        let output = output.to_path_buf();
        tokio::task::spawn_blocking(move || builder.build_blocking(&change_set, &output)).await?
    }

    /// Build the package at `output`
    pub fn build_blocking(
        &self,
        change_set: &ChangeSet,
        output: &Path,
    ) -> Result<PackageSummary, DeployerError> {
        let started = std::time::Instant::now();
        let (entries, mut skipped) = self.collect_entries(change_set)?;

        let file = fs::File::create(output).map_err(|e| {
            DeployerError::PackageError(format!(
                "Failed to create package {}: {}",
                output.display(),
                e
            ))
        })?;
        let mut zip = ZipWriter::new(file);

        let mut files = 0;
        let mut directories = 0;
        for entry in &entries {
            let meta = match fs::metadata(&entry.path) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Skipping {}: {}", entry.relative, e);
                    skipped.push(entry.relative.clone());
                    continue;
                }
            };
            // links are followed, so the target decides the entry kind
            let is_dir = meta.is_dir();
            let options = entry_options(&meta, is_dir);

            if is_dir {
                zip.add_directory(entry.relative.as_str(), options)?;
                directories += 1;
                continue;
            }

            let mut source = match fs::File::open(&entry.path) {
                Ok(source) => source,
                Err(e) => {
                    warn!("Skipping {}: {}", entry.relative, e);
                    skipped.push(entry.relative.clone());
                    continue;
                }
            };
            zip.start_file(entry.relative.as_str(), options)?;
            if let Err(e) = io::copy(&mut source, &mut zip) {
                warn!("Skipping {}: {}", entry.relative, e);
                zip.abort_file()?;
                skipped.push(entry.relative.clone());
                continue;
            }
            files += 1;
        }

        let metadata = self.metadata(change_set, files);
        let contents = serde_json::to_vec_pretty(&metadata)?;
        zip.start_file(
            METADATA_FILE,
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
        )?;
        zip.write_all(&contents)?;
        zip.finish()?;

        let size_bytes = fs::metadata(output).map(|m| m.len()).unwrap_or_default();
        info!(
            "Built {} package: {} files, {} directories, {} skipped in {:.2}s",
            metadata.deployment_type,
            files,
            directories,
            skipped.len(),
            started.elapsed().as_secs_f64()
        );

        Ok(PackageSummary {
            path: output.to_path_buf(),
            files,
            directories,
            size_bytes,
            skipped,
            metadata,
        })
    }

    /// Metadata describing a package built from `change_set`
    pub fn metadata(&self, change_set: &ChangeSet, files: usize) -> DeploymentMetadata {
        DeploymentMetadata {
            environment: self.environment.clone(),
            deployed_at: Utc::now(),
            deployment_type: change_set.deployment_type(),
            deployed_files_count: files,
            deleted_files: change_set.deleted.iter().cloned().collect(),
            vcs: Some(change_set.vcs_record()),
            dependencies: Some(DependencyRecord {
                manifest_hash: sha256_file_if_exists(&self.layout.manifest_file()),
                lock_hash: sha256_file_if_exists(&self.layout.lock_file()),
                vendor_included: change_set.include_vendor,
            }),
            files: change_set.current_hashes.clone(),
        }
    }

    /// Entries to package, in order and without duplicates, plus the listed
    /// paths that no longer exist
    fn collect_entries(
        &self,
        change_set: &ChangeSet,
    ) -> Result<(Vec<WalkEntry>, Vec<String>), DeployerError> {
        let root = &self.layout.root;
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        let mut skipped = Vec::new();

        let mut push = |entry: WalkEntry| {
            if entry.relative != METADATA_FILE && seen.insert(entry.relative.clone()) {
                entries.push(entry);
            }
        };

        for relative in change_set.shipped_paths() {
            let path = self.layout.resolve(relative);
            match fs::symlink_metadata(&path) {
                Ok(meta) => push(WalkEntry {
                    relative: relative.clone(),
                    is_dir: meta.is_dir(),
                    path,
                }),
                Err(_) => {
                    warn!("Skipping {}: source no longer exists", relative);
                    skipped.push(relative.clone());
                }
            }
        }

        if change_set.include_vendor {
            let vendor = self.layout.dependency_dir();
            if vendor.is_dir() {
                debug!("Including dependency directory");
                for entry in walk(&vendor, None) {
                    let entry = entry?;
                    if entry.is_dir {
                        continue;
                    }
                    if entry.path.is_dir() {
                        for linked in linked_tree(root, &entry)? {
                            if !linked.is_dir {
                                push(linked);
                            }
                        }
                        continue;
                    }
                    push(WalkEntry {
                        relative: relative_path(root, &entry.path),
                        ..entry
                    });
                }
            }
        }

        if change_set.include_bootstrap_dirs {
            for dir in BOOTSTRAP_DIRS {
                let path = self.layout.resolve(dir);
                if !path.is_dir() {
                    continue;
                }
                debug!("Including {} verbatim", dir);
                push(WalkEntry {
                    relative: dir.to_string(),
                    path: path.clone(),
                    is_dir: true,
                });
                for entry in walk(&path, None) {
                    let entry = entry?;
                    let linked_dir = !entry.is_dir && entry.path.is_dir();
                    let linked = if linked_dir {
                        linked_tree(root, &entry)?
                    } else {
                        Vec::new()
                    };
                    push(WalkEntry {
                        relative: relative_path(root, &entry.path),
                        ..entry
                    });
                    linked.into_iter().for_each(&mut push);
                }
            }
        }

        Ok((entries, skipped))
    }
}

/// Everything below a symlinked directory, listed under the link's own path.
/// Links nested inside are not expanded again.
fn linked_tree(root: &Path, link: &WalkEntry) -> Result<Vec<WalkEntry>, DeployerError> {
    debug!("Following linked directory {}", link.relative);
    walk(&link.path, None)
        .map(|entry| {
            let entry = entry?;
            Ok(WalkEntry {
                relative: relative_path(root, &entry.path),
                ..entry
            })
        })
        .collect()
}

fn entry_options(meta: &fs::Metadata, is_dir: bool) -> SimpleFileOptions {
    let mut options = SimpleFileOptions::default()
        .compression_method(if is_dir {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        })
        .large_file(meta.len() > 0xffff_ffff);

    if let Some(time) = modified_time(meta) {
        options = options.last_modified_time(time);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options = options.unix_permissions(meta.permissions().mode() & 0o7777);
    }

    options
}

fn modified_time(meta: &fs::Metadata) -> Option<ZipDateTime> {
    let modified: chrono::DateTime<Local> = meta.modified().ok()?.into();
    ZipDateTime::from_date_and_time(
        u16::try_from(modified.year()).ok()?,
        modified.month() as u8,
        modified.day() as u8,
        modified.hour() as u8,
        modified.minute() as u8,
        modified.second() as u8,
    )
    .ok()
}
