//! Package extraction into the target root

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use deploy_api::models::{LEGACY_METADATA_FILE, METADATA_FILE};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::errors::DeployerError;

/// Result of unpacking one archive
#[derive(Debug, Default)]
pub struct Unpacked {
    /// Entries in the archive, the metadata entry included
    pub total: usize,

    /// Entries written or accounted for
    pub extracted: usize,

    /// Entries that could not be written
    pub errors: Vec<String>,

    /// Raw bytes of the metadata entry, which is not written to disk here
    pub metadata: Option<Vec<u8>>,
}

/// Unpack every entry of `archive_path` into `root`, overwriting existing
/// files.
///
/// Entries whose names escape `root` are refused. Failing to open the
/// archive is an error; per-entry failures are collected in the result.
pub fn unpack(archive_path: &Path, root: &Path) -> Result<Unpacked, DeployerError> {
    let file = fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut unpacked = Unpacked {
        total: archive.len(),
        ..Default::default()
    };

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                unpacked.errors.push(format!("entry {index}: {e}"));
                continue;
            }
        };
        let name = entry.name().to_string();

        let Some(relative) = entry.enclosed_name() else {
            warn!("Refusing unsafe entry {}", name);
            unpacked.errors.push(format!("{name}: unsafe path"));
            continue;
        };

        if relative == Path::new(METADATA_FILE) || relative == Path::new(LEGACY_METADATA_FILE) {
            let mut contents = Vec::new();
            match entry.read_to_end(&mut contents) {
                Ok(_) => {
                    unpacked.metadata = Some(contents);
                    unpacked.extracted += 1;
                }
                Err(e) => unpacked.errors.push(format!("{name}: {e}")),
            }
            continue;
        }

        let out_path = root.join(&relative);
        let result = if entry.is_dir() {
            fs::create_dir_all(&out_path)
        } else {
            let mode = entry.unix_mode();
            write_entry(&mut entry, mode, &out_path)
        };

        match result {
            Ok(()) => {
                debug!("Extracted {}", name);
                unpacked.extracted += 1;
            }
            Err(e) => {
                warn!("Failed to extract {}: {}", name, e);
                unpacked.errors.push(format!("{name}: {e}"));
            }
        }
    }

    Ok(unpacked)
}

fn write_entry(entry: &mut impl Read, mode: Option<u32>, out_path: &Path) -> io::Result<()> {
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    // replace rather than write through an existing symlink
    if fs::symlink_metadata(out_path).is_ok_and(|meta| meta.file_type().is_symlink()) {
        fs::remove_file(out_path)?;
    }

    let mut outfile = fs::File::create(out_path)?;
    io::copy(entry, &mut outfile)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = mode {
            let _ = fs::set_permissions(out_path, fs::Permissions::from_mode(mode & 0o7777));
        }
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(())
}
