//! Zip extraction with path containment
//!
//! Every entry name is resolved against the destination before a single byte
//! is written. An archive with even one escaping entry is rejected as a whole,
//! so a hostile archive leaves the filesystem untouched.

use async_trait::async_trait;
use bridge_traits::{
    archive::{ArchiveExtractor, ExtractionReport},
    error::{BridgeError, Result},
};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use zip::ZipArchive;

/// Resolve an archive entry name to a path inside `dest`.
///
/// `..` may only climb back out of directories the entry itself descended
/// into. Absolute paths, drive prefixes and anything that would step above
/// `dest` yield [`BridgeError::UnsafeArchiveEntry`]. Backslashes are treated
/// as separators since Windows tools emit them.
pub fn resolve_entry_path(dest: &Path, entry_name: &str) -> Result<PathBuf> {
    let unsafe_entry = || BridgeError::UnsafeArchiveEntry {
        entry: entry_name.to_string(),
    };

    let normalized = entry_name.replace('\\', "/");
    if normalized.contains('\0') {
        return Err(unsafe_entry());
    }

    let mut relative = PathBuf::new();
    let mut depth = 0usize;
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => {
                relative.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(unsafe_entry());
                }
                relative.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return Err(unsafe_entry()),
        }
    }

    Ok(dest.join(relative))
}

/// Planned output for one archive entry
struct PlannedEntry {
    index: usize,
    target: PathBuf,
    is_dir: bool,
    mode: Option<u32>,
}

/// [`ArchiveExtractor`] for zip archives
///
/// Decompression is blocking work and runs on tokio's blocking pool.
#[derive(Debug, Default, Clone)]
pub struct ZipArchiveExtractor;

impl ZipArchiveExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_blocking(
        archive_path: &Path,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<ExtractionReport> {
        let file = fs::File::open(archive_path)?;
        let mut archive = ZipArchive::new(file).map_err(map_zip_error)?;

        // Validate everything up front; nothing is written for a hostile archive.
        let mut plan = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index(index).map_err(map_zip_error)?;
            let target = resolve_entry_path(dest, entry.name())?;
            if target == dest {
                continue;
            }
            plan.push(PlannedEntry {
                index,
                target,
                is_dir: entry.is_dir(),
                mode: entry.unix_mode(),
            });
        }

        fs::create_dir_all(dest)?;
        let mut report = ExtractionReport {
            destination: dest.to_path_buf(),
            ..ExtractionReport::default()
        };

        for planned in plan {
            if cancel.is_cancelled() {
                return Err(BridgeError::Cancelled);
            }

            if planned.is_dir {
                fs::create_dir_all(&planned.target)?;
                report.directories += 1;
                continue;
            }

            if let Some(parent) = planned.target.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut entry = archive.by_index(planned.index).map_err(map_zip_error)?;
            let mut output = fs::File::create(&planned.target)?;
            report.bytes += io::copy(&mut entry, &mut output)?;
            report.files += 1;

            if let Some(mode) = planned.mode {
                apply_mode(&planned.target, mode)?;
            }
        }

        Ok(report)
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = mode & 0o777;
    if permissions == 0 {
        return Ok(());
    }
    fs::set_permissions(path, fs::Permissions::from_mode(permissions))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

fn map_zip_error(error: zip::result::ZipError) -> BridgeError {
    match error {
        zip::result::ZipError::Io(io_error) => BridgeError::Io(io_error),
        other => BridgeError::InvalidArchive(other.to_string()),
    }
}

#[async_trait]
impl ArchiveExtractor for ZipArchiveExtractor {
    #[instrument(skip(self, cancel), fields(archive = %archive.display(), dest = %dest.display()))]
    async fn extract_archive(
        &self,
        archive: &Path,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<ExtractionReport> {
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();
        let cancel = cancel.clone();

        let report = tokio::task::spawn_blocking(move || {
            Self::extract_blocking(&archive, &dest, &cancel)
        })
        .await
        .map_err(|e| BridgeError::OperationFailed(format!("Extraction task failed: {}", e)))??;

        debug!(
            files = report.files,
            directories = report.directories,
            bytes = report.bytes,
            "Archive extracted"
        );
        Ok(report)
    }
}
