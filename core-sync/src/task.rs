//! Pipeline task types and the on-disk path layout they derive from.

use bridge_traits::storage::{FileId, RemoteFile};
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

const ARCHIVE_EXTENSION: &str = "zip";

/// Local directories the pipeline writes into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    /// Staging directory for downloaded archives
    pub download_dir: PathBuf,
    /// Root under which each archive is extracted
    pub unpack_dir: PathBuf,
}

impl PathLayout {
    pub fn new(download_dir: impl Into<PathBuf>, unpack_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            unpack_dir: unpack_dir.into(),
        }
    }
}

/// Reject names that cannot be used as a single path component.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);

    if invalid {
        Err(SyncError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

/// A remote file moving through the pipeline, with its derived local paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineTask {
    pub file: RemoteFile,
    /// `<download_dir>/<name>.zip`
    pub staging_path: PathBuf,
    /// `<unpack_dir>/<name>`
    pub extraction_dir: PathBuf,
}

impl PipelineTask {
    pub fn new(file: RemoteFile, layout: &PathLayout) -> Result<Self> {
        validate_name(&file.name)?;

        let staging_path = layout
            .download_dir
            .join(format!("{}.{}", file.name, ARCHIVE_EXTENSION));
        let extraction_dir = layout.unpack_dir.join(extraction_name(&staging_path));

        Ok(Self {
            file,
            staging_path,
            extraction_dir,
        })
    }

    pub fn id(&self) -> &FileId {
        &self.file.id
    }

    pub fn name(&self) -> &str {
        &self.file.name
    }
}

/// Basename of the staging archive with the `.zip` suffix removed
fn extraction_name(staging_path: &Path) -> PathBuf {
    let base = staging_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = base
        .strip_suffix(&format!(".{}", ARCHIVE_EXTENSION))
        .unwrap_or(&base);
    PathBuf::from(stem)
}

/// Hand-off from the download stage to the extract stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractJob {
    pub task: PipelineTask,
    /// Complete archive on local disk
    pub archive_path: PathBuf,
}
