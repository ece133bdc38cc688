//! Local Archive I/O Abstractions
//!
//! The two local primitives the download pipeline relies on: streaming a
//! remote archive to disk and unpacking it into a sandboxed directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Summary of a completed extraction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Directory the archive was unpacked into
    pub destination: PathBuf,
    /// Number of regular files written
    pub files: usize,
    /// Number of directories created from explicit directory entries
    pub directories: usize,
    /// Total uncompressed bytes written
    pub bytes: u64,
}

/// Streams a remote resource to a local file
///
/// Implementations must never leave a partially written file at `dest`: the
/// file either holds the complete download or does not exist.
#[async_trait]
pub trait ArchiveDownloader: Send + Sync {
    /// Download `url` to `dest`, returning the number of bytes written
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Cancelled`](crate::BridgeError::Cancelled) when
    /// `cancel` fires mid-transfer.
    async fn download_to_path(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64>;
}

/// Extracts an archive into a destination directory
///
/// Implementations must reject any entry whose resolved output path would fall
/// outside `dest` with
/// [`BridgeError::UnsafeArchiveEntry`](crate::BridgeError::UnsafeArchiveEntry)
/// and must not write anything outside `dest`.
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    async fn extract_archive(
        &self,
        archive: &Path,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<ExtractionReport>;
}
