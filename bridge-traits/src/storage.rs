//! Remote Storage Abstractions
//!
//! Types and the gateway trait describing the watched remote collection and the
//! server-side archive jobs used to fetch files from it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Opaque identifier of a file in the remote collection.
///
/// Stable and unique within the collection. Providers with numeric ids render
/// them to strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for FileId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for FileId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifier of a server-side archive job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchiveJobId(String);

impl ArchiveJobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchiveJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ArchiveJobId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// Snapshot of a file in the remote collection.
///
/// Produced by [`RemoteGateway::list_root_files`]; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: FileId,
    pub name: String,
}

impl RemoteFile {
    pub fn new(id: impl Into<FileId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Observed state of a server-side archive job.
///
/// The job is pending while `download_url` is `None` and ready once the
/// remote service publishes a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveJob {
    pub id: ArchiveJobId,
    pub download_url: Option<String>,
}

impl ArchiveJob {
    pub fn pending(id: ArchiveJobId) -> Self {
        Self {
            id,
            download_url: None,
        }
    }

    pub fn ready(id: ArchiveJobId, url: impl Into<String>) -> Self {
        Self {
            id,
            download_url: Some(url.into()),
        }
    }
}

/// Gateway to the remote storage and archival service
///
/// Each call performs exactly one logical remote operation. Retry, polling and
/// timeout policy belong to the caller; cancellation is expressed by dropping
/// the returned future.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::RemoteGateway;
///
/// async fn count(gateway: &dyn RemoteGateway) -> Result<usize> {
///     Ok(gateway.list_root_files().await?.len())
/// }
/// ```
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// List the files in the watched root collection
    async fn list_root_files(&self) -> Result<Vec<RemoteFile>>;

    /// Housekeeping: clear finished or stale transfer jobs on the remote side
    async fn clean_stale_transfers(&self) -> Result<()>;

    /// Ask the remote service to package a file into a downloadable archive
    async fn create_archive(&self, file_id: &FileId) -> Result<ArchiveJobId>;

    /// Fetch the current state of an archive job
    async fn get_archive_status(&self, job_id: &ArchiveJobId) -> Result<ArchiveJob>;

    /// Delete a file from the remote collection
    async fn delete_remote_file(&self, file_id: &FileId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_id_from_numeric() {
        let id = FileId::from(1234_i64);
        assert_eq!(id.as_str(), "1234");
        assert_eq!(id.to_string(), "1234");
    }

    #[test]
    fn test_file_id_serializes_transparently() {
        let file = RemoteFile::new("42", "movie");
        let json = serde_json::to_string(&file).unwrap();
        assert_eq!(json, r#"{"id":"42","name":"movie"}"#);
    }

    #[test]
    fn test_archive_job_readiness() {
        let pending = ArchiveJob::pending(ArchiveJobId::from(7_i64));
        assert_eq!(pending.download_url, None);

        let ready = ArchiveJob::ready(ArchiveJobId::from(7_i64), "https://example.com/a.zip");
        assert_eq!(ready.download_url.as_deref(), Some("https://example.com/a.zip"));
        assert_eq!(ready.id.as_str(), "7");
    }
}
