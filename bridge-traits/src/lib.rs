//! # Host Bridge Traits
//!
//! Collaborator contracts that the sync core depends on.
//!
//! ## Overview
//!
//! The sync pipeline never talks to put.io, the network or the archive format
//! directly. Everything it needs from the outside world is expressed here as a
//! trait, and concrete adapters live in `bridge-desktop` and `provider-putio`.
//!
//! ## Traits
//!
//! ### Remote
//! - [`RemoteGateway`](storage::RemoteGateway) - List, archive, poll and delete
//!   files in the watched remote collection
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations
//! - [`ArchiveDownloader`](archive::ArchiveDownloader) - Stream a URL to a local path
//! - [`ArchiveExtractor`](archive::ArchiveExtractor) - Unpack an archive with
//!   path containment
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Adapters
//! should convert their own errors into it and keep the message actionable
//! (include the file id, URL or path involved).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds so a single adapter instance
//! can be shared by every stage worker.
//!
//! ## Examples
//!
//! ### Implementing RemoteGateway
//!
//! ```ignore
//! use bridge_traits::storage::{ArchiveJob, ArchiveJobId, FileId, RemoteFile, RemoteGateway};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyGateway;
//!
//! #[async_trait]
//! impl RemoteGateway for MyGateway {
//!     async fn list_root_files(&self) -> Result<Vec<RemoteFile>> { todo!() }
//!     async fn clean_stale_transfers(&self) -> Result<()> { todo!() }
//!     async fn create_archive(&self, file_id: &FileId) -> Result<ArchiveJobId> { todo!() }
//!     async fn get_archive_status(&self, job_id: &ArchiveJobId) -> Result<ArchiveJob> { todo!() }
//!     async fn delete_remote_file(&self, file_id: &FileId) -> Result<()> { todo!() }
//! }
//! ```

pub mod archive;
pub mod error;
pub mod http;
pub mod storage;

pub use error::BridgeError;

// Re-export commonly used types
pub use archive::{ArchiveDownloader, ArchiveExtractor, ExtractionReport};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{ArchiveJob, ArchiveJobId, FileId, RemoteFile, RemoteGateway};
