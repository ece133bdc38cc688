//! # Desktop Bridge Implementations
//!
//! Native adapters for the traits in `bridge-traits`.
//!
//! ## Overview
//!
//! - [`ReqwestHttpClient`] - [`HttpClient`](bridge_traits::HttpClient) over
//!   reqwest with retry and streaming bodies
//! - [`StreamingDownloader`] - [`ArchiveDownloader`](bridge_traits::ArchiveDownloader)
//!   that writes through a `.part` file and renames on success
//! - [`ZipArchiveExtractor`] - [`ArchiveExtractor`](bridge_traits::ArchiveExtractor)
//!   for zip files that refuses entries escaping the destination
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, StreamingDownloader, ZipArchiveExtractor};
//! use std::sync::Arc;
//!
//! let http = Arc::new(ReqwestHttpClient::new()?);
//! let downloader = StreamingDownloader::new(http.clone());
//! let extractor = ZipArchiveExtractor::new();
//! ```

pub mod download;
pub mod extract;
pub mod http;

pub use download::StreamingDownloader;
pub use extract::{resolve_entry_path, ZipArchiveExtractor};
pub use http::ReqwestHttpClient;
