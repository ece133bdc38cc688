//! # put.io Provider
//!
//! Implements the `RemoteGateway` trait for the put.io v2 REST API.
//!
//! ## Overview
//!
//! This module provides:
//! - Listing of the account's root folder
//! - Server-side zip creation and status polling
//! - Remote file deletion and transfer cleanup
//! - Retry with exponential backoff on throttling and server errors
//!
//! Polling cadence and overall deadlines belong to the sync core; each
//! gateway call here is a single logical request.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::PutioConnector;
pub use error::{PutioError, Result};
