//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the sync agent:
//! - Configuration discovery, loading and validation
//! - Logging and tracing setup
//!
//! ## Overview
//!
//! The sync core itself never reads configuration; the binary loads an
//! [`AgentConfig`](config::AgentConfig), validates it, initializes logging
//! from it and maps it onto the core's own settings.

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
