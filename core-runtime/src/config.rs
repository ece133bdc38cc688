//! # Agent Configuration
//!
//! Loads, discovers and validates the JSON configuration file.
//!
//! ## Overview
//!
//! The file uses PascalCase keys so existing configs keep working:
//!
//! ```json
//! {
//!   "OauthToken": "...",
//!   "Downloading": "/tmp/putio-getter",
//!   "Unpacking": "/home/me/Downloads",
//!   "Interval": "1m",
//!   "LogLevel": "ERROR"
//! }
//! ```
//!
//! Optional keys tune the pipeline: `DownloadWorkers` (2), `ExtractWorkers` (1),
//! `DownloadQueueCapacity` (10), `ExtractQueueCapacity` (2) and `LogFormat`
//! (`pretty`, `json` or `compact`).
//!
//! ## Discovery
//!
//! Without an explicit path the first existing `putio/config.json` under the
//! user config dir, then the system config dirs, wins. When none exists a
//! sample is written to the user config dir and loading fails with a message
//! pointing at it, so the operator can fill in the token.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{discover_config, AgentConfig};
//!
//! let path = discover_config(None)?;
//! let config = AgentConfig::load(&path)?;
//! config.validate()?;
//! ```

use crate::error::{Error, Result};
use crate::logging::{redact_if_sensitive, LogFormat, LogLevel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Token value written into sample configs
pub const PLACEHOLDER_TOKEN: &str = "PLACEHOLDER";

/// Directory under each config root that holds `config.json`
const APP_DIR: &str = "putio";
const CONFIG_FILE: &str = "config.json";

fn default_download_workers() -> usize {
    2
}

fn default_extract_workers() -> usize {
    1
}

fn default_download_queue_capacity() -> usize {
    10
}

fn default_extract_queue_capacity() -> usize {
    2
}

/// Agent configuration as stored on disk
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentConfig {
    /// put.io OAuth token
    pub oauth_token: String,

    /// Staging directory for downloaded archives
    pub downloading: PathBuf,

    /// Destination root for extracted files
    pub unpacking: PathBuf,

    /// Reconciliation interval as a duration string (`1m`, `90s`, `1h30m`)
    pub interval: String,

    /// `trace`, `debug`, `info`, `warn` or `error`, any case
    pub log_level: String,

    #[serde(default = "default_download_workers")]
    pub download_workers: usize,

    #[serde(default = "default_extract_workers")]
    pub extract_workers: usize,

    #[serde(default = "default_download_queue_capacity")]
    pub download_queue_capacity: usize,

    #[serde(default = "default_extract_queue_capacity")]
    pub extract_queue_capacity: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_format: Option<String>,
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field(
                "oauth_token",
                &redact_if_sensitive("oauth_token", &self.oauth_token),
            )
            .field("downloading", &self.downloading)
            .field("unpacking", &self.unpacking)
            .field("interval", &self.interval)
            .field("log_level", &self.log_level)
            .field("download_workers", &self.download_workers)
            .field("extract_workers", &self.extract_workers)
            .field("download_queue_capacity", &self.download_queue_capacity)
            .field("extract_queue_capacity", &self.extract_queue_capacity)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AgentConfig {
    /// Sample configuration written when no config file exists
    pub fn sample() -> Self {
        let unpacking = dirs::download_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("Downloads"));

        Self {
            oauth_token: PLACEHOLDER_TOKEN.to_string(),
            downloading: std::env::temp_dir().join("putio-getter"),
            unpacking,
            interval: "1m".to_string(),
            log_level: "ERROR".to_string(),
            download_workers: default_download_workers(),
            extract_workers: default_extract_workers(),
            download_queue_capacity: default_download_queue_capacity(),
            extract_queue_capacity: default_extract_queue_capacity(),
            log_format: None,
        }
    }

    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))
    }

    /// Write this configuration as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Parse(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Parsed reconciliation interval
    pub fn interval(&self) -> Result<Duration> {
        parse_interval(&self.interval)
    }

    /// Parsed log level
    pub fn log_level(&self) -> Result<LogLevel> {
        self.log_level.parse()
    }

    /// Parsed log format, falling back to the build's default
    pub fn log_format(&self) -> Result<LogFormat> {
        match &self.log_format {
            Some(format) => format.parse(),
            None => Ok(LogFormat::default()),
        }
    }

    /// Validate the configuration, creating the staging and destination
    /// directories when they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.oauth_token.trim().is_empty() {
            return Err(Error::Config("OauthToken cannot be empty".to_string()));
        }

        if self.oauth_token == PLACEHOLDER_TOKEN {
            return Err(Error::Config(
                "OauthToken still holds the sample placeholder. \
                 Paste the token from your put.io account settings."
                    .to_string(),
            ));
        }

        let interval = self
            .interval()
            .map_err(|e| Error::Config(format!("Interval: {}", e)))?;
        if interval.is_zero() {
            return Err(Error::Config(
                "Interval must be greater than zero".to_string(),
            ));
        }

        self.log_level()
            .map_err(|e| Error::Config(format!("LogLevel: {}", e)))?;
        self.log_format()
            .map_err(|e| Error::Config(format!("LogFormat: {}", e)))?;

        for (key, value) in [
            ("DownloadWorkers", self.download_workers),
            ("ExtractWorkers", self.extract_workers),
            ("DownloadQueueCapacity", self.download_queue_capacity),
            ("ExtractQueueCapacity", self.extract_queue_capacity),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{} must be at least 1", key)));
            }
        }

        ensure_directory("Downloading", &self.downloading)?;
        ensure_directory("Unpacking", &self.unpacking)?;

        Ok(())
    }
}

fn ensure_directory(key: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::Config(format!("{} cannot be empty", key)));
    }

    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(Error::Config(format!(
            "{}: {} already exists and is not a directory",
            key,
            path.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Creating directory");
            fs::create_dir_all(path)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Config roots searched in order: the user config dir, then the system
/// config dirs from `XDG_CONFIG_DIRS` (default `/etc/xdg` on Unix).
pub fn config_search_dirs() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(user) = dirs::config_dir() {
        roots.push(user);
    }

    #[cfg(unix)]
    {
        let system = std::env::var("XDG_CONFIG_DIRS")
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "/etc/xdg".to_string());
        roots.extend(
            system
                .split(':')
                .filter(|entry| !entry.is_empty())
                .map(PathBuf::from),
        );
    }

    roots
}

/// Locate the config file, writing a sample when none exists
///
/// An explicit path is used as-is. Otherwise see [`find_config_in`].
pub fn discover_config(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(create_sample(path));
            }
            Ok(path.to_path_buf())
        }
        None => find_config_in(&config_search_dirs()),
    }
}

/// Return the first `<dir>/putio/config.json` that exists
///
/// When none exists, a sample is written under the first search dir and an
/// error pointing at it is returned.
pub fn find_config_in(search_dirs: &[PathBuf]) -> Result<PathBuf> {
    for dir in search_dirs {
        let candidate = dir.join(APP_DIR).join(CONFIG_FILE);
        if candidate.is_file() {
            debug!(path = %candidate.display(), "Found configuration");
            return Ok(candidate);
        }
    }

    let Some(first) = search_dirs.first() else {
        return Err(Error::Config(
            "No configuration directory available on this system".to_string(),
        ));
    };

    Err(create_sample(&first.join(APP_DIR).join(CONFIG_FILE)))
}

fn create_sample(path: &Path) -> Error {
    match AgentConfig::sample().save(path) {
        Ok(()) => {
            warn!(path = %path.display(), "Wrote sample configuration");
            Error::Config(format!(
                "configuration doesn't exist, created sample under {}",
                path.display()
            ))
        }
        Err(e) => Error::Config(format!(
            "configuration doesn't exist and a sample could not be written to {}: {}",
            path.display(),
            e
        )),
    }
}

/// Parse a duration string such as `300ms`, `1.5h` or `2h45m`
///
/// Accepted units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare `0`
/// is allowed; any other number needs a unit. Negative durations are rejected.
pub fn parse_interval(input: &str) -> Result<Duration> {
    let invalid = || Error::Parse(format!("invalid duration \"{}\"", input));

    let mut rest = input.trim();
    if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    } else if rest.starts_with('-') {
        return Err(Error::Parse(format!(
            "negative duration \"{}\" is not allowed",
            input
        )));
    }

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos: f64 = 0.0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            "" => {
                return Err(Error::Parse(format!(
                    "missing unit in duration \"{}\"",
                    input
                )))
            }
            other => {
                return Err(Error::Parse(format!(
                    "unknown unit \"{}\" in duration \"{}\"",
                    other, input
                )))
            }
        };
        rest = &rest[unit_len..];
        total_nanos += value * scale;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid());
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
