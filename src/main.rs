//! putio-getter
//!
//! Watches the root folder of a put.io account, pulls every file down as a
//! zip archive, unpacks it locally and deletes the remote copy.

use anyhow::{Context, Result};
use bridge_desktop::{ReqwestHttpClient, StreamingDownloader, ZipArchiveExtractor};
use bridge_traits::HttpClient;
use clap::Parser;
use core_runtime::config::{discover_config, AgentConfig};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_sync::{SyncConfig, SyncCoordinator};
use provider_putio::PutioConnector;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "putio-getter", version, about)]
struct Args {
    /// Path to config.json; defaults to the first putio/config.json found in
    /// the user and system config directories
    #[arg(short, long, env = "PUTIO_GETTER_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured log format (pretty, json, compact)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = discover_config(args.config.as_deref())?;
    let config = AgentConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    let format = match args.log_format {
        Some(format) => format,
        None => config.log_format()?,
    };
    init_logging(
        LoggingConfig::default()
            .with_format(format)
            .with_level(config.log_level()?),
    )
    .context("Failed to initialize logging")?;

    info!(config = %config_path.display(), "Configuration loaded");

    let sync_config = sync_config(&config)?;
    let http: Arc<dyn HttpClient> =
        Arc::new(ReqwestHttpClient::new().context("Failed to build HTTP client")?);
    let coordinator = SyncCoordinator::new(
        sync_config,
        Arc::new(PutioConnector::new(Arc::clone(&http), config.oauth_token.clone())),
        Arc::new(StreamingDownloader::new(http)),
        Arc::new(ZipArchiveExtractor::new()),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, stopping");
                    shutdown.cancel();
                }
                Err(e) => warn!(error = %e, "Could not listen for interrupts"),
            }
        }
    });

    coordinator
        .run(shutdown)
        .await
        .context("Sync agent stopped with an error")?;

    info!("Stopped");
    Ok(())
}

fn sync_config(config: &AgentConfig) -> Result<SyncConfig> {
    Ok(SyncConfig::new(&config.downloading, &config.unpacking)
        .with_interval(config.interval()?)
        .with_workers(config.download_workers, config.extract_workers)
        .with_queue_capacities(
            config.download_queue_capacity,
            config.extract_queue_capacity,
        ))
}
