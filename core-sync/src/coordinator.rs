//! # Sync Coordinator
//!
//! Wires the ledger, stage queues and worker pools together and drives the
//! periodic reconciliation loop.
//!
//! ## Overview
//!
//! ```text
//! Reconciler ──(download queue)──> DownloadStage x N ──(extract queue)──> ExtractStage x M
//!      │                                   │                                   │
//!      └──────────────────────────── DedupLedger ─────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! 1. [`SyncCoordinator::start`] spawns both worker pools and returns a
//!    [`PipelineHandle`]
//! 2. [`SyncCoordinator::run`] ticks immediately, then sleeps `interval`
//!    after each tick finishes
//! 3. Cancelling the shutdown token stops the loop, interrupts in-flight
//!    work and joins every worker before `run` returns
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncConfig, SyncCoordinator};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = SyncConfig::new("/tmp/putio-getter", "/home/me/Downloads");
//! let coordinator = SyncCoordinator::new(config, gateway, downloader, extractor);
//!
//! let shutdown = CancellationToken::new();
//! coordinator.run(shutdown.clone()).await?;
//! ```

use bridge_traits::{
    archive::{ArchiveDownloader, ArchiveExtractor},
    storage::RemoteGateway,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    download::DownloadStage,
    error::{Result, SyncError},
    extract::{ExtractRetry, ExtractStage},
    ledger::DedupLedger,
    queue::{stage_queue, WorkerPool},
    reconcile::{Reconciler, TickReport},
    retry::RemotePolicies,
    task::PathLayout,
};

/// Sync coordinator configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Pause between the end of one tick and the start of the next
    pub interval: Duration,

    /// Local staging and extraction directories
    pub layout: PathLayout,

    /// Concurrent download workers
    pub download_workers: usize,

    /// Concurrent extract workers
    pub extract_workers: usize,

    /// Tasks that may wait for a download worker
    pub download_queue_capacity: usize,

    /// Archives that may wait for an extract worker
    pub extract_queue_capacity: usize,

    /// Timeouts and polling schedules for remote calls
    pub policies: RemotePolicies,

    /// Retry behavior for failed extractions
    pub extract_retry: ExtractRetry,
}

impl SyncConfig {
    pub fn new(download_dir: impl Into<PathBuf>, unpack_dir: impl Into<PathBuf>) -> Self {
        Self {
            interval: Duration::from_secs(60),
            layout: PathLayout::new(download_dir, unpack_dir),
            download_workers: 2,
            extract_workers: 1,
            download_queue_capacity: 10,
            extract_queue_capacity: 2,
            policies: RemotePolicies::default(),
            extract_retry: ExtractRetry::default(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_workers(mut self, download: usize, extract: usize) -> Self {
        self.download_workers = download;
        self.extract_workers = extract;
        self
    }

    pub fn with_queue_capacities(mut self, download: usize, extract: usize) -> Self {
        self.download_queue_capacity = download;
        self.extract_queue_capacity = extract;
        self
    }

    pub fn with_policies(mut self, policies: RemotePolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_extract_retry(mut self, retry: ExtractRetry) -> Self {
        self.extract_retry = retry;
        self
    }

    /// Worker counts and queue capacities must be at least one.
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("download_workers", self.download_workers),
            ("extract_workers", self.extract_workers),
            ("download_queue_capacity", self.download_queue_capacity),
            ("extract_queue_capacity", self.extract_queue_capacity),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(SyncError::InvalidConfig(format!(
                    "{} must be at least 1",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Running pipeline: both worker pools plus the reconciler feeding them
pub struct PipelineHandle {
    reconciler: Reconciler,
    download_pool: WorkerPool,
    extract_pool: WorkerPool,
    cancel: CancellationToken,
}

impl PipelineHandle {
    /// Run a single reconciliation tick.
    pub async fn reconcile(&self) -> Result<TickReport> {
        self.reconciler.tick(&self.cancel).await
    }

    /// Cancel all workers and wait for them to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let Self {
            reconciler,
            download_pool,
            extract_pool,
            ..
        } = self;
        // Drop the last download-queue sender before joining.
        drop(reconciler);
        download_pool.join().await;
        extract_pool.join().await;
    }
}

/// Periodic sync agent
pub struct SyncCoordinator {
    config: SyncConfig,
    gateway: Arc<dyn RemoteGateway>,
    downloader: Arc<dyn ArchiveDownloader>,
    extractor: Arc<dyn ArchiveExtractor>,
    ledger: Arc<DedupLedger>,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        gateway: Arc<dyn RemoteGateway>,
        downloader: Arc<dyn ArchiveDownloader>,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Self {
        Self {
            config,
            gateway,
            downloader,
            extractor,
            ledger: Arc::new(DedupLedger::new()),
        }
    }

    pub fn ledger(&self) -> Arc<DedupLedger> {
        Arc::clone(&self.ledger)
    }

    /// Spawn the worker pools. Everything stops when `cancel` fires or the
    /// returned handle is shut down.
    pub fn start(&self, cancel: CancellationToken) -> Result<PipelineHandle> {
        self.config.validate()?;

        let (download_tx, download_rx) = stage_queue(self.config.download_queue_capacity);
        let (extract_tx, extract_rx) = stage_queue(self.config.extract_queue_capacity);

        let extract_stage = Arc::new(ExtractStage::new(
            Arc::clone(&self.extractor),
            Arc::clone(&self.ledger),
            self.config.extract_retry,
        ));
        let extract_pool = WorkerPool::spawn(
            "extract",
            self.config.extract_workers,
            extract_rx,
            extract_stage,
            cancel.clone(),
        );

        let download_stage = Arc::new(DownloadStage::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.downloader),
            Arc::clone(&self.ledger),
            extract_tx,
            self.config.policies,
        ));
        let download_pool = WorkerPool::spawn(
            "download",
            self.config.download_workers,
            download_rx,
            download_stage,
            cancel.clone(),
        );

        let reconciler = Reconciler::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.ledger),
            download_tx,
            self.config.layout.clone(),
            self.config.policies.call_timeout,
        );

        info!(
            download_workers = download_pool.len(),
            extract_workers = extract_pool.len(),
            "Pipeline started"
        );

        Ok(PipelineHandle {
            reconciler,
            download_pool,
            extract_pool,
            cancel,
        })
    }

    /// Run the reconciliation loop until `shutdown` is cancelled.
    ///
    /// Tick failures are logged and retried on the next tick; only an invalid
    /// configuration makes this return an error.
    #[instrument(skip(self, shutdown), fields(interval_secs = self.config.interval.as_secs()))]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let pipeline = self.start(shutdown.child_token())?;

        loop {
            match pipeline.reconcile().await {
                Ok(report) => {
                    let ledger = self.ledger.snapshot().await;
                    info!(
                        listed = report.listed,
                        dispatched = report.dispatched,
                        already_known = report.already_known,
                        deferred = report.deferred,
                        rejected = report.rejected,
                        forgotten = report.forgotten,
                        in_flight = ledger.known,
                        "Reconciliation tick finished"
                    );
                }
                Err(SyncError::Cancelled) => break,
                Err(e) => warn!(error = %e, "Reconciliation tick failed"),
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("Shutting down pipeline");
        pipeline.shutdown().await;
        let remaining = self.ledger.snapshot().await;
        if remaining.known > 0 {
            warn!(
                pending = remaining.known,
                "Stopped with files still in flight; they will be retried on next start"
            );
        }
        Ok(())
    }
}
