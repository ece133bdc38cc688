//! # Extract Stage
//!
//! Unpacks downloaded archives into the destination tree.
//!
//! A successful extraction deletes the staged archive and marks the id
//! completed. Failed extractions are retried a few times; a corrupt archive
//! or one with an entry escaping its destination is refused at once. After the last attempt
//! the archive stays in staging for inspection and the id stays known, since
//! the remote copy is already gone.

use async_trait::async_trait;
use bridge_traits::{archive::ArchiveExtractor, error::BridgeError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{ledger::DedupLedger, queue::StageWorker, task::ExtractJob};

/// How often a failing extraction is attempted before giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractRetry {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ExtractRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Worker logic for the extract stage
pub struct ExtractStage {
    extractor: Arc<dyn ArchiveExtractor>,
    ledger: Arc<DedupLedger>,
    retry: ExtractRetry,
}

impl ExtractStage {
    pub fn new(
        extractor: Arc<dyn ArchiveExtractor>,
        ledger: Arc<DedupLedger>,
        retry: ExtractRetry,
    ) -> Self {
        Self {
            extractor,
            ledger,
            retry,
        }
    }
}

#[async_trait]
impl StageWorker<ExtractJob> for ExtractStage {
    #[instrument(skip(self, job, cancel), fields(file_id = %job.task.id(), file = %job.task.name()))]
    async fn process(&self, job: ExtractJob, cancel: CancellationToken) {
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let outcome = self
                .extractor
                .extract_archive(&job.archive_path, &job.task.extraction_dir, &cancel)
                .await;

            match outcome {
                Ok(report) => {
                    if let Err(e) = tokio::fs::remove_file(&job.archive_path).await {
                        warn!(error = %e, archive = %job.archive_path.display(), "Failed to remove archive");
                    }
                    self.ledger.mark_completed(job.task.id()).await;
                    info!(
                        files = report.files,
                        bytes = report.bytes,
                        dest = %report.destination.display(),
                        "Extraction complete"
                    );
                    return;
                }
                Err(BridgeError::Cancelled) => {
                    info!("Extraction interrupted by shutdown");
                    return;
                }
                Err(e @ BridgeError::UnsafeArchiveEntry { .. }) => {
                    error!(error = %e, archive = %job.archive_path.display(), "Refusing unsafe archive");
                    return;
                }
                Err(e) if !e.is_retryable() => {
                    error!(error = %e, archive = %job.archive_path.display(), "Archive cannot be extracted; kept for inspection");
                    return;
                }
                Err(e) if attempt < max_attempts => {
                    warn!(attempt, max_attempts, error = %e, "Extraction failed, retrying");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(self.retry.delay) => {}
                    }
                }
                Err(e) => {
                    error!(
                        attempts = max_attempts,
                        error = %e,
                        archive = %job.archive_path.display(),
                        "Extraction failed; archive kept for inspection"
                    );
                }
            }
        }

        debug!("Extraction gave up");
    }
}
