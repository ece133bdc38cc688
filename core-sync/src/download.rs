//! # Download Stage
//!
//! Turns a [`PipelineTask`] into a local archive and removes the remote copy.
//!
//! ## Workflow
//!
//! 1. Ask the remote service to build a zip of the file
//! 2. Poll the zip job until it publishes a download URL
//! 3. Stream the zip to the staging path
//! 4. Delete the remote file, retrying on failure
//! 5. Queue an [`ExtractJob`] for the extract stage
//!
//! Any failure releases the id in the ledger; the remote file is still
//! listed, so a later tick picks it up again. A staged archive is never
//! removed here: once the download finished it may be the only copy left.

use async_trait::async_trait;
use bridge_traits::{
    archive::ArchiveDownloader,
    error::BridgeError,
    storage::{ArchiveJobId, RemoteGateway},
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    error::{Result, SyncError},
    ledger::DedupLedger,
    queue::{StageSender, StageWorker},
    retry::{call_remote, run_with_schedule, Attempt, RemotePolicies},
    task::{ExtractJob, PipelineTask},
};

/// How long a timed-out download gets to clean up after cancellation
const DOWNLOAD_CLEANUP_GRACE: Duration = Duration::from_secs(5);

/// Worker logic for the download stage
pub struct DownloadStage {
    gateway: Arc<dyn RemoteGateway>,
    downloader: Arc<dyn ArchiveDownloader>,
    ledger: Arc<DedupLedger>,
    extract_queue: StageSender<ExtractJob>,
    policies: RemotePolicies,
}

impl DownloadStage {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        downloader: Arc<dyn ArchiveDownloader>,
        ledger: Arc<DedupLedger>,
        extract_queue: StageSender<ExtractJob>,
        policies: RemotePolicies,
    ) -> Self {
        Self {
            gateway,
            downloader,
            ledger,
            extract_queue,
            policies,
        }
    }

    /// Steps 1 to 4. On success the archive is complete at the staging path
    /// and the remote file is gone.
    async fn fetch(&self, task: &PipelineTask, cancel: &CancellationToken) -> Result<ExtractJob> {
        let gateway = self.gateway.as_ref();
        let call_timeout = self.policies.call_timeout;
        let file_id = task.id();

        let job_id = call_remote(
            "create_archive",
            call_timeout,
            cancel,
            gateway.create_archive(file_id),
        )
        .await?;
        debug!(zip_id = %job_id, "Archive requested");

        let url = self.wait_for_archive(&job_id, cancel).await?;
        debug!(url = %url, "Archive ready");

        if let Some(parent) = task.staging_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = self.download(&url, task, cancel).await?;
        debug!(bytes, path = %task.staging_path.display(), "Archive downloaded");

        if let Err(e) = self.delete_remote(task, cancel).await {
            // The remote copy may be gone already; keep the only local one.
            warn!(
                error = %e,
                archive = %task.staging_path.display(),
                "Remote delete unconfirmed, archive kept in staging"
            );
            return Err(e);
        }

        Ok(ExtractJob {
            task: task.clone(),
            archive_path: task.staging_path.clone(),
        })
    }

    /// Stream the archive to the staging path within the download budget.
    ///
    /// On timeout the transfer is cancelled and given a moment to remove its
    /// partial file.
    async fn download(
        &self,
        url: &str,
        task: &PipelineTask,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let budget = self.policies.download_timeout;
        let download_cancel = cancel.child_token();
        let download = self
            .downloader
            .download_to_path(url, &task.staging_path, &download_cancel);
        tokio::pin!(download);

        let outcome = tokio::select! {
            outcome = &mut download => outcome,
            _ = tokio::time::sleep(budget) => {
                download_cancel.cancel();
                if tokio::time::timeout(DOWNLOAD_CLEANUP_GRACE, &mut download).await.is_err() {
                    warn!(path = %task.staging_path.display(), "Timed out download did not stop");
                }
                return Err(SyncError::Timeout {
                    operation: "download",
                    secs: budget.as_secs(),
                });
            }
        };

        outcome.map_err(|e| match e {
            BridgeError::Cancelled => SyncError::Cancelled,
            other => SyncError::Download(other.to_string()),
        })
    }

    async fn wait_for_archive(
        &self,
        job_id: &ArchiveJobId,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let gateway = self.gateway.as_ref();
        let call_timeout = self.policies.call_timeout;

        run_with_schedule(
            &self.policies.archive_poll,
            "archive_poll",
            cancel,
            |attempt| async move {
                match call_remote(
                    "get_archive_status",
                    call_timeout,
                    cancel,
                    gateway.get_archive_status(job_id),
                )
                .await
                {
                    Ok(job) => match job.download_url {
                        Some(url) => Attempt::Done(url),
                        None => {
                            debug!(attempt, "Archive not ready yet");
                            Attempt::Pending
                        }
                    },
                    Err(e) => Attempt::Failed(e),
                }
            },
        )
        .await
    }

    async fn delete_remote(&self, task: &PipelineTask, cancel: &CancellationToken) -> Result<()> {
        let gateway = self.gateway.as_ref();
        let call_timeout = self.policies.call_timeout;
        let file_id = task.id();

        run_with_schedule(
            &self.policies.remote_delete,
            "delete_remote_file",
            cancel,
            |attempt| async move {
                let delete = async {
                    match gateway.delete_remote_file(file_id).await {
                        // An earlier attempt may have succeeded without us
                        // seeing the response.
                        Err(BridgeError::NotFound(message)) => {
                            debug!(attempt, message = %message, "Remote file already gone");
                            Ok(())
                        }
                        other => other,
                    }
                };
                match call_remote("delete_remote_file", call_timeout, cancel, delete).await
                {
                    Ok(()) => Attempt::Done(()),
                    Err(SyncError::Cancelled) => Attempt::Failed(SyncError::Cancelled),
                    Err(e) => {
                        warn!(attempt, error = %e, "Remote delete failed, will retry");
                        Attempt::Pending
                    }
                }
            },
        )
        .await
    }
}

#[async_trait]
impl StageWorker<PipelineTask> for DownloadStage {
    #[instrument(skip(self, task, cancel), fields(file_id = %task.id(), file = %task.name()))]
    async fn process(&self, task: PipelineTask, cancel: CancellationToken) {
        info!("Fetching remote file");

        let job = match self.fetch(&task, &cancel).await {
            Ok(job) => job,
            Err(SyncError::Cancelled) => {
                info!("Download abandoned on shutdown");
                self.ledger.release(task.id()).await;
                return;
            }
            Err(e) => {
                error!(error = %e, "Download abandoned, will retry on a later tick");
                self.ledger.release(task.id()).await;
                return;
            }
        };

        info!("Remote file fetched, queueing extraction");
        let archive_path = job.archive_path.clone();
        if let Err(e) = self.extract_queue.submit(job, &cancel).await {
            warn!(
                error = %e,
                archive = %archive_path.display(),
                "Remote copy already deleted but extraction was never queued; manual extraction needed"
            );
            self.ledger.release(task.id()).await;
        }
    }
}
