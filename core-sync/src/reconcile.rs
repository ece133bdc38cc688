//! # Reconciliation
//!
//! One tick of the sync loop: list the remote root, admit files the ledger
//! has not seen, hand them to the download stage and forget ids whose
//! processing finished.

use bridge_traits::storage::RemoteGateway;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::{
    error::Result,
    ledger::DedupLedger,
    queue::StageSender,
    retry::call_remote,
    task::{PathLayout, PipelineTask},
};

/// Counters describing one reconciliation tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Files returned by the listing
    pub listed: usize,
    /// Newly admitted and queued for download
    pub dispatched: usize,
    /// Skipped because the ledger already owns them
    pub already_known: usize,
    /// Skipped because a file with the same name is still in flight
    pub deferred: usize,
    /// Skipped because the name cannot be mapped to a local path
    pub rejected: usize,
    /// Ids dropped from the ledger at the end of the tick
    pub forgotten: usize,
}

/// Runs reconciliation ticks against the remote root
pub struct Reconciler {
    gateway: Arc<dyn RemoteGateway>,
    ledger: Arc<DedupLedger>,
    download_queue: StageSender<PipelineTask>,
    layout: PathLayout,
    call_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        ledger: Arc<DedupLedger>,
        download_queue: StageSender<PipelineTask>,
        layout: PathLayout,
        call_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            ledger,
            download_queue,
            layout,
            call_timeout,
        }
    }

    /// Run one tick.
    ///
    /// A failed housekeeping or listing call ends the tick early without
    /// dispatching or forgetting anything. Dispatch waits while the download
    /// queue is full.
    #[instrument(skip(self, cancel))]
    pub async fn tick(&self, cancel: &CancellationToken) -> Result<TickReport> {
        let gateway = self.gateway.as_ref();

        call_remote(
            "clean_stale_transfers",
            self.call_timeout,
            cancel,
            gateway.clean_stale_transfers(),
        )
        .await?;

        let files = call_remote(
            "list_root_files",
            self.call_timeout,
            cancel,
            gateway.list_root_files(),
        )
        .await?;

        let mut report = TickReport {
            listed: files.len(),
            ..TickReport::default()
        };

        for file in files {
            if self.ledger.is_known(&file.id).await {
                report.already_known += 1;
                continue;
            }

            if self.ledger.name_in_flight(&file.name).await {
                warn!(file_id = %file.id, file = %file.name, "Same name already in flight, deferring");
                report.deferred += 1;
                continue;
            }

            let task = match PipelineTask::new(file, &self.layout) {
                Ok(task) => task,
                Err(e) => {
                    warn!(error = %e, "Skipping remote file");
                    report.rejected += 1;
                    continue;
                }
            };

            self.ledger.mark_known(&task.file).await;
            let file_id = task.id().clone();
            debug!(file_id = %file_id, file = %task.name(), "Dispatching");

            if let Err(e) = self.download_queue.submit(task, cancel).await {
                self.ledger.release(&file_id).await;
                return Err(e);
            }
            report.dispatched += 1;
        }

        report.forgotten = self.ledger.forget_completed().await.len();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::queue::stage_queue;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::storage::{ArchiveJob, ArchiveJobId, FileId, RemoteFile};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ListingGateway {
        files: Vec<RemoteFile>,
        fail_clean: AtomicBool,
        fail_list: AtomicBool,
    }

    #[async_trait]
    impl RemoteGateway for ListingGateway {
        async fn list_root_files(&self) -> BridgeResult<Vec<RemoteFile>> {
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(BridgeError::OperationFailed("connection reset".to_string()));
            }
            Ok(self.files.clone())
        }

        async fn clean_stale_transfers(&self) -> BridgeResult<()> {
            if self.fail_clean.load(Ordering::SeqCst) {
                return Err(BridgeError::OperationFailed("HTTP 502 error".to_string()));
            }
            Ok(())
        }

        async fn create_archive(&self, _file_id: &FileId) -> BridgeResult<ArchiveJobId> {
            Err(BridgeError::NotAvailable("create_archive".to_string()))
        }

        async fn get_archive_status(&self, job_id: &ArchiveJobId) -> BridgeResult<ArchiveJob> {
            Ok(ArchiveJob::pending(job_id.clone()))
        }

        async fn delete_remote_file(&self, _file_id: &FileId) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn reconciler(
        files: Vec<RemoteFile>,
        capacity: usize,
    ) -> (
        Reconciler,
        Arc<ListingGateway>,
        Arc<DedupLedger>,
        crate::queue::StageReceiver<PipelineTask>,
    ) {
        let gateway = Arc::new(ListingGateway {
            files,
            fail_clean: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
        });
        let ledger = Arc::new(DedupLedger::new());
        let (tx, rx) = stage_queue(capacity);
        let reconciler = Reconciler::new(
            gateway.clone(),
            ledger.clone(),
            tx,
            PathLayout::new("/tmp/dl", "/tmp/out"),
            Duration::from_secs(1),
        );
        (reconciler, gateway, ledger, rx)
    }

    #[tokio::test]
    async fn test_repeated_listing_dispatches_once() {
        let files = vec![RemoteFile::new(1_i64, "a"), RemoteFile::new(2_i64, "b")];
        let (reconciler, _gateway, _ledger, rx) = reconciler(files, 10);
        let cancel = CancellationToken::new();

        let first = reconciler.tick(&cancel).await.unwrap();
        assert_eq!(first.listed, 2);
        assert_eq!(first.dispatched, 2);

        let second = reconciler.tick(&cancel).await.unwrap();
        assert_eq!(second.dispatched, 0);
        assert_eq!(second.already_known, 2);

        assert_eq!(rx.next(&cancel).await.unwrap().id().as_str(), "1");
        assert_eq!(rx.next(&cancel).await.unwrap().id().as_str(), "2");
    }

    #[tokio::test]
    async fn test_completed_ids_are_forgotten_and_rediscovered() {
        let files = vec![RemoteFile::new(1_i64, "a")];
        let (reconciler, _gateway, ledger, _rx) = reconciler(files, 10);
        let cancel = CancellationToken::new();

        reconciler.tick(&cancel).await.unwrap();
        ledger.mark_completed(&FileId::from(1_i64)).await;

        let report = reconciler.tick(&cancel).await.unwrap();
        assert_eq!(report.already_known, 1);
        assert_eq!(report.forgotten, 1);

        // Still listed remotely, so it is new again.
        let report = reconciler.tick(&cancel).await.unwrap();
        assert_eq!(report.dispatched, 1);
    }

    #[tokio::test]
    async fn test_same_name_is_deferred_and_bad_names_rejected() {
        let files = vec![
            RemoteFile::new(1_i64, "movie"),
            RemoteFile::new(2_i64, "movie"),
            RemoteFile::new(3_i64, "../escape"),
        ];
        let (reconciler, _gateway, ledger, _rx) = reconciler(files, 10);

        let report = reconciler.tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            report,
            TickReport {
                listed: 3,
                dispatched: 1,
                already_known: 0,
                deferred: 1,
                rejected: 1,
                forgotten: 0,
            }
        );
        assert!(!ledger.is_known(&FileId::from(2_i64)).await);
        assert!(!ledger.is_known(&FileId::from(3_i64)).await);
    }

    #[tokio::test]
    async fn test_failed_housekeeping_skips_tick() {
        let files = vec![RemoteFile::new(1_i64, "a")];
        let (reconciler, gateway, ledger, _rx) = reconciler(files, 10);
        gateway.fail_clean.store(true, Ordering::SeqCst);

        let result = reconciler.tick(&CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(SyncError::Remote {
                operation: "clean_stale_transfers",
                ..
            })
        ));
        assert!(ledger.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_listing_neither_dispatches_nor_forgets() {
        let files = vec![RemoteFile::new(1_i64, "a"), RemoteFile::new(2_i64, "b")];
        let (reconciler, gateway, ledger, rx) = reconciler(files, 10);
        let cancel = CancellationToken::new();

        reconciler.tick(&cancel).await.unwrap();
        rx.next(&cancel).await.unwrap();
        rx.next(&cancel).await.unwrap();
        ledger.mark_completed(&FileId::from(1_i64)).await;
        gateway.fail_list.store(true, Ordering::SeqCst);

        let result = reconciler.tick(&cancel).await;
        assert!(matches!(
            result,
            Err(SyncError::Remote {
                operation: "list_root_files",
                ..
            })
        ));

        let snapshot = ledger.snapshot().await;
        assert_eq!(snapshot.known, 2);
        assert_eq!(snapshot.completed, 1);
        let nothing_queued =
            tokio::time::timeout(Duration::from_millis(20), rx.next(&cancel)).await;
        assert!(nothing_queued.is_err());

        gateway.fail_list.store(false, Ordering::SeqCst);
        let report = reconciler.tick(&cancel).await.unwrap();
        assert_eq!(report.forgotten, 1);
        assert_eq!(report.dispatched, 0);
    }

    #[tokio::test]
    async fn test_cancelled_dispatch_releases_id() {
        let files = vec![RemoteFile::new(1_i64, "a"), RemoteFile::new(2_i64, "b")];
        let (reconciler, _gateway, ledger, _rx) = reconciler(files, 1);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let result = reconciler.tick(&cancel).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));

        let snapshot = ledger.snapshot().await;
        assert_eq!(snapshot.known, 2);
        assert_eq!(snapshot.released, 1);
    }
}
