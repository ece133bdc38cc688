//! # Stage Queues & Worker Pools
//!
//! Bounded hand-off between pipeline stages and the fixed set of workers that
//! drain each one.
//!
//! ## Overview
//!
//! - [`stage_queue`] creates a bounded channel. [`StageSender::submit`] waits
//!   while the queue is full, which is how a slow stage pushes back on the
//!   one feeding it.
//! - [`StageReceiver`] can be cloned; all clones share one receiver behind an
//!   async mutex, so each item goes to exactly one worker.
//! - [`WorkerPool`] runs N workers over a receiver. Every item gets its own
//!   child cancellation token that is cancelled once the item is done, so
//!   anything the worker spawned for it stops with it.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{Result, SyncError};

/// Create a bounded stage queue
///
/// # Panics
///
/// Panics if `capacity` is zero, like [`tokio::sync::mpsc::channel`].
pub fn stage_queue<T>(capacity: usize) -> (StageSender<T>, StageReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        StageSender { inner: tx },
        StageReceiver {
            inner: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer side of a stage queue
#[derive(Debug)]
pub struct StageSender<T> {
    inner: mpsc::Sender<T>,
}

impl<T> Clone for StageSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> StageSender<T> {
    /// Enqueue an item, waiting for room when the queue is full.
    ///
    /// # Errors
    ///
    /// [`SyncError::Cancelled`] if `cancel` fires while waiting, and
    /// [`SyncError::QueueClosed`] once every receiver is gone.
    pub async fn submit(&self, item: T, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            sent = self.inner.send(item) => sent.map_err(|_| SyncError::QueueClosed),
        }
    }
}

/// Consumer side of a stage queue, shared by all workers of a stage
#[derive(Debug)]
pub struct StageReceiver<T> {
    inner: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for StageReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> StageReceiver<T> {
    /// Wait for the next item.
    ///
    /// Returns `None` once `cancel` fires or every sender is dropped and the
    /// queue is drained.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = async { self.inner.lock().await.recv().await } => item,
        }
    }
}

/// Per-item work performed by a pool worker
#[async_trait]
pub trait StageWorker<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    /// Process one item. `cancel` is cancelled when the pool shuts down and
    /// again once this call returns.
    async fn process(&self, item: T, cancel: CancellationToken);
}

/// Fixed set of workers draining one stage queue
pub struct WorkerPool {
    stage: &'static str,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks pulling from `receiver` until `cancel` fires or
    /// the queue closes.
    pub fn spawn<T, W>(
        stage: &'static str,
        workers: usize,
        receiver: StageReceiver<T>,
        worker: Arc<W>,
        cancel: CancellationToken,
    ) -> Self
    where
        T: Send + 'static,
        W: StageWorker<T>,
    {
        let handles = (0..workers)
            .map(|index| {
                let receiver = receiver.clone();
                let worker = Arc::clone(&worker);
                let cancel = cancel.clone();

                tokio::spawn(async move {
                    debug!(stage, worker = index, "Worker started");
                    while let Some(item) = receiver.next(&cancel).await {
                        let task_token = cancel.child_token();
                        let _guard = task_token.clone().drop_guard();
                        worker.process(item, task_token).await;
                    }
                    debug!(stage, worker = index, "Worker stopped");
                })
            })
            .collect();

        Self { stage, handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(stage = self.stage, error = %e, "Worker task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    struct Recorder {
        seen: AsyncMutex<Vec<u32>>,
        tokens: AsyncMutex<Vec<CancellationToken>>,
    }

    #[async_trait]
    impl StageWorker<u32> for Recorder {
        async fn process(&self, item: u32, cancel: CancellationToken) {
            self.seen.lock().await.push(item);
            self.tokens.lock().await.push(cancel);
        }
    }

    #[tokio::test]
    async fn test_submit_blocks_until_room() {
        let (tx, rx) = stage_queue::<u32>(1);
        let cancel = CancellationToken::new();
        tx.submit(1, &cancel).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.submit(2, &cancel)).await;
        assert!(blocked.is_err(), "submit should wait while the queue is full");

        assert_eq!(rx.next(&cancel).await, Some(1));
        tx.submit(2, &cancel).await.unwrap();
        assert_eq!(rx.next(&cancel).await, Some(2));
    }

    #[tokio::test]
    async fn test_submit_is_cancellable() {
        let (tx, _rx) = stage_queue::<u32>(1);
        let cancel = CancellationToken::new();
        tx.submit(1, &cancel).await.unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        assert!(matches!(
            tx.submit(2, &cancel).await,
            Err(SyncError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_submit_to_closed_queue() {
        let (tx, rx) = stage_queue::<u32>(1);
        drop(rx);
        assert!(matches!(
            tx.submit(1, &CancellationToken::new()).await,
            Err(SyncError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn test_pool_processes_each_item_once() {
        let (tx, rx) = stage_queue::<u32>(4);
        let recorder = Arc::new(Recorder {
            seen: AsyncMutex::new(Vec::new()),
            tokens: AsyncMutex::new(Vec::new()),
        });
        let cancel = CancellationToken::new();
        let pool = WorkerPool::spawn("test", 3, rx, recorder.clone(), cancel.clone());
        assert_eq!(pool.len(), 3);

        for item in 0..10 {
            tx.submit(item, &cancel).await.unwrap();
        }
        drop(tx);
        pool.join().await;

        let mut seen = recorder.seen.lock().await.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        // Per-item tokens are cancelled once the item is processed.
        assert!(recorder
            .tokens
            .lock()
            .await
            .iter()
            .all(CancellationToken::is_cancelled));
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_pool_stops_on_cancel() {
        let (_tx, rx) = stage_queue::<u32>(1);
        let recorder = Arc::new(Recorder {
            seen: AsyncMutex::new(Vec::new()),
            tokens: AsyncMutex::new(Vec::new()),
        });
        let cancel = CancellationToken::new();
        let pool = WorkerPool::spawn("test", 2, rx, recorder, cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), pool.join())
            .await
            .expect("workers should exit after cancellation");
    }
}
