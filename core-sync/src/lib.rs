//! # Sync Pipeline
//!
//! Periodically mirrors the remote root folder to local disk.
//!
//! ## Overview
//!
//! Each tick lists the remote root and admits files the ledger has not seen.
//! A download stage has the remote service zip each file, streams the zip to
//! a staging directory and deletes the remote copy. An extract stage then
//! unpacks the archive into the destination tree. Stages are connected by
//! bounded queues, so a slow extractor throttles downloads, which in turn
//! throttles dispatch.
//!
//! ## Components
//!
//! - **Dedup Ledger** (`ledger`): Which ids are in flight, completed or released
//! - **Retry Schedules** (`retry`): Polling cadence and deadlines for remote calls
//! - **Stage Queues** (`queue`): Bounded hand-off and fixed-size worker pools
//! - **Tasks** (`task`): Per-file local paths and name validation
//! - **Download Stage** (`download`): Zip, poll, download, delete
//! - **Extract Stage** (`extract`): Unpack with bounded retry
//! - **Reconciler** (`reconcile`): One listing-and-dispatch tick
//! - **Sync Coordinator** (`coordinator`): Pool wiring and the tick loop

pub mod coordinator;
pub mod download;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod queue;
pub mod reconcile;
pub mod retry;
pub mod task;

pub use coordinator::{PipelineHandle, SyncConfig, SyncCoordinator};
pub use download::DownloadStage;
pub use error::{Result, SyncError};
pub use extract::{ExtractRetry, ExtractStage};
pub use ledger::{DedupLedger, LedgerSnapshot};
pub use queue::{stage_queue, StageReceiver, StageSender, StageWorker, WorkerPool};
pub use reconcile::{Reconciler, TickReport};
pub use retry::{call_remote, run_with_schedule, Attempt, RemotePolicies, RetrySchedule};
pub use task::{validate_name, ExtractJob, PathLayout, PipelineTask};
