//! # Retry Schedules
//!
//! Polling and retry policy for remote calls, split into a pure schedule and
//! an async driver.
//!
//! ## Overview
//!
//! A [`RetrySchedule`] only answers "how long until the next attempt, if
//! any" via [`RetrySchedule::next_delay`]. [`run_with_schedule`] owns the
//! clock: it sleeps, runs attempts, and races the whole loop against the
//! schedule's deadline and a cancellation token.
//!
//! ## Presets
//!
//! | Schedule | First attempt | Interval | Deadline |
//! |---|---|---|---|
//! | [`RetrySchedule::archive_poll`] | immediate | 1 s | 60 s |
//! | [`RetrySchedule::remote_delete`] | immediate | 5 s | 60 s |

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};
use bridge_traits::error::BridgeError;

/// Fixed-interval schedule bounded by an overall deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySchedule {
    /// Delay before the first attempt
    pub initial_delay: Duration,
    /// Delay between subsequent attempts
    pub interval: Duration,
    /// Budget for the whole sequence, attempts included
    pub deadline: Duration,
}

impl RetrySchedule {
    pub const fn new(initial_delay: Duration, interval: Duration, deadline: Duration) -> Self {
        Self {
            initial_delay,
            interval,
            deadline,
        }
    }

    /// Poll an archive job until its download URL appears
    pub const fn archive_poll() -> Self {
        Self::new(Duration::ZERO, Duration::from_secs(1), Duration::from_secs(60))
    }

    /// Retry deleting a remote file until it succeeds
    pub const fn remote_delete() -> Self {
        Self::new(Duration::ZERO, Duration::from_secs(5), Duration::from_secs(60))
    }

    /// Delay before attempt number `attempt` (0-based), given the time spent
    /// so far. `None` once that attempt could not start before the deadline.
    pub fn next_delay(&self, attempt: u32, elapsed: Duration) -> Option<Duration> {
        let delay = if attempt == 0 {
            self.initial_delay
        } else {
            self.interval
        };

        match elapsed.checked_add(delay) {
            Some(start) if start < self.deadline => Some(delay),
            _ => None,
        }
    }
}

/// Result of one attempt inside [`run_with_schedule`]
#[derive(Debug)]
pub enum Attempt<T> {
    /// Finished; stop with this value
    Done(T),
    /// Not there yet; try again on schedule
    Pending,
    /// Unrecoverable; stop with this error
    Failed(SyncError),
}

/// Drive `attempt_fn` according to `schedule`.
///
/// Returns [`SyncError::Timeout`] when the deadline passes (including while an
/// attempt is in flight) and [`SyncError::Cancelled`] as soon as `cancel`
/// fires.
pub async fn run_with_schedule<T, F, Fut>(
    schedule: &RetrySchedule,
    operation: &'static str,
    cancel: &CancellationToken,
    mut attempt_fn: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let timed_out = || SyncError::Timeout {
        operation,
        secs: schedule.deadline.as_secs(),
    };

    let started = Instant::now();
    let attempts = async {
        let mut attempt = 0u32;
        loop {
            let Some(delay) = schedule.next_delay(attempt, started.elapsed()) else {
                return Err(timed_out());
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match attempt_fn(attempt).await {
                Attempt::Done(value) => return Ok(value),
                Attempt::Pending => attempt += 1,
                Attempt::Failed(error) => return Err(error),
            }
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        outcome = tokio::time::timeout(schedule.deadline, attempts) => {
            outcome.unwrap_or_else(|_| Err(timed_out()))
        }
    }
}

/// Run a single remote call under a timeout and a cancellation token.
pub async fn call_remote<T, Fut>(
    operation: &'static str,
    timeout: Duration,
    cancel: &CancellationToken,
    call: Fut,
) -> Result<T>
where
    Fut: Future<Output = std::result::Result<T, BridgeError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        outcome = tokio::time::timeout(timeout, call) => match outcome {
            Ok(result) => result.map_err(|e| SyncError::remote(operation, e)),
            Err(_) => Err(SyncError::Timeout {
                operation,
                secs: timeout.as_secs(),
            }),
        },
    }
}

/// Timeouts and schedules applied to every remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemotePolicies {
    /// Budget for a single gateway call
    pub call_timeout: Duration,
    pub archive_poll: RetrySchedule,
    pub remote_delete: RetrySchedule,
    /// Budget for streaming one archive to disk
    pub download_timeout: Duration,
}

impl Default for RemotePolicies {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            archive_poll: RetrySchedule::archive_poll(),
            remote_delete: RetrySchedule::remote_delete(),
            download_timeout: Duration::from_secs(2 * 60 * 60),
        }
    }
}
