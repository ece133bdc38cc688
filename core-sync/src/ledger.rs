//! # Dedup Ledger
//!
//! Tracks which remote files the pipeline already owns so a file listed by
//! several consecutive ticks is only dispatched once.
//!
//! ## Overview
//!
//! An id moves through three sets:
//! - **known**: admitted by the reconciler and not yet forgotten
//! - **completed**: the whole pipeline finished for it
//! - **released**: its download attempt was abandoned and should be retried
//!
//! [`DedupLedger::forget_completed`] drains *completed* and *released* and
//! drops those ids from *known* in one step, which makes them eligible for
//! rediscovery. Ids that neither complete nor get released (for example after
//! a permanent extraction failure) stay known for the life of the process.
//!
//! Nothing is persisted; a restart begins with an empty ledger.

use bridge_traits::storage::{FileId, RemoteFile};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Point-in-time set sizes, for logs and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub known: usize,
    pub completed: usize,
    pub released: usize,
}

impl LedgerSnapshot {
    pub fn is_empty(&self) -> bool {
        self.known == 0 && self.completed == 0 && self.released == 0
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Known ids with the file name they were admitted under
    known: HashMap<FileId, String>,
    /// Number of known ids per name
    names: HashMap<String, usize>,
    completed: HashSet<FileId>,
    released: HashSet<FileId>,
}

impl LedgerState {
    fn forget(&mut self, id: &FileId) {
        let Some(name) = self.known.remove(id) else {
            return;
        };
        if let Some(count) = self.names.get_mut(&name) {
            *count -= 1;
            if *count == 0 {
                self.names.remove(&name);
            }
        }
    }
}

/// Concurrency-safe record of in-flight and finished file ids
///
/// All sets sit behind one async mutex so every operation observes a
/// consistent view.
#[derive(Debug, Default)]
pub struct DedupLedger {
    state: Mutex<LedgerState>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_known(&self, id: &FileId) -> bool {
        self.state.lock().await.known.contains_key(id)
    }

    /// Record a file as owned by the pipeline.
    ///
    /// Returns `false` if the id was already known.
    pub async fn mark_known(&self, file: &RemoteFile) -> bool {
        let mut state = self.state.lock().await;
        if state.known.contains_key(&file.id) {
            return false;
        }
        state.known.insert(file.id.clone(), file.name.clone());
        *state.names.entry(file.name.clone()).or_default() += 1;
        true
    }

    /// Mark a known id as fully processed.
    ///
    /// Unknown ids are ignored and yield `false`.
    pub async fn mark_completed(&self, id: &FileId) -> bool {
        let mut state = self.state.lock().await;
        if !state.known.contains_key(id) {
            return false;
        }
        state.released.remove(id);
        state.completed.insert(id.clone())
    }

    /// Schedule a known id whose processing was abandoned for forgetting, so
    /// the next listing that still contains it retries it.
    pub async fn release(&self, id: &FileId) -> bool {
        let mut state = self.state.lock().await;
        if !state.known.contains_key(id) || state.completed.contains(id) {
            return false;
        }
        state.released.insert(id.clone())
    }

    /// Drain completed and released ids and drop them from the known set.
    ///
    /// Each id is returned by exactly one call.
    pub async fn forget_completed(&self) -> HashSet<FileId> {
        let mut state = self.state.lock().await;
        let mut forgotten = std::mem::take(&mut state.completed);
        forgotten.extend(std::mem::take(&mut state.released));
        for id in &forgotten {
            state.forget(id);
        }
        forgotten
    }

    /// Whether a known id was admitted under `name`.
    pub async fn name_in_flight(&self, name: &str) -> bool {
        self.state.lock().await.names.contains_key(name)
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.lock().await;
        LedgerSnapshot {
            known: state.known.len(),
            completed: state.completed.len(),
            released: state.released.len(),
        }
    }
}
