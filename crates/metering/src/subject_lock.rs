//! Per-subject concurrency control.
//!
//! Serializes the check → commit window of the usage ledger so two
//! requests from the same subject cannot both pass a check against the
//! same stale record.  Different subjects never contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use cg_domain::error::{Error, Result};
use cg_domain::SubjectKey;

/// Idle entries are swept once the map grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

/// Each subject key maps to a `Semaphore(1)`.
pub struct SubjectLockMap {
    locks: Mutex<HashMap<SubjectKey, Arc<Semaphore>>>,
}

impl Default for SubjectLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SubjectLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `subject`.  Released when the permit
    /// is dropped.
    pub async fn acquire(&self, subject: &SubjectKey) -> Result<OwnedSemaphorePermit> {
        let sem = {
            let mut locks = self.locks.lock();
            if locks.len() >= PRUNE_THRESHOLD {
                prune_idle(&mut locks);
            }
            locks
                .entry(subject.clone())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        sem.acquire_owned()
            .await
            .map_err(|_| Error::Storage(format!("lock for {subject} was closed")))
    }

    /// Number of tracked subjects.
    pub fn subject_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop entries nobody holds or waits on.
    pub fn prune_idle(&self) {
        prune_idle(&mut self.locks.lock());
    }
}

fn prune_idle(locks: &mut HashMap<SubjectKey, Arc<Semaphore>>) {
    locks.retain(|_, sem| Arc::strong_count(sem) > 1 || sem.available_permits() == 0);
}
