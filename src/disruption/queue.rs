//! Reconcile work queue bookkeeping
//!
//! Deduplicates pending requests per namespace, serializes passes for the
//! same namespace, caps concurrent passes and tracks per-namespace backoff.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, ErrorAction, Result};

pub struct WorkQueue {
    pending: DashSet<String>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    backoffs: DashMap<String, ExponentialBackoff>,
    permits: Arc<Semaphore>,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl WorkQueue {
    pub fn new(workers: usize, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            pending: DashSet::new(),
            locks: DashMap::new(),
            backoffs: DashMap::new(),
            permits: Arc::new(Semaphore::new(workers.max(1))),
            initial_backoff,
            max_backoff,
        }
    }

    /// Mark a namespace pending; false if a pass is already waiting for it
    pub fn try_enqueue(&self, namespace: &str) -> bool {
        self.pending.insert(namespace.to_string())
    }

    /// Lock serializing passes for a namespace
    pub fn lock_for(&self, namespace: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the namespace lock once no pass holds or waits on it
    pub fn release(&self, namespace: &str) {
        self.locks
            .remove_if(namespace, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of namespaces with a live lock
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Clear the pending mark once a pass has started for the namespace
    pub fn started(&self, namespace: &str) {
        self.pending.remove(namespace);
    }

    pub fn is_pending(&self, namespace: &str) -> bool {
        self.pending.contains(namespace)
    }

    /// Wait for a free worker slot
    pub async fn permit(&self) -> Result<OwnedSemaphorePermit> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Internal(format!("worker pool closed: {}", e)))
    }

    /// Delay before retrying a failed pass, `None` if it must not be retried
    pub fn retry_delay(&self, namespace: &str, action: ErrorAction) -> Option<Duration> {
        match action {
            ErrorAction::NoRequeue => None,
            ErrorAction::RequeueAfter(delay) => Some(delay),
            ErrorAction::RequeueWithBackoff => {
                let mut backoff = self
                    .backoffs
                    .entry(namespace.to_string())
                    .or_insert_with(|| self.new_backoff());
                Some(backoff.next_backoff().unwrap_or(self.max_backoff))
            }
        }
    }

    /// Reset backoff after a successful pass
    pub fn forget(&self, namespace: &str) {
        self.backoffs.remove(namespace);
    }

    fn new_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}
