//! # Concurrency gate: counting permits over the worker pool.
//!
//! [`Gate`] bounds the number of outstanding tasks (dispatched but not yet
//! completed) to the worker count. The dispatcher acquires one owned permit
//! per item before submission; the permit travels inside the job future and
//! is released when the future is dropped, so a task that fails, is
//! cancelled, or panics still returns its permit and the gate can never be
//! permanently depleted.
//!
//! [`Gate::available`] exists for diagnostics and invariant tests only.
//! Drain detection is event-driven (a task-tracker wait-group), never a poll
//! of this counter.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting permit gate sized to the worker count.
#[derive(Clone, Debug)]
pub(crate) struct Gate {
    sem: Arc<Semaphore>,
    capacity: usize,
}

impl Gate {
    /// Creates a gate with `capacity` permits (clamped to at least 1).
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sem: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Acquires one permit, suspending until a worker slot frees up.
    ///
    /// Returns `None` only if the semaphore has been closed, which the
    /// engine itself never does; callers treat it as a stop signal.
    pub(crate) async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.sem).acquire_owned().await.ok()
    }

    /// Permits not currently held by outstanding tasks.
    pub(crate) fn available(&self) -> usize {
        self.sem.available_permits()
    }

    /// Total permits; equals the worker count of the invocation.
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}
