//! # Dispatcher: gated submission, drain, and the termination protocol.
//!
//! The dispatcher drives one engine invocation. It iterates the input
//! sequence once per epoch, acquires a gate permit per item, wraps the item
//! into an opaque job, and hands the job to the worker pool. After the last
//! epoch it waits for every outstanding task (event-driven, via a
//! task-tracker wait-group), then delivers the terminal marker.
//!
//! ```text
//! for epoch in 0..epochs {            // None = unbounded
//!   for item in items.clone() {
//!     ├─► gate.acquire()              // bounds outstanding tasks
//!     ├─► build job:
//!     │     run work(item, token)     // panics caught at this boundary
//!     │     deliver Ok / Err per FailurePolicy
//!     │     drop permit               // releases the gate, always
//!     └─► pool.submit(tracked job)
//!   }
//! }
//! phase → Draining
//! tracker.close(); tracker.wait()     // zero outstanding tasks
//! phase → Drained, then Closed
//! results ◄── Delivery::End(summary)  // exactly once
//! ```
//!
//! ## Rules
//! - The invocation token is checked at the safe points (permit acquisition,
//!   loop tops); a cancelled invocation stops submitting but still drains.
//! - A submission failure (`PoolClosed`) is fatal: recorded in the summary,
//!   submission stops, drain still happens.
//! - An unbounded epoch count over a sequence that yields nothing terminates
//!   after the first empty pass instead of spinning forever.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::FailurePolicy;
use crate::error::TaskError;
use crate::pool::{Job, PoolHandle};
use crate::work::WorkRef;

use super::gate::Gate;
use super::phase::{Phase, PhaseCell};
use super::stream::{Delivery, RunSummary};

/// Drives submission and drain for one invocation.
pub(crate) struct Dispatcher<T: Send + 'static, R: Send + 'static> {
    work: WorkRef<T, R>,
    pool: PoolHandle,
    gate: Gate,
    /// `None` in detached mode: nothing consumes results.
    results: Option<mpsc::Sender<Delivery<R>>>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    phase: PhaseCell,
    epochs: Option<u64>,
    failure: FailurePolicy,
    failed: Arc<AtomicU64>,
}

impl<T: Send + 'static, R: Send + 'static> Dispatcher<T, R> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        work: WorkRef<T, R>,
        pool: PoolHandle,
        gate: Gate,
        results: Option<mpsc::Sender<Delivery<R>>>,
        cancel: CancellationToken,
        phase: PhaseCell,
        epochs: Option<u64>,
        failure: FailurePolicy,
    ) -> Self {
        Self {
            work,
            pool,
            gate,
            results,
            tracker: TaskTracker::new(),
            cancel,
            phase,
            epochs,
            failure,
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Full streaming-mode run: dispatch all epochs, drain, send `End`.
    ///
    /// Runs as a background tokio task so the caller consumes results
    /// concurrently with submission.
    pub(crate) async fn run<S>(mut self, items: S)
    where
        S: IntoIterator<Item = T> + Clone + Send + 'static,
        S::IntoIter: Send,
    {
        let mut summary = RunSummary::default();
        self.dispatch(items, &mut summary).await;
        self.drain().await;
        summary.failed = self.failed.load(Ordering::Relaxed);
        // Closed is published before the marker is sent; a consumer that has
        // seen end-of-stream therefore always reads the terminal phase.
        self.phase.advance(Phase::Closed);
        if let Some(results) = self.results.take() {
            let _ = results.send(Delivery::End(summary)).await;
        }
    }

    /// The epoch/submission loop. Does not drain.
    pub(crate) async fn dispatch<S>(&self, items: S, summary: &mut RunSummary)
    where
        S: IntoIterator<Item = T> + Clone + Send + 'static,
        S::IntoIter: Send,
    {
        self.phase.advance(Phase::Dispatching);

        let mut epoch: u64 = 0;
        'epochs: loop {
            if let Some(limit) = self.epochs {
                if epoch >= limit {
                    break;
                }
            }

            let mut submitted_this_epoch: u64 = 0;
            for item in items.clone() {
                let permit = tokio::select! {
                    permit = self.gate.acquire() => match permit {
                        Some(permit) => permit,
                        None => break 'epochs,
                    },
                    _ = self.cancel.cancelled() => break 'epochs,
                };

                let job = self.build_job(item, permit);
                if let Err(fault) = self.pool.submit(job).await {
                    log::error!("parstream: submission failed: {fault}");
                    summary.fault = Some(fault);
                    break 'epochs;
                }
                summary.submitted += 1;
                submitted_this_epoch += 1;
            }

            epoch += 1;
            summary.epochs = epoch;

            if self.cancel.is_cancelled() {
                break;
            }
            if self.epochs.is_none() && submitted_this_epoch == 0 {
                log::warn!(
                    "parstream: '{}' got an empty sequence with unbounded epochs; stopping",
                    self.work.name()
                );
                break;
            }
        }
    }

    /// Event-driven drain: resolves when zero tasks remain outstanding.
    pub(crate) async fn drain(&self) {
        self.phase.advance(Phase::Draining);
        self.tracker.close();
        self.tracker.wait().await;
        self.phase.advance(Phase::Drained);
    }

    /// Drain with an advisory deadline, for detached runs.
    ///
    /// If `wait` elapses before the wait-group empties, the shared token is
    /// cancelled (exactly once) and the drain continues. The deadline
    /// requests cancellation; it never enforces one. Returns whether
    /// cancellation was requested.
    pub(crate) async fn drain_with_timeout(&self, wait: Option<std::time::Duration>) -> bool {
        self.phase.advance(Phase::Draining);
        self.tracker.close();
        let mut cancel_requested = false;
        match wait {
            None => self.tracker.wait().await,
            Some(deadline) => {
                tokio::select! {
                    _ = self.tracker.wait() => {}
                    _ = tokio::time::sleep(deadline) => {
                        cancel_requested = true;
                        self.cancel.cancel();
                        self.tracker.wait().await;
                    }
                }
            }
        }
        self.phase.advance(Phase::Drained);
        cancel_requested
    }

    pub(crate) fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub(crate) fn phase_cell(&self) -> &PhaseCell {
        &self.phase
    }

    #[cfg(test)]
    pub(crate) fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Wraps one item into an opaque, tracked job.
    ///
    /// The job owns its permit; whichever way the work ends (value, error,
    /// panic, cancellation) the permit drops when the job future does.
    fn build_job(&self, item: T, permit: tokio::sync::OwnedSemaphorePermit) -> Job {
        let work = Arc::clone(&self.work);
        let results = self.results.clone();
        let token = self.cancel.clone();
        let failure = self.failure;
        let failed = Arc::clone(&self.failed);

        Job::new(self.tracker.track_future(async move {
            let outcome = match std::panic::AssertUnwindSafe(work.run(item, token))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(payload) => Err(TaskError::Panicked {
                    message: panic_message(payload.as_ref()),
                }),
            };

            match outcome {
                Ok(value) => {
                    if let Some(results) = &results {
                        // Suspends while the consumer lags; the held permit
                        // is what propagates backpressure to the dispatcher.
                        let _ = results.send(Delivery::Item(Ok(value))).await;
                    }
                }
                Err(err) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    match (&results, failure) {
                        (Some(results), FailurePolicy::Surface) => {
                            let _ = results.send(Delivery::Item(Err(err))).await;
                        }
                        _ => {
                            log::error!("parstream: task '{}' failed: {err}", work.name());
                        }
                    }
                }
            }
            drop(permit);
        }))
    }
}

/// Renders a caught panic payload for the error message.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
