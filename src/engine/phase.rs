//! # Invocation state machine.
//!
//! Every engine invocation moves through the same one-way sequence:
//!
//! ```text
//! Created → Dispatching → Draining → Drained → Closed
//! ```
//!
//! - **Created**: handles built, dispatcher not yet running
//! - **Dispatching**: the epoch loop is submitting items
//! - **Draining**: submission finished, outstanding tasks > 0 possible
//! - **Drained**: the wait-group confirmed zero outstanding tasks
//! - **Closed**: the end-of-stream marker was delivered / `run_detached`
//!   is about to return
//!
//! No transition skips Draining (it may just be instantaneous), and Closed
//! is terminal. The phase is published through a `watch` channel so the
//! consumer side can observe it without synchronizing with the dispatcher.

use tokio::sync::watch;

/// Lifecycle phase of one engine invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Handles are built; the dispatcher has not started.
    Created,
    /// The epoch loop is actively submitting items.
    Dispatching,
    /// Submission is done; waiting for outstanding tasks.
    Draining,
    /// Zero outstanding tasks remain.
    Drained,
    /// The end-of-stream marker has been delivered. Terminal.
    Closed,
}

/// Writer side of the phase machine, held by the dispatcher.
#[derive(Debug)]
pub(crate) struct PhaseCell {
    tx: watch::Sender<Phase>,
}

impl PhaseCell {
    pub(crate) fn new() -> (Self, watch::Receiver<Phase>) {
        let (tx, rx) = watch::channel(Phase::Created);
        (Self { tx }, rx)
    }

    /// Moves the machine forward. Backward or repeated transitions are
    /// ignored, which keeps the published sequence monotonic even if two
    /// code paths race to report the same phase.
    pub(crate) fn advance(&self, next: Phase) {
        self.tx.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
    }
}
