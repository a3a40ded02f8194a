//! # Detached (fire-and-forget) execution.
//!
//! [`run_detached`](crate::Engine::run_detached) dispatches every item and
//! waits for drain, delivering no results. Completion is tracked purely by
//! the wait-group; the only feedback is the returned [`DetachedReport`] and
//! error logs from failed tasks.
//!
//! The distinguishing feature is the advisory deadline: when the optional
//! wall-clock wait elapses before drain, the invocation's shared
//! cancellation token is set exactly once. Every task received that token;
//! a cooperating work function checks it and exits early, which is what
//! makes the deadline effective. The engine never force-kills a worker, and
//! the call returns only once drain completes, cancelled or not.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::pool::WorkerPool;
use crate::work::WorkRef;

use super::dispatcher::Dispatcher;
use super::gate::Gate;
use super::phase::{Phase, PhaseCell};
use super::stream::RunSummary;

/// Outcome of a detached run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DetachedReport {
    /// Tasks handed to the pool.
    pub submitted: u64,
    /// Tasks that finished with an error (logged, not delivered).
    pub failed: u64,
    /// Whether the wait deadline elapsed and cancellation was requested.
    pub cancel_requested: bool,
}

/// One detached invocation: private pool and gate, single pass over `items`.
pub(crate) async fn run_detached<T, R, S>(
    cfg: &EngineConfig,
    cancel: CancellationToken,
    work: WorkRef<T, R>,
    items: S,
    wait: Option<Duration>,
) -> Result<DetachedReport, EngineError>
where
    T: Send + 'static,
    R: Send + 'static,
    S: IntoIterator<Item = T> + Clone + Send + 'static,
    S::IntoIter: Send,
{
    let pool = WorkerPool::start(cfg)?;
    let gate = Gate::new(cfg.workers_clamped());
    let (phase, _phase_rx) = PhaseCell::new();

    let dispatcher = Dispatcher::<T, R>::new(
        work,
        pool.clone(),
        gate,
        None,
        cancel,
        phase,
        Some(1),
        cfg.failure,
    );

    let mut summary = RunSummary::default();
    dispatcher.dispatch(items, &mut summary).await;
    let cancel_requested = dispatcher.drain_with_timeout(wait).await;
    dispatcher.phase_cell().advance(Phase::Closed);
    pool.close();

    if let Some(fault) = summary.fault {
        return Err(fault);
    }
    Ok(DetachedReport {
        submitted: summary.submitted,
        failed: dispatcher.failed_count(),
        cancel_requested,
    })
}
