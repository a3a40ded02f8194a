//! # Engine configuration.
//!
//! Provides [`EngineConfig`], the centralized settings for an engine and the
//! worker pools it creates.
//!
//! Config is used in two ways:
//! 1. **Engine creation**: `Engine::builder(config).build()`
//! 2. **Pool creation**: `WorkerPool::start(&config)` / `WorkerPool::ensure_shared(&config)`
//!
//! ## Sentinel values
//! - `workers = 0` → clamped to 1 (a pool always has at least one worker)
//! - `max_queue = 0` → clamped to 1 (the result channel must hold the
//!   end-of-stream marker)
//! - `epochs = None` → the input sequence is repeated indefinitely

/// How worker execution units are created.
///
/// The original helper this engine descends from distinguished fresh
/// ("spawn") worker processes from copy-on-write ("fork") ones. In-process,
/// the analogous choice is between a dedicated OS thread per worker and a
/// task on the shared async runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpawnMode {
    /// One dedicated, named OS thread per worker (fresh stack, visible in
    /// thread listings, runs truly in parallel). On Unix the thread masks
    /// `SIGINT` at startup so interrupt-driven shutdown coordination stays
    /// on the parent thread.
    #[default]
    Thread,
    /// One task per worker on the calling tokio runtime (shares the parent's
    /// executor and scheduler state).
    Task,
}

/// What to do with a failed task's result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Deliver the failure as an `Err` item through the result stream,
    /// letting the consumer decide whether to skip or surface it.
    #[default]
    Surface,
    /// Drop the result and log the error. Reproduces the silent-loss
    /// behavior of the original helper; the stream only shows the absence
    /// of a result for the failed item.
    Discard,
}

/// Configuration for the parallel execution engine.
///
/// Defines:
/// - **Concurrency**: worker count, which is also the in-flight task cap
/// - **Backpressure**: result channel capacity
/// - **Iteration**: how many times the input sequence is replayed
/// - **Failure handling**: surface or discard failed results
/// - **Worker creation**: dedicated threads vs runtime tasks
///
/// ## Field semantics
/// - `workers`: pool size and gate capacity (`0` is clamped to 1)
/// - `max_queue`: result channel capacity (`0` is clamped to 1)
/// - `epochs`: `None` = repeat the input forever, `Some(n)` = n passes
/// - `failure`: see [`FailurePolicy`]
/// - `spawn`: see [`SpawnMode`]
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Number of worker execution units. Also the maximum number of
    /// outstanding (submitted, not yet completed) tasks.
    pub workers: usize,

    /// Capacity of the result channel. A full channel blocks the completing
    /// worker, which keeps holding its permit; backpressure reaches the
    /// dispatcher through the gate, never through the channel directly.
    pub max_queue: usize,

    /// Number of passes over the input sequence. `None` repeats forever;
    /// the sequence must be re-iterable (`Clone`).
    pub epochs: Option<u64>,

    /// Delivery policy for failed tasks.
    pub failure: FailurePolicy,

    /// Worker execution-unit creation strategy.
    pub spawn: SpawnMode,
}

impl EngineConfig {
    /// Returns the worker count clamped to a minimum of 1.
    #[inline]
    pub fn workers_clamped(&self) -> usize {
        self.workers.max(1)
    }

    /// Returns the result channel capacity clamped to a minimum of 1.
    #[inline]
    pub fn max_queue_clamped(&self) -> usize {
        self.max_queue.max(1)
    }
}

impl Default for EngineConfig {
    /// Default configuration:
    ///
    /// - `workers = 4`
    /// - `max_queue = 256`
    /// - `epochs = None` (repeat forever)
    /// - `failure = FailurePolicy::Surface`
    /// - `spawn = SpawnMode::Thread`
    fn default() -> Self {
        Self {
            workers: 4,
            max_queue: 256,
            epochs: None,
            failure: FailurePolicy::default(),
            spawn: SpawnMode::default(),
        }
    }
}
