//! # WorkerPool: fixed set of worker execution units.
//!
//! [`WorkerPool`] owns the injector side of a bounded job channel; each
//! worker holds a cloned receiver and pulls jobs until the channel closes.
//! The cloneable receiver means no mutex guards the queue, and an idle
//! worker never starves the others.
//!
//! ```text
//!  submit(job) ──► [injector: bounded async channel]
//!                        │ (Receiver is Clone)
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!       worker 0      worker 1  ...  worker N-1
//!    (thread/task)  (thread/task)  (thread/task)
//! ```
//!
//! ## Lifecycle
//! - Created by [`WorkerPool::start`] (private pool) or
//!   [`WorkerPool::ensure_shared`] (process-wide lazy singleton behind a
//!   one-time initialization guard).
//! - Torn down when the last [`PoolHandle`] drops (or [`WorkerPool::close`]
//!   is called): the injector closes and every worker's loop ends after its
//!   current job. Workers can never outlive their owner.
//!
//! ## Sharing
//! `ensure_shared` keeps the quirk of the helper this engine descends from:
//! the first caller sizes the pool, and **later calls with a different
//! worker count get the existing pool unchanged**. Permits and channels are
//! always private per invocation; only the execution units are shared.

use std::sync::{Arc, OnceLock};

use crate::config::{EngineConfig, SpawnMode};
use crate::error::EngineError;

use super::worker;
use super::Job;

/// Shared, cheaply clonable handle to a worker pool.
pub type PoolHandle = Arc<WorkerPool>;

/// Process-wide pool used by [`WorkerPool::ensure_shared`].
static SHARED: OnceLock<PoolHandle> = OnceLock::new();

/// A fixed-size pool of worker execution units.
pub struct WorkerPool {
    injector: async_channel::Sender<Job>,
    workers: usize,
    spawn: SpawnMode,
}

impl WorkerPool {
    /// Starts a private pool with `cfg.workers` execution units.
    ///
    /// Must be called from within a tokio runtime: `SpawnMode::Task` workers
    /// are spawned onto it, and `SpawnMode::Thread` workers drive their jobs
    /// through a handle to it.
    pub fn start(cfg: &EngineConfig) -> Result<PoolHandle, EngineError> {
        let workers = cfg.workers_clamped();
        let (injector, jobs) = async_channel::bounded::<Job>(workers);

        match cfg.spawn {
            SpawnMode::Task => {
                for _ in 0..workers {
                    tokio::spawn(worker::worker_loop(jobs.clone()));
                }
            }
            SpawnMode::Thread => {
                let handle = tokio::runtime::Handle::current();
                for i in 0..workers {
                    let jobs = jobs.clone();
                    let handle = handle.clone();
                    std::thread::Builder::new()
                        .name(format!("parstream-worker-{i}"))
                        .spawn(move || {
                            worker::mask_interrupts();
                            handle.block_on(worker::worker_loop(jobs));
                        })
                        .map_err(|source| EngineError::WorkerSpawn { source })?;
                }
            }
        }

        Ok(Arc::new(Self {
            injector,
            workers,
            spawn: cfg.spawn,
        }))
    }

    /// Returns the process-wide shared pool, starting it on first call.
    ///
    /// The first caller's configuration sizes the pool; later callers get
    /// the existing pool even if their `cfg.workers` differs. Use
    /// [`WorkerPool::start`] when that surprise is unacceptable.
    pub fn ensure_shared(cfg: &EngineConfig) -> Result<PoolHandle, EngineError> {
        if let Some(pool) = SHARED.get() {
            return Ok(Arc::clone(pool));
        }
        let pool = Self::start(cfg)?;
        // Two racing first callers both start a pool; the loser's handle is
        // dropped here and its workers wind down on their own.
        Ok(Arc::clone(SHARED.get_or_init(|| pool)))
    }

    /// Sends one job to the pool.
    ///
    /// Suspends while every worker is busy and the injector is full; fails
    /// with [`EngineError::PoolClosed`] once the pool has shut down.
    pub(crate) async fn submit(&self, job: Job) -> Result<(), EngineError> {
        self.injector
            .send(job)
            .await
            .map_err(|_| EngineError::PoolClosed)
    }

    /// Number of worker execution units.
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// The spawn mode this pool was started with.
    pub fn spawn_mode(&self) -> SpawnMode {
        self.spawn
    }

    /// Closes the injector; workers exit after their current job.
    ///
    /// Dropping the last handle has the same effect.
    pub fn close(&self) {
        self.injector.close();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("spawn", &self.spawn)
            .field("closed", &self.injector.is_closed())
            .finish()
    }
}
