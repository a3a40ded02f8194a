//! # parstream
//!
//! **parstream** is a bounded-concurrency parallel task-execution engine:
//! it maps an async work function over a (possibly infinite, repeatable)
//! sequence of items on a fixed-size worker pool, caps the number of
//! in-flight tasks, and streams results back in completion order.
//!
//! ## Architecture
//! ```text
//!  items (re-iterable, × epochs)
//!     │
//!     ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Dispatcher (background task, one per invocation)             │
//! │  - acquires one Gate permit per item (outstanding ≤ workers)  │
//! │  - wraps item + work + permit into an opaque Job              │
//! │  - tracks every job in a wait-group for event-driven drain    │
//! └──────┬────────────────────────────────────────────────────────┘
//!        ▼ submit
//! ┌───────────────────────────────────────────────────────────────┐
//! │  WorkerPool (fixed size; private, injected, or shared)        │
//! │  - SpawnMode::Thread: dedicated named OS threads              │
//! │  - SpawnMode::Task:   tasks on the calling tokio runtime      │
//! │  - workers exit when the last pool handle drops               │
//! └──────┬────────────────────────────────────────────────────────┘
//!        ▼ Delivery::Item(Ok | Err)          (completion order)
//! ┌───────────────────────────────────────────────────────────────┐
//! │  ResultChannel (bounded mpsc, capacity = max_queue)           │
//! │  - Delivery::End(RunSummary) exactly once, after drain        │
//! └──────┬────────────────────────────────────────────────────────┘
//!        ▼
//!  ResultStream::recv() / futures::Stream          (the caller)
//! ```
//!
//! ## Lifecycle (per invocation)
//! ```text
//! Created → Dispatching → Draining → Drained → Closed
//! ```
//!
//! ## Guarantees
//! - At any instant, (submitted − completed-or-failed) ≤ `workers`.
//! - Backpressure flows through the gate: a slow consumer fills the result
//!   channel, which blocks completing jobs, which keep their permits, which
//!   stalls the dispatcher. The dispatcher never blocks on the channel.
//! - A failed, cancelled, or panicked task always returns its permit.
//! - End-of-stream is delivered exactly once, strictly after every result.
//! - Cancellation is cooperative: the engine sets a token, work functions
//!   honor it. Nothing is force-killed.
//!
//! ## Non-guarantees
//! Delivery order is completion order, not submission order. Failed tasks
//! are not retried. Tasks must be independent.
//!
//! ## Features
//! | Area            | Description                                           | Key types                              |
//! |-----------------|-------------------------------------------------------|----------------------------------------|
//! | **Mapping**     | Stream results of `work` over items, bounded in-flight| [`Engine::map`], [`ResultStream`]      |
//! | **Detached**    | Fire-and-forget with an advisory cancel deadline      | [`Engine::run_detached`]               |
//! | **Work**        | Async, cancelable per-item work functions             | [`Work`], [`WorkFn`], [`WorkRef`]      |
//! | **Pooling**     | Private, injected, or process-shared worker pools     | [`WorkerPool`], [`PoolHandle`]         |
//! | **Errors**      | Contained task errors vs fatal engine errors          | [`TaskError`], [`EngineError`]         |
//! | **Configuration**| Workers, queue depth, epochs, failure, spawn mode    | [`EngineConfig`]                       |
//!
//! ## Example
//! ```no_run
//! use parstream::{Engine, EngineConfig, TaskError, WorkFn, WorkRef};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() {
//!     let square: WorkRef<u64, (u64, u64)> =
//!         WorkFn::arc("square", |x: u64, _ctx: CancellationToken| async move {
//!             Ok::<_, TaskError>((x, x * x))
//!         });
//!
//!     let engine = Engine::new(EngineConfig {
//!         workers: 2,
//!         epochs: Some(1),
//!         ..EngineConfig::default()
//!     });
//!
//!     let mut stream = engine.map(square, 0..5u64);
//!     while let Some(result) = stream.recv().await {
//!         match result {
//!             Ok((x, sq)) => println!("{x}² = {sq}"),
//!             Err(err) => eprintln!("item failed: {err}"),
//!         }
//!     }
//! }
//! ```

mod config;
mod engine;
mod error;
mod pool;
mod work;

// ---- Public re-exports ----

pub use config::{EngineConfig, FailurePolicy, SpawnMode};
pub use engine::{
    parallel_map, DetachedReport, Engine, EngineBuilder, FlatStream, Phase, ResultStream,
    RunSummary,
};
pub use error::{EngineError, TaskError};
pub use pool::{PoolHandle, WorkerPool};
pub use work::{Work, WorkFn, WorkRef};
