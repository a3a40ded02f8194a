//! Worker pool: fixed-size set of execution units running opaque jobs.
//!
//! Internal modules:
//! - [`job`]: the opaque unit of work handed to a worker;
//! - [`worker`]: the worker loop and per-platform worker initialization;
//! - [`pool`]: pool construction, submission, and the shared-pool guard.

mod job;
mod pool;
mod worker;

pub(crate) use job::Job;
pub use pool::{PoolHandle, WorkerPool};
