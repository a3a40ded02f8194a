//! Error types used by the parstream engine and work functions.
//!
//! This module defines two main error enums:
//!
//! - [`EngineError`]: errors raised by the execution engine itself.
//! - [`TaskError`]: errors raised by individual task executions.
//!
//! The split mirrors the containment policy: a `TaskError` is scoped to one
//! item (the permit is returned, the stream keeps going), while an
//! `EngineError` is fatal to the whole invocation.
//!
//! Both types provide an `as_label` helper for logging/metrics.

use thiserror::Error;

/// # Errors fatal to an engine invocation.
///
/// When one of these occurs the dispatcher stops submitting, drains whatever
/// is already in flight, and reports the fault through the run summary (or
/// the return value of `run_detached`).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EngineError {
    /// The worker pool has shut down; no further submissions are possible.
    #[error("worker pool is closed; submission rejected")]
    PoolClosed,

    /// A dedicated worker thread could not be spawned.
    #[error("failed to spawn worker thread: {source}")]
    WorkerSpawn {
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use parstream::EngineError;
    ///
    /// assert_eq!(EngineError::PoolClosed.as_label(), "engine_pool_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::PoolClosed => "engine_pool_closed",
            EngineError::WorkerSpawn { .. } => "engine_worker_spawn",
        }
    }
}

/// # Errors produced by task execution.
///
/// These represent failures of individual items. They never terminate the
/// engine: the failed task's permit is always returned, and the error is
/// either delivered through the result stream or logged, depending on the
/// configured [`FailurePolicy`](crate::FailurePolicy).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// The work function returned an error for this item.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The work function panicked; the panic was caught at the job boundary
    /// and never unwinds a worker.
    #[error("work function panicked: {message}")]
    Panicked {
        /// Panic payload rendered as a message, if it was a string.
        message: String,
    },

    /// The work function observed the cancellation token and exited early.
    #[error("cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand constructor for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use parstream::TaskError;
    ///
    /// assert_eq!(TaskError::fail("boom").as_label(), "task_failed");
    /// assert_eq!(TaskError::Canceled.as_label(), "task_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::Canceled => "task_canceled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(EngineError::PoolClosed.as_label(), "engine_pool_closed");
        assert_eq!(
            TaskError::Panicked {
                message: "x".into()
            }
            .as_label(),
            "task_panicked"
        );
    }

    #[test]
    fn test_fail_constructor_keeps_message() {
        let err = TaskError::fail("disk on fire");
        assert_eq!(err.to_string(), "execution failed: disk on fire");
    }
}
