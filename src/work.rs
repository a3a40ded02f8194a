//! # Work abstraction and function-backed implementation.
//!
//! This module defines the [`Work`] trait (async, cancelable, per-item) and a
//! convenient function-backed implementation [`WorkFn`]. The common handle
//! type is [`WorkRef`], an `Arc<dyn Work>` suitable for sharing across the
//! dispatcher and every worker.
//!
//! A work function receives one input item plus a [`CancellationToken`] and
//! should periodically check the token to stop cooperatively: the engine
//! never preempts an in-flight task, it only requests cancellation.
//!
//! Extra arguments that the work function needs for every item are bound at
//! construction time: captured by the closure passed to [`WorkFn`], or held
//! as fields of a custom [`Work`] implementor.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Shared handle to a work function.
pub type WorkRef<T, R> = Arc<dyn Work<T, Output = R>>;

/// # Asynchronous, cancelable per-item work.
///
/// `run` is called once per input item, concurrently from up to
/// `workers` tasks at a time. Implementations that can run for a long time
/// should check `ctx.is_cancelled()` and return [`TaskError::Canceled`]
/// promptly; the token is advisory and is the only cancellation mechanism
/// the engine provides.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use parstream::{TaskError, Work};
///
/// struct Square;
///
/// #[async_trait]
/// impl Work<u64> for Square {
///     type Output = (u64, u64);
///
///     async fn run(&self, item: u64, _ctx: CancellationToken) -> Result<(u64, u64), TaskError> {
///         Ok((item, item * item))
///     }
/// }
/// ```
#[async_trait]
pub trait Work<T: Send + 'static>: Send + Sync + 'static {
    /// Result produced for one input item.
    type Output: Send + 'static;

    /// Returns a stable, human-readable name used in logs.
    fn name(&self) -> &str {
        "work"
    }

    /// Processes one item until completion or cooperative cancellation.
    async fn run(&self, item: T, ctx: CancellationToken) -> Result<Self::Output, TaskError>;
}

/// Function-backed work implementation.
///
/// Wraps a closure that *creates* a new future per item, so there is no
/// shared mutable state between concurrent invocations. Shared state, when
/// needed, goes through an explicit `Arc` inside the closure.
///
/// ## Example
/// ```
/// use tokio_util::sync::CancellationToken;
/// use parstream::{TaskError, WorkFn, WorkRef};
///
/// let w: WorkRef<u64, u64> = WorkFn::arc("double", |x: u64, _ctx: CancellationToken| async move {
///     Ok::<_, TaskError>(x * 2)
/// });
/// assert_eq!(w.name(), "double");
/// ```
#[derive(Debug)]
pub struct WorkFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> WorkFn<F> {
    /// Creates a new function-backed work item.
    ///
    /// Prefer [`WorkFn::arc`] when you immediately need a [`WorkRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the work item and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<T, R, F, Fut> Work<T> for WorkFn<F>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, TaskError>> + Send + 'static,
{
    type Output = R;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, item: T, ctx: CancellationToken) -> Result<R, TaskError> {
        (self.f)(item, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_work_fn_runs_closure() {
        let w: WorkRef<u64, u64> =
            WorkFn::arc("inc", |x: u64, _ctx: CancellationToken| async move {
                Ok::<_, TaskError>(x + 1)
            });
        let out = w.run(41, CancellationToken::new()).await;
        assert_eq!(out.ok(), Some(42));
    }

    #[tokio::test]
    async fn test_work_fn_honors_token() {
        let w: WorkRef<(), ()> = WorkFn::arc("cancelable", |_: (), ctx: CancellationToken| {
            async move {
                if ctx.is_cancelled() {
                    return Err(TaskError::Canceled);
                }
                Ok(())
            }
        });
        let token = CancellationToken::new();
        token.cancel();
        let out = w.run((), token).await;
        assert!(matches!(out, Err(TaskError::Canceled)));
    }
}
