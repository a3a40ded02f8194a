//! # Result delivery: channel protocol and the consuming stream.
//!
//! Completed results cross from the workers to the consumer over one bounded
//! mpsc channel per invocation, carrying [`Delivery`] values:
//!
//! ```text
//! worker ──► Delivery::Item(Ok(value))       completed task
//! worker ──► Delivery::Item(Err(TaskError))  failed task (Surface policy)
//! dispatcher ──► Delivery::End(RunSummary)   exactly once, after drain
//! ```
//!
//! ## Rules
//! - `End` is sent only after the drain wait-group confirms zero outstanding
//!   tasks, so every `Item` precedes it.
//! - After `End`, [`ResultStream::recv`] returns `None` forever and the
//!   summary becomes available.
//! - A channel that closes without `End` means the dispatcher died; the
//!   stream terminates with no summary rather than hanging.
//! - Dropping the stream cancels the invocation token, which stops an
//!   infinite dispatcher instead of leaking it.
//!
//! The consumer side never throttles: backpressure is entirely the gate's
//! job upstream. Delivery order is completion order, not submission order.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, TaskError};

use super::phase::Phase;

/// One message on the result channel.
pub(crate) enum Delivery<R> {
    /// A completed task's outcome.
    Item(Result<R, TaskError>),
    /// Terminal marker; nothing follows it.
    End(RunSummary),
}

/// Counters the dispatcher observed for one invocation.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Tasks handed to the pool.
    pub submitted: u64,
    /// Tasks that finished with a [`TaskError`] (including panics and
    /// cooperative cancellations).
    pub failed: u64,
    /// Completed passes over the input sequence.
    pub epochs: u64,
    /// Fatal error that aborted submission early, if any.
    pub fault: Option<EngineError>,
}

/// Lazy consumer of one engine invocation.
///
/// Yields `Result<R, TaskError>` items in completion order until the
/// end-of-stream marker, then `None`. Also usable as a [`futures::Stream`].
pub struct ResultStream<R> {
    rx: mpsc::Receiver<Delivery<R>>,
    phase: watch::Receiver<Phase>,
    cancel: CancellationToken,
    summary: Option<RunSummary>,
    done: bool,
}

impl<R> ResultStream<R> {
    pub(crate) fn new(
        rx: mpsc::Receiver<Delivery<R>>,
        phase: watch::Receiver<Phase>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rx,
            phase,
            cancel,
            summary: None,
            done: false,
        }
    }

    /// Receives the next completed result, or `None` at end of stream.
    pub async fn recv(&mut self) -> Option<Result<R, TaskError>> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(Delivery::Item(res)) => Some(res),
            Some(Delivery::End(summary)) => {
                self.summary = Some(summary);
                self.finish();
                None
            }
            None => {
                // Dispatcher gone without a terminal marker.
                self.finish();
                None
            }
        }
    }

    /// Requests cooperative cancellation of the invocation.
    ///
    /// In-flight tasks keep running until they observe the token; already
    /// completed results stay receivable, and the stream still terminates
    /// with its end-of-stream marker after drain.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Current phase of the invocation's state machine.
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Run counters; available once the stream has ended.
    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    /// Adapts the stream to yield the elements inside each result.
    ///
    /// The typed replacement for the original helper's `yield_flat` flag:
    /// a work function returning, say, `Vec<Frame>` becomes a stream of
    /// `Frame`s. Elements of one result are yielded in their own order;
    /// across results the order remains completion order.
    pub fn flatten_items(self) -> FlatStream<R>
    where
        R: IntoIterator,
    {
        FlatStream {
            inner: self,
            pending: VecDeque::new(),
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.rx.close();
    }
}

impl<R> Stream for ResultStream<R> {
    type Item = Result<R, TaskError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match std::task::ready!(this.rx.poll_recv(cx)) {
            Some(Delivery::Item(res)) => Poll::Ready(Some(res)),
            Some(Delivery::End(summary)) => {
                this.summary = Some(summary);
                this.finish();
                Poll::Ready(None)
            }
            None => {
                this.finish();
                Poll::Ready(None)
            }
        }
    }
}

impl<R> Drop for ResultStream<R> {
    fn drop(&mut self) {
        // An abandoned consumer must not leave an infinite dispatcher
        // spinning; the dispatcher drains and exits once it sees the token.
        self.cancel.cancel();
    }
}

/// [`ResultStream`] adapter that unpacks each result into its elements.
pub struct FlatStream<R: IntoIterator> {
    inner: ResultStream<R>,
    pending: VecDeque<R::Item>,
}

impl<R: IntoIterator> FlatStream<R> {
    /// Receives the next element, crossing into the next result as needed.
    pub async fn recv(&mut self) -> Option<Result<R::Item, TaskError>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(Ok(item));
            }
            match self.inner.recv().await? {
                Ok(result) => self.pending.extend(result),
                Err(err) => return Some(Err(err)),
            }
        }
    }

    /// Run counters of the underlying stream, once ended.
    pub fn summary(&self) -> Option<&RunSummary> {
        self.inner.summary()
    }
}

impl<R: IntoIterator> Stream for FlatStream<R>
where
    R::Item: Unpin,
    R: Unpin,
{
    type Item = Result<R::Item, TaskError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }
            match std::task::ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(result)) => this.pending.extend(result),
                Some(Err(err)) => return Poll::Ready(Some(Err(err))),
                None => return Poll::Ready(None),
            }
        }
    }
}
