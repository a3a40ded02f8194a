//! The opaque unit of work executed by a pool worker.

use std::future::Future;

use futures::future::BoxFuture;

/// A boxed future handed to the pool for execution.
///
/// The dispatcher builds the whole job (work invocation, panic containment,
/// result delivery, permit release) into this future before submission, so
/// workers stay generic over item and result types.
pub(crate) struct Job {
    fut: BoxFuture<'static, ()>,
}

impl Job {
    pub(crate) fn new(fut: impl Future<Output = ()> + Send + 'static) -> Self {
        Self { fut: Box::pin(fut) }
    }

    pub(crate) async fn run(self) {
        self.fut.await;
    }
}
