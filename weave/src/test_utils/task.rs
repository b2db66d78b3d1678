use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::concurrency::cancel::CancelToken;
use crate::error::{ErrorKind, WeaveError, WeaveResult};
use crate::weave_error;
use crate::workers::pool::WorkerPool;

/// Counts task executions across a test.
#[derive(Debug, Clone, Default)]
pub struct TaskCounter {
    count: Arc<AtomicUsize>,
}

impl TaskCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of recorded executions.
    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Records one execution.
    pub fn record(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Submits a task recording one execution on success.
    pub async fn submit_to(&self, pool: &WorkerPool, token: &CancelToken) -> WeaveResult<()> {
        let counter = self.clone();
        pool.submit(token, move |_| async move {
            counter.record();
            Ok(())
        })
        .await
    }
}

/// Submits a task that returns a [`ErrorKind::TaskFailed`] error.
pub async fn submit_failing(pool: &WorkerPool, token: &CancelToken) -> WeaveResult<()> {
    pool.submit(token, |_| async {
        Err::<(), WeaveError>(weave_error!(ErrorKind::TaskFailed, "Test task failed"))
    })
    .await
}

/// Submits a task that panics.
pub async fn submit_panicking(pool: &WorkerPool, token: &CancelToken) -> WeaveResult<()> {
    pool.submit(token, |_| async { panic_task() }).await
}

fn panic_task() -> WeaveResult<()> {
    panic!("test task panicked");
}

/// Submits a task that sleeps for `duration` or until the pool token fires.
pub async fn submit_sleeping(
    pool: &WorkerPool,
    token: &CancelToken,
    duration: Duration,
) -> WeaveResult<()> {
    pool.submit(token, move |pool_token| async move {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            cause = pool_token.cancelled() => Err(WeaveError::from(cause)),
        }
    })
    .await
}
