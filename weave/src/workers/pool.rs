use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::counter;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use weave_config::shared::PoolConfig;

use crate::{bail, weave_error};
use crate::concurrency::cancel::CancelToken;
use crate::concurrency::channel::{ChannelError, ChannelRx, ChannelTx, SharedRx, bounded};
use crate::concurrency::counter::{AtomicCounter, Counter};
use crate::concurrency::signal::{SignalRx, SignalTx, create_signal};
use crate::error::{ErrorKind, WeaveError, WeaveResult};
use crate::metrics::{OUTCOME_LABEL, WEAVE_POOL_SUBMISSIONS_TOTAL, WEAVE_POOL_TASKS_TOTAL};

/// Unit of work executed by a [`WorkerPool`].
///
/// The task receives the pool's cancellation token and is executed exactly once.
pub type Task = Box<dyn FnOnce(CancelToken) -> BoxFuture<'static, WeaveResult<()>> + Send>;

/// Snapshot of the task outcomes recorded by a [`WorkerPool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Tasks that returned `Ok(())`.
    pub completed: u64,
    /// Tasks that returned an error.
    pub failed: u64,
    /// Tasks that panicked.
    pub panicked: u64,
}

impl PoolStats {
    /// Returns the number of tasks that finished, whatever their outcome.
    pub fn total(&self) -> u64 {
        self.completed + self.failed + self.panicked
    }
}

#[derive(Debug, Default)]
struct PoolCounters {
    completed: AtomicCounter,
    failed: AtomicCounter,
    panicked: AtomicCounter,
}

#[derive(Debug)]
struct WorkerPoolInner {
    token: CancelToken,
    worker_count: usize,
    submissions: ChannelTx<Task>,
    close_tx: SignalTx,
    join_set: Mutex<JoinSet<()>>,
    counters: Arc<PoolCounters>,
}

/// Cancellation-aware pool running submitted tasks on a fixed set of workers.
///
/// Submissions are handed off synchronously to a dispatcher, which forwards them onto a dispatch
/// queue holding at most one entry per worker. A submitter therefore waits while every worker is
/// busy and the dispatch queue is full, which is how backpressure reaches callers.
///
/// The pool is bound to the token it was created with. When that token fires, the dispatcher and
/// the workers exit and queued tasks are dropped without running. [`WorkerPool::close`] instead
/// stops accepting submissions while letting queued and running tasks finish.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    inner: Arc<WorkerPoolInner>,
}

impl WorkerPool {
    /// Creates a pool and immediately starts its dispatcher and `worker_count` workers.
    ///
    /// A pool without workers is valid: it accepts one submission into its dispatcher and then
    /// blocks further submitters until they or the pool are cancelled.
    pub fn new(token: CancelToken, worker_count: usize) -> Self {
        let (submissions_tx, submissions_rx) = bounded(0);
        let (dispatch_tx, dispatch_rx) = bounded(worker_count);
        let dispatch_rx = dispatch_rx.into_shared();
        let (close_tx, close_rx) = create_signal();
        let counters = Arc::new(PoolCounters::default());

        let mut join_set = JoinSet::new();
        join_set.spawn(run_dispatcher(
            token.clone(),
            submissions_rx,
            close_rx,
            dispatch_tx,
            dispatch_rx.clone(),
        ));

        for worker_id in 0..worker_count {
            join_set.spawn(run_worker(
                worker_id,
                token.clone(),
                dispatch_rx.clone(),
                counters.clone(),
            ));
        }

        info!(worker_count, "worker pool started");

        Self {
            inner: Arc::new(WorkerPoolInner {
                token,
                worker_count,
                submissions: submissions_tx,
                close_tx,
                join_set: Mutex::new(join_set),
                counters,
            }),
        }
    }

    /// Creates a pool sized from `config`.
    pub fn from_config(token: CancelToken, config: &PoolConfig) -> Self {
        Self::new(token, config.workers)
    }

    /// Submits `task` for execution.
    ///
    /// Returns once the dispatcher took the task, not once the task ran. Fails with
    /// [`ErrorKind::PoolCanceled`] if the pool's token fired, [`ErrorKind::PoolClosed`] if the pool
    /// was closed, and [`ErrorKind::SubmitCanceled`] if `token` fired before the hand-off, checked in
    /// that order. A failed submission never runs the task.
    pub async fn submit<F, Fut>(&self, token: &CancelToken, task: F) -> WeaveResult<()>
    where
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = WeaveResult<()>> + Send + 'static,
    {
        let task: Task = Box::new(move |token| task(token).boxed());
        self.submit_task(token, task).await
    }

    /// Submits an already boxed [`Task`].
    pub async fn submit_task(&self, token: &CancelToken, task: Task) -> WeaveResult<()> {
        self.check_open()?;

        match self.inner.submissions.send(token, task).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // The dispatcher drops its receiver when the pool is cancelled or closed.
                self.check_open()?;

                match err {
                    ChannelError::Canceled(cause) => {
                        debug!(%cause, "task submission canceled");
                        bail!(
                            ErrorKind::SubmitCanceled,
                            "Task submission was canceled",
                            cause
                        );
                    }
                    ChannelError::Closed => {
                        bail!(ErrorKind::PoolClosed, "Worker pool is closed");
                    }
                }
            }
        }
    }

    fn check_open(&self) -> WeaveResult<()> {
        if let Some(cause) = self.inner.token.err() {
            bail!(ErrorKind::PoolCanceled, "Worker pool was canceled", cause);
        }

        if self.inner.close_tx.is_signaled() {
            bail!(ErrorKind::PoolClosed, "Worker pool is closed");
        }

        Ok(())
    }

    /// Stops accepting submissions.
    ///
    /// Tasks already handed off keep running to completion. Calling this more than once, or from
    /// several tasks at once, has no further effect.
    pub fn close(&self) {
        if self.inner.close_tx.signal() {
            info!("worker pool closed");
        }
    }

    /// Waits until the dispatcher and every worker exited.
    ///
    /// Returns [`ErrorKind::PoolCanceled`] if the pool's token fired, and `Ok(())` otherwise, even
    /// when individual tasks failed. Task outcomes are available through [`WorkerPool::stats`].
    pub async fn wait(&self) -> WeaveResult<()> {
        let mut join_set = self.inner.join_set.lock().await;

        while let Some(result) = join_set.join_next().await {
            if let Err(join_err) = result {
                if join_err.is_cancelled() {
                    debug!("worker pool task was aborted");
                } else {
                    error!(error = %join_err, "worker pool task panicked");
                }
            }
        }

        let stats = self.stats();
        if let Some(cause) = self.inner.token.err() {
            warn!(%cause, completed = stats.completed, "worker pool canceled");
            bail!(ErrorKind::PoolCanceled, "Worker pool was canceled", cause);
        }

        info!(
            completed = stats.completed,
            failed = stats.failed,
            panicked = stats.panicked,
            "worker pool drained"
        );

        Ok(())
    }

    /// Returns a snapshot of the task outcomes recorded so far.
    pub fn stats(&self) -> PoolStats {
        let counters = &self.inner.counters;
        PoolStats {
            completed: counters.completed.get(),
            failed: counters.failed.get(),
            panicked: counters.panicked.get(),
        }
    }

    /// Returns the number of workers this pool was started with.
    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }

    /// Returns `true` once [`WorkerPool::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.close_tx.is_signaled()
    }
}

/// Moves tasks from the hand-off channel onto the dispatch queue.
///
/// Exits when the pool is cancelled or closed, dropping the dispatch sender so that workers
/// drain what is left and stop.
async fn run_dispatcher(
    token: CancelToken,
    mut submissions: ChannelRx<Task>,
    mut close_rx: SignalRx,
    dispatch_tx: ChannelTx<Task>,
    // Keeps the dispatch queue open for pools without workers.
    _dispatch_rx: SharedRx<Task>,
) {
    loop {
        let task = tokio::select! {
            biased;

            cause = token.cancelled() => {
                debug!(%cause, "dispatcher stopping, pool canceled");
                break;
            }
            _ = close_rx.signaled() => {
                debug!("dispatcher stopping, pool closed");
                break;
            }
            task = submissions.recv(&token) => match task {
                Ok(Some(task)) => task,
                Ok(None) => break,
                Err(cause) => {
                    debug!(%cause, "dispatcher stopping, pool canceled");
                    break;
                }
            },
        };

        counter!(WEAVE_POOL_SUBMISSIONS_TOTAL).increment(1);

        if let Err(err) = dispatch_tx.send(&token, task).await {
            debug!(error = %err, "dispatcher stopping, dispatch queue unavailable");
            break;
        }
    }
}

/// Runs tasks from the dispatch queue until it closes or the pool is cancelled.
async fn run_worker(
    worker_id: usize,
    token: CancelToken,
    tasks: SharedRx<Task>,
    counters: Arc<PoolCounters>,
) {
    debug!(worker_id, "worker started");

    loop {
        let task = match tasks.recv(&token).await {
            Ok(Some(task)) => task,
            Ok(None) => break,
            Err(cause) => {
                debug!(worker_id, %cause, "worker stopping, pool canceled");
                break;
            }
        };

        let task_token = token.clone();
        let outcome = AssertUnwindSafe(async move { task(task_token).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                counters.completed.inc();
                counter!(WEAVE_POOL_TASKS_TOTAL, OUTCOME_LABEL => "completed").increment(1);
            }
            Ok(Err(err)) => {
                counters.failed.inc();
                counter!(WEAVE_POOL_TASKS_TOTAL, OUTCOME_LABEL => "failed").increment(1);
                warn!(worker_id, error = %err, "task failed");
            }
            Err(panic) => {
                counters.panicked.inc();
                counter!(WEAVE_POOL_TASKS_TOTAL, OUTCOME_LABEL => "panicked").increment(1);
                let err = task_panic_error(panic.as_ref());
                error!(worker_id, error = %err, "task panicked");
            }
        }
    }

    debug!(worker_id, "worker stopped");
}

fn task_panic_error(payload: &(dyn std::any::Any + Send)) -> WeaveError {
    weave_error!(
        ErrorKind::TaskPanic,
        "task panicked",
        detail = panic_message(payload).to_owned()
    )
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_extracts_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }

    #[test]
    fn test_task_panic_error_carries_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        let err = task_panic_error(payload.as_ref());

        assert_eq!(err.kind(), ErrorKind::TaskPanic);
        assert_eq!(err.detail(), Some("boom"));
    }

    #[test]
    fn test_stats_total_sums_outcomes() {
        let stats = PoolStats {
            completed: 3,
            failed: 2,
            panicked: 1,
        };
        assert_eq!(stats.total(), 6);
    }
}
