//! Exactly-once asynchronous initialization.
//!
//! [`Lazy`] is a tri-state cell (uninitialized, in progress, ready) guarded by one mutex. The first
//! caller of [`Lazy::get`] claims the initialization and runs the initializer; callers arriving
//! while it runs wait on a [`Notify`] and then read the cached outcome. Errors are cached exactly
//! like values, so a failed initialization is never retried.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::debug;

type Initializer<T, E> = Box<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

enum LazyState<T, E> {
    Uninit,
    InProgress,
    Ready(Result<Arc<T>, E>),
}

/// Asynchronously initialized value shared by many tasks.
pub struct Lazy<T, E> {
    init: Initializer<T, E>,
    state: Mutex<LazyState<T, E>>,
    ready: Notify,
}

impl<T, E> Lazy<T, E>
where
    E: Clone,
{
    /// Creates a cell that runs `init` on first access.
    pub fn new<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            init: Box::new(move || init().boxed()),
            state: Mutex::new(LazyState::Uninit),
            ready: Notify::new(),
        }
    }

    /// Returns the initialized value, running the initializer if nobody did yet.
    ///
    /// If the caller running the initializer is dropped before it completes, the cell goes back
    /// to uninitialized and one of the waiting callers takes over.
    pub async fn get(&self) -> Result<Arc<T>, E> {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            // Registers interest before the state check so a completion in between is not lost.
            notified.as_mut().enable();

            let claimed = {
                let mut state = self.lock_state();
                match *state {
                    LazyState::Ready(ref result) => return result.clone(),
                    LazyState::InProgress => false,
                    LazyState::Uninit => {
                        *state = LazyState::InProgress;
                        true
                    }
                }
            };

            if !claimed {
                notified.await;
                continue;
            }

            let mut guard = InitGuard {
                lazy: self,
                armed: true,
            };
            let result = (self.init)().await.map(Arc::new);
            guard.armed = false;

            debug!(ok = result.is_ok(), "lazy value initialized");
            *self.lock_state() = LazyState::Ready(result.clone());
            self.ready.notify_waiters();

            return result;
        }
    }

    /// Returns the cached outcome without initializing.
    pub fn try_get(&self) -> Option<Result<Arc<T>, E>> {
        match *self.lock_state() {
            LazyState::Ready(ref result) => Some(result.clone()),
            _ => None,
        }
    }

    /// Returns `true` once an outcome is cached.
    pub fn is_initialized(&self) -> bool {
        matches!(*self.lock_state(), LazyState::Ready(_))
    }

    fn lock_state(&self) -> MutexGuard<'_, LazyState<T, E>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T, E> fmt::Debug for Lazy<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
        {
            LazyState::Uninit => "uninit",
            LazyState::InProgress => "in_progress",
            LazyState::Ready(Ok(_)) => "ready",
            LazyState::Ready(Err(_)) => "failed",
        };

        f.debug_struct("Lazy").field("state", &state).finish()
    }
}

/// Resets an abandoned initialization so that a waiter can claim it.
struct InitGuard<'a, T, E> {
    lazy: &'a Lazy<T, E>,
    armed: bool,
}

impl<T, E> Drop for InitGuard<'_, T, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        *self
            .lazy
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = LazyState::Uninit;
        self.lazy.ready.notify_waiters();
    }
}
