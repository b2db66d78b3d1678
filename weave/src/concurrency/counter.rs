//! Shared counters safe for concurrent increments.
//!
//! Three interchangeable flavors are provided behind the [`Counter`] trait. [`AtomicCounter`] is
//! the one used for hot paths such as worker pool tallies; the lock-based variants exist for
//! callers that want to compose the count with other state under the same lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

/// Monotonic counter that can be incremented from many tasks at once.
pub trait Counter: Send + Sync {
    /// Adds one to the counter.
    fn inc(&self);

    /// Returns the current value.
    fn get(&self) -> u64;

    /// Sets the counter back to zero and returns the value it had.
    fn reset(&self) -> u64;
}

/// Counter guarded by a [`Mutex`].
#[derive(Debug, Default)]
pub struct MutexCounter {
    value: Mutex<u64>,
}

impl MutexCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Counter for MutexCounter {
    fn inc(&self) {
        let mut value = self
            .value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *value += 1;
    }

    fn get(&self) -> u64 {
        *self
            .value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reset(&self) -> u64 {
        let mut value = self
            .value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *value)
    }
}

/// Counter guarded by a [`RwLock`], letting readers proceed in parallel.
#[derive(Debug, Default)]
pub struct RwCounter {
    value: RwLock<u64>,
}

impl RwCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Counter for RwCounter {
    fn inc(&self) {
        let mut value = self
            .value
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *value += 1;
    }

    fn get(&self) -> u64 {
        *self
            .value
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reset(&self) -> u64 {
        let mut value = self
            .value
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *value)
    }
}

/// Lock-free counter backed by an [`AtomicU64`].
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }
}

impl Counter for AtomicCounter {
    fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    fn reset(&self) -> u64 {
        self.value.swap(0, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn hammer(counter: Arc<dyn Counter>, tasks: usize, increments: usize) -> u64 {
        let mut handles = Vec::with_capacity(tasks);
        for _ in 0..tasks {
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..increments {
                    counter.inc();
                    tokio::task::yield_now().await;
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        counter.get()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_counter_reaches_exact_total() {
        let counters: Vec<Arc<dyn Counter>> = vec![
            Arc::new(MutexCounter::new()),
            Arc::new(RwCounter::new()),
            Arc::new(AtomicCounter::new()),
        ];

        for counter in counters {
            assert_eq!(hammer(counter.clone(), 16, 250).await, 4000);
            assert_eq!(counter.reset(), 4000);
            assert_eq!(counter.get(), 0);
        }
    }
}
