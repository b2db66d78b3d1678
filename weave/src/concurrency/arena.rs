use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::{ErrorKind, WeaveResult};
use crate::weave_error;

/// Decrements the active slot count when a slot's future finishes or unwinds.
struct SlotGuard {
    active: Arc<AtomicUsize>,
}

impl SlotGuard {
    fn enter(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self { active }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Bounded set of worker slots indexed by position.
///
/// [`TaskArena`] runs one future per slot while never letting more than `max_slots` of them
/// execute at once. Futures spawned beyond the bound are parked until a running slot finishes.
/// The arena keeps track of how many slots were spawned and how many are currently active, and
/// owns every spawned task so that [`TaskArena::join_all`] can report failures and panics.
#[derive(Debug)]
pub struct TaskArena {
    name: &'static str,
    max_slots: usize,
    permits: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    spawned: usize,
    join_set: JoinSet<(usize, WeaveResult<()>)>,
}

impl TaskArena {
    /// Creates an arena running at most `max_slots` futures concurrently.
    ///
    /// A bound of zero is raised to one so that spawned work can always make progress.
    pub fn new(name: &'static str, max_slots: usize) -> Self {
        let max_slots = max_slots.max(1);

        Self {
            name,
            max_slots,
            permits: Arc::new(Semaphore::new(max_slots)),
            active: Arc::new(AtomicUsize::new(0)),
            spawned: 0,
            join_set: JoinSet::new(),
        }
    }

    /// Spawns `future` into the slot at position `slot`.
    pub fn spawn<F>(&mut self, slot: usize, future: F)
    where
        F: Future<Output = WeaveResult<()>> + Send + 'static,
    {
        let permits = self.permits.clone();
        let active = self.active.clone();

        self.join_set.spawn(async move {
            // The semaphore is owned by the arena and never closed.
            let Ok(_permit) = permits.acquire_owned().await else {
                return (slot, Ok(()));
            };

            let _guard = SlotGuard::enter(active);
            (slot, future.await)
        });

        self.spawned += 1;
    }

    /// Returns the maximum number of concurrently running slots.
    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    /// Returns the number of slots currently running.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Returns the number of slots spawned so far.
    pub fn spawned(&self) -> usize {
        self.spawned
    }

    /// Waits for every spawned slot to finish.
    ///
    /// Errors returned by slots and panics inside them are collected and returned together.
    pub async fn join_all(mut self) -> WeaveResult<()> {
        let mut errors = Vec::new();

        while let Some(result) = self.join_set.join_next().await {
            match result {
                Ok((slot, Ok(()))) => {
                    debug!(arena = self.name, slot, "arena slot finished");
                }
                Ok((slot, Err(err))) => {
                    error!(arena = self.name, slot, error = %err, "arena slot failed");
                    errors.push(err);
                }
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        debug!(arena = self.name, "arena slot was aborted");
                    } else {
                        error!(arena = self.name, "arena slot panicked");
                        errors.push(weave_error!(
                            ErrorKind::WorkerPanic,
                            "Arena slot panicked",
                            join_err
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bail;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_active_slots_never_exceed_bound() {
        let mut arena = TaskArena::new("test", 2);
        let peak = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicUsize::new(0));

        for slot in 0..6 {
            let peak = peak.clone();
            let running = running.clone();
            arena.spawn(slot, async move {
                let now = running.fetch_add(1, Ordering::AcqRel) + 1;
                peak.fetch_max(now, Ordering::AcqRel);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::AcqRel);
                Ok(())
            });
        }

        assert_eq!(arena.spawned(), 6);
        assert_eq!(arena.max_slots(), 2);
        arena.join_all().await.unwrap();
        assert_eq!(peak.load(Ordering::Acquire), 2);
    }

    fn fail() -> WeaveResult<()> {
        bail!(ErrorKind::TaskFailed, "slot failed");
    }

    fn explode() -> WeaveResult<()> {
        panic!("slot exploded");
    }

    #[tokio::test]
    async fn test_join_all_collects_failures_and_panics() {
        let mut arena = TaskArena::new("test", 0);
        assert_eq!(arena.max_slots(), 1);

        arena.spawn(0, async { Ok(()) });
        arena.spawn(1, async { fail() });
        arena.spawn(2, async { explode() });

        let err = arena.join_all().await.unwrap_err();
        let mut kinds = err.kinds();
        kinds.sort_by_key(|kind| format!("{kind:?}"));
        assert_eq!(kinds, vec![ErrorKind::TaskFailed, ErrorKind::WorkerPanic]);
    }
}
