use std::future::Future;
use std::time::Duration;
use std::{fmt, sync::Arc};

use tokio::sync::Notify;
use tokio::time::timeout;

/// Default timeout duration for notifications and timed waits.
///
/// Most waits in tests settle within milliseconds; this only bounds runaway tests.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// A wrapper around [`Arc<Notify>`] that panics when a notification does not arrive in time.
#[derive(Clone)]
pub struct TimedNotify {
    notify: Arc<Notify>,
    timeout_duration: Duration,
}

impl TimedNotify {
    /// Creates a new [`TimedNotify`] with the default timeout.
    pub fn new(notify: Arc<Notify>) -> Self {
        Self::with_timeout(notify, DEFAULT_NOTIFY_TIMEOUT)
    }

    /// Creates a new [`TimedNotify`] with a custom timeout duration.
    pub fn with_timeout(notify: Arc<Notify>, timeout_duration: Duration) -> Self {
        Self {
            notify,
            timeout_duration,
        }
    }

    /// Waits for a notification.
    ///
    /// # Panics
    ///
    /// Panics if the timeout elapses before the notification is received.
    pub async fn notified(&self) {
        if timeout(self.timeout_duration, self.notify.notified())
            .await
            .is_err()
        {
            panic!(
                "Test notification timed out after {:?}. \
                 The expected state was likely never reached.",
                self.timeout_duration
            );
        }
    }

    /// Returns the underlying [`Arc<Notify>`] for direct access if needed.
    pub fn inner(&self) -> &Arc<Notify> {
        &self.notify
    }
}

impl fmt::Debug for TimedNotify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedNotify")
            .field("timeout_duration", &self.timeout_duration)
            .finish()
    }
}

/// Awaits `future`, panicking with `what` if it does not complete within [`DEFAULT_NOTIFY_TIMEOUT`].
pub async fn timed<F>(what: &str, future: F) -> F::Output
where
    F: Future,
{
    match timeout(DEFAULT_NOTIFY_TIMEOUT, future).await {
        Ok(output) => output,
        Err(_) => panic!("{what} did not complete within {DEFAULT_NOTIFY_TIMEOUT:?}"),
    }
}
