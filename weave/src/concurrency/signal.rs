//! One-shot latch signals for worker coordination.
//!
//! A signal abstracts a [`watch`] channel of `bool` into a latch that flips from "open" to
//! "signaled" at most once. Every subscriber observes the flip, including subscribers created
//! after it happened, which makes it suitable for close notifications raced inside
//! `tokio::select!`.

use tokio::sync::watch;

/// Transmitter side of a latch signal.
#[derive(Debug)]
pub struct SignalTx(watch::Sender<bool>);

impl SignalTx {
    /// Flips the latch, returning `true` only for the call that actually flipped it.
    ///
    /// Safe to call repeatedly and concurrently; later calls have no effect.
    pub fn signal(&self) -> bool {
        self.0.send_if_modified(|signaled| {
            if *signaled {
                return false;
            }

            *signaled = true;
            true
        })
    }

    /// Returns `true` if the latch has been flipped.
    pub fn is_signaled(&self) -> bool {
        *self.0.borrow()
    }

    /// Creates a new receiver subscription.
    pub fn subscribe(&self) -> SignalRx {
        SignalRx(self.0.subscribe())
    }
}

/// Receiver side of a latch signal.
#[derive(Debug, Clone)]
pub struct SignalRx(watch::Receiver<bool>);

impl SignalRx {
    /// Waits until the latch is flipped.
    ///
    /// Also resolves when every transmitter is gone, since nobody can flip the latch anymore and
    /// waiters must not hang on it.
    pub async fn signaled(&mut self) {
        let _ = self.0.wait_for(|signaled| *signaled).await;
    }

    /// Returns `true` if the latch has been flipped.
    pub fn is_signaled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Creates a new latch signal in the open state.
pub fn create_signal() -> (SignalTx, SignalRx) {
    let (tx, rx) = watch::channel(false);
    (SignalTx(tx), SignalRx(rx))
}
