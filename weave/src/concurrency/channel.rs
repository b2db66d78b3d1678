//! Typed, capacity-bounded FIFO channels whose every suspension point observes cancellation.
//!
//! A channel is created with [`bounded`]. Sending suspends while the buffer is full and receiving
//! suspends while it is empty; both race the supplied [`CancelToken`]. A capacity of zero gives a
//! synchronous hand-off: [`ChannelTx::send`] only completes once a receiver has taken the value.
//!
//! Closing follows ownership. The channel closes exactly once, when the last [`ChannelTx`] handle
//! is dropped or explicitly [`ChannelTx::close`]d. Values still buffered at that point remain
//! readable, after which receivers observe end-of-stream. Receivers never close what they read.

use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore, mpsc, oneshot};

use crate::concurrency::cancel::{CancelCause, CancelToken};

/// Errors returned by channel operations.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The receiving side is gone, so the value can never be delivered.
    #[error("channel closed")]
    Closed,
    /// The token fired before the operation completed.
    #[error("channel operation canceled: {0}")]
    Canceled(CancelCause),
}

/// Largest capacity a channel can be created with.
pub const MAX_CAPACITY: usize = Semaphore::MAX_PERMITS;

/// Value in flight, optionally paired with a receipt acknowledged on delivery.
struct Envelope<T> {
    value: T,
    receipt: Option<oneshot::Sender<()>>,
}

impl<T> Envelope<T> {
    /// Returns the value unless its zero-capacity sender already withdrew it.
    fn open(self) -> Option<T> {
        let Envelope { value, receipt } = self;
        match receipt {
            Some(receipt) => receipt.send(()).ok().map(|()| value),
            None => Some(value),
        }
    }
}

/// Creates a bounded channel holding at most `capacity` buffered values.
///
/// A `capacity` of zero makes every send a synchronous hand-off to a receiver. Capacities above
/// [`MAX_CAPACITY`] are clamped to it.
pub fn bounded<T>(capacity: usize) -> (ChannelTx<T>, ChannelRx<T>) {
    let capacity = capacity.min(MAX_CAPACITY);
    let (tx, rx) = mpsc::channel(capacity.max(1));

    (
        ChannelTx {
            inner: tx,
            capacity,
        },
        ChannelRx { inner: rx },
    )
}

/// Creates a channel that is already closed and holds no values.
pub fn closed_channel<T>() -> ChannelRx<T> {
    let (tx, rx) = bounded(0);
    tx.close();

    rx
}

/// Sending half of a bounded channel.
///
/// Cloning yields another writer for the same channel; the channel closes once every writer is
/// gone, which doubles as a completion barrier for groups of producers.
pub struct ChannelTx<T> {
    inner: mpsc::Sender<Envelope<T>>,
    capacity: usize,
}

impl<T> ChannelTx<T> {
    /// Sends `value`, suspending while the channel is full.
    ///
    /// For zero-capacity channels this returns only after a receiver took the value. If the token
    /// fires while waiting for that hand-off, the value is withdrawn and never delivered.
    pub async fn send(&self, token: &CancelToken, value: T) -> Result<(), ChannelError> {
        if self.capacity > 0 {
            return self
                .enqueue(
                    token,
                    Envelope {
                        value,
                        receipt: None,
                    },
                )
                .await;
        }

        let (receipt_tx, mut receipt_rx) = oneshot::channel();
        self.enqueue(
            token,
            Envelope {
                value,
                receipt: Some(receipt_tx),
            },
        )
        .await?;

        tokio::select! {
            biased;

            receipt = &mut receipt_rx => receipt.map_err(|_| ChannelError::Closed),
            cause = token.cancelled() => {
                // A receiver may have taken the value right before the token fired.
                receipt_rx.close();
                match receipt_rx.try_recv() {
                    Ok(()) => Ok(()),
                    Err(_) => Err(ChannelError::Canceled(cause)),
                }
            }
        }
    }

    async fn enqueue(&self, token: &CancelToken, envelope: Envelope<T>) -> Result<(), ChannelError> {
        tokio::select! {
            biased;

            cause = token.cancelled() => Err(ChannelError::Canceled(cause)),
            sent = self.inner.send(envelope) => sent.map_err(|_| ChannelError::Closed),
        }
    }

    /// Waits until the receiving half is dropped.
    pub async fn closed(&self) {
        self.inner.closed().await
    }

    /// Returns `true` if the receiving half is gone.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Returns the capacity this channel was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Gives up this writer. The channel closes once no writer remains.
    pub fn close(self) {
        drop(self);
    }
}

impl<T> fmt::Debug for ChannelTx<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelTx")
            .field("capacity", &self.capacity)
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

impl<T> Clone for ChannelTx<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            capacity: self.capacity,
        }
    }
}

/// Receiving half of a bounded channel.
///
/// Also implements [`Stream`], which yields values without observing any token. That form is
/// meant for owners draining a stage that closes its output on cancellation by itself.
pub struct ChannelRx<T> {
    inner: mpsc::Receiver<Envelope<T>>,
}

impl<T> ChannelRx<T> {
    /// Receives the next value.
    ///
    /// Returns `Ok(None)` once the channel is closed and drained, or the cause if the token fires
    /// first.
    pub async fn recv(&mut self, token: &CancelToken) -> Result<Option<T>, CancelCause> {
        loop {
            let envelope = tokio::select! {
                biased;

                cause = token.cancelled() => return Err(cause),
                envelope = self.inner.recv() => envelope,
            };

            let Some(envelope) = envelope else {
                return Ok(None);
            };

            // Withdrawn values are skipped.
            if let Some(value) = envelope.open() {
                return Ok(Some(value));
            }
        }
    }

    /// Receives and discards values until the channel closes.
    pub async fn wait_closed(&mut self) {
        while let Some(envelope) = self.inner.recv().await {
            let _ = envelope.open();
        }
    }

    /// Converts this receiver into a handle that several consumers can share.
    pub fn into_shared(self) -> SharedRx<T> {
        SharedRx {
            inner: Arc::new(Mutex::new(self)),
        }
    }
}

impl<T> fmt::Debug for ChannelRx<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRx").finish_non_exhaustive()
    }
}

impl<T> Stream for ChannelRx<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let Some(envelope) = ready!(self.inner.poll_recv(cx)) else {
                return Poll::Ready(None);
            };

            if let Some(value) = envelope.open() {
                return Poll::Ready(Some(value));
            }
        }
    }
}

/// Receiver shared by several consumers pulling from the same channel.
///
/// The mutex only serializes access to the single underlying receiver; values are still handed
/// out one at a time in FIFO order.
pub struct SharedRx<T> {
    inner: Arc<Mutex<ChannelRx<T>>>,
}

impl<T> SharedRx<T> {
    /// Receives the next value on behalf of one of the sharing consumers.
    pub async fn recv(&self, token: &CancelToken) -> Result<Option<T>, CancelCause> {
        let mut rx = tokio::select! {
            biased;

            cause = token.cancelled() => return Err(cause),
            rx = self.inner.lock() => rx,
        };

        rx.recv(token).await
    }
}

impl<T> fmt::Debug for SharedRx<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRx")
            .field("consumers", &Arc::strong_count(&self.inner))
            .finish()
    }
}

impl<T> Clone for SharedRx<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_oversized_capacity_is_clamped() {
        let token = CancelToken::new();
        let (tx, mut rx) = bounded(usize::MAX);
        assert_eq!(tx.capacity(), MAX_CAPACITY);

        tx.send(&token, 1).await.unwrap();
        assert_eq!(rx.recv(&token).await, Ok(Some(1)));
    }

    #[tokio::test]
    async fn test_buffered_values_survive_close() {
        let token = CancelToken::new();
        let (tx, mut rx) = bounded(3);

        for value in 0..3 {
            tx.send(&token, value).await.unwrap();
        }
        tx.close();

        assert_eq!(rx.recv(&token).await, Ok(Some(0)));
        assert_eq!(rx.recv(&token).await, Ok(Some(1)));
        assert_eq!(rx.recv(&token).await, Ok(Some(2)));
        assert_eq!(rx.recv(&token).await, Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_capacity_send_waits_for_receiver() {
        let token = CancelToken::new();
        let (tx, mut rx) = bounded(0);

        let sender = tokio::spawn({
            let token = token.clone();
            async move { tx.send(&token, 42).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sender.is_finished());

        assert_eq!(rx.recv(&token).await, Ok(Some(42)));
        assert_eq!(sender.await.unwrap(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_channel_send_observes_cancellation() {
        let token = CancelToken::new().child_with_timeout(Duration::from_millis(10));
        let (tx, _rx) = bounded(1);

        tx.send(&token, 1).await.unwrap();
        assert_eq!(
            tx.send(&token, 2).await,
            Err(ChannelError::Canceled(CancelCause::DeadlineExceeded))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_zero_capacity_send_is_withdrawn() {
        let root = CancelToken::new();
        let token = root.child_with_timeout(Duration::from_millis(10));
        let (tx, mut rx) = bounded(0);

        assert_eq!(
            tx.send(&token, 1).await,
            Err(ChannelError::Canceled(CancelCause::DeadlineExceeded))
        );
        let sender = tokio::spawn({
            let root = root.clone();
            async move { tx.send(&root, 2).await }
        });

        assert_eq!(rx.recv(&root).await, Ok(Some(2)));
        assert_eq!(sender.await.unwrap(), Ok(()));
        assert_eq!(rx.recv(&root).await, Ok(None));
    }

    #[tokio::test]
    async fn test_send_after_receiver_drop_is_closed() {
        let token = CancelToken::new();
        let (tx, rx) = bounded::<u8>(1);
        drop(rx);

        assert!(tx.is_closed());
        assert_eq!(tx.send(&token, 1).await, Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_recv_observes_cancellation() {
        let token = CancelToken::new();
        let (_tx, mut rx) = bounded::<u8>(1);
        token.cancel();

        assert_eq!(rx.recv(&token).await, Err(CancelCause::Canceled));
    }

    #[tokio::test]
    async fn test_closed_channel_is_empty_stream() {
        let rx = closed_channel::<u8>();
        assert_eq!(rx.collect::<Vec<_>>().await, Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_shared_receivers_split_values() {
        let token = CancelToken::new();
        let (tx, rx) = bounded(4);
        let shared = rx.into_shared();
        let other = shared.clone();

        for value in 0..4 {
            tx.send(&token, value).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(value) = shared.recv(&token).await.unwrap() {
            seen.push(value);
            if let Some(value) = other.recv(&token).await.unwrap() {
                seen.push(value);
            }
        }

        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
