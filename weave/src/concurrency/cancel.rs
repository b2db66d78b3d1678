//! Cancellation tokens threaded explicitly through every blocking operation.
//!
//! A [`CancelToken`] carries a one-shot "done" signal and the terminal [`CancelCause`] that fired
//! it. Tokens form a tree: a child derived from a parent is cancelled whenever the parent is, but
//! cancelling a child never affects its parent. Deadlines are inherited, so a child's effective
//! deadline is the earlier of its own and its parent's.
//!
//! The signal is built on a [`watch`] channel. Explicit cancellation is pushed eagerly down the
//! tree, while deadline expiry is observed lazily by [`CancelToken::err`] and by the timer armed
//! inside [`CancelToken::cancelled`].

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

use crate::concurrency::future::optional_future;

/// Terminal cause recorded when a [`CancelToken`] fires.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CancelCause {
    /// The token, or one of its ancestors, was cancelled explicitly.
    Canceled,
    /// The token's effective deadline elapsed.
    DeadlineExceeded,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelCause::Canceled => write!(f, "context canceled"),
            CancelCause::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

#[derive(Debug)]
struct TokenInner {
    cause_tx: watch::Sender<Option<CancelCause>>,
    deadline: Option<Instant>,
    children: Mutex<Vec<Weak<TokenInner>>>,
}

impl TokenInner {
    fn new(deadline: Option<Instant>, cause: Option<CancelCause>) -> Self {
        let (cause_tx, _) = watch::channel(cause);

        Self {
            cause_tx,
            deadline,
            children: Mutex::new(Vec::new()),
        }
    }

    /// Records `cause` unless a cause is already set, returning the cause that is now in effect.
    fn fire(&self, cause: CancelCause) -> CancelCause {
        let mut effective = cause;
        self.cause_tx.send_if_modified(|current| match current {
            Some(existing) => {
                effective = *existing;
                false
            }
            None => {
                *current = Some(cause);
                true
            }
        });

        effective
    }

    /// Fires this node and pushes the cause to every live descendant.
    fn cancel_tree(&self, cause: CancelCause) {
        self.fire(cause);

        let children = {
            let mut children = self
                .children
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *children)
        };

        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel_tree(cause);
        }
    }

    fn cause(&self) -> Option<CancelCause> {
        *self.cause_tx.borrow()
    }
}

/// Explicit cancellation signal passed to every operation that may block.
///
/// Cloning a [`CancelToken`] yields a handle to the same token. Use [`CancelToken::child`] and
/// its variants to derive independent descendants.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Creates a root token that only fires when [`CancelToken::cancel`] is called.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner::new(None, None)),
        }
    }

    /// Derives a child token that fires when this token fires or when it is cancelled itself.
    pub fn child(&self) -> Self {
        self.derive(self.inner.deadline)
    }

    /// Derives a child token whose deadline is `timeout` from now.
    ///
    /// A timeout too large to be represented as an instant only inherits this token's deadline.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.child_with_deadline(deadline),
            None => self.derive(self.inner.deadline),
        }
    }

    /// Derives a child token with the given deadline, bounded by this token's own deadline.
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        let effective = match self.inner.deadline {
            Some(parent_deadline) => parent_deadline.min(deadline),
            None => deadline,
        };

        self.derive(Some(effective))
    }

    fn derive(&self, deadline: Option<Instant>) -> Self {
        let mut children = self
            .inner
            .children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // The parent cause is read under the children lock so that a concurrent `cancel` either
        // sees the new child in the list or the child sees the parent as already fired.
        let child = Arc::new(TokenInner::new(deadline, self.inner.cause()));

        children.retain(|existing| existing.strong_count() > 0);
        children.push(Arc::downgrade(&child));

        Self { inner: child }
    }

    /// Cancels this token and all of its descendants.
    ///
    /// Has no effect if the token already fired.
    pub fn cancel(&self) {
        if self.inner.cause().is_none() {
            debug!("cancelling token");
        }

        self.inner.cancel_tree(CancelCause::Canceled);
    }

    /// Returns the terminal cause if this token has fired, or [`None`] while it is live.
    ///
    /// Once this returns a cause it keeps returning the same cause.
    pub fn err(&self) -> Option<CancelCause> {
        if let Some(cause) = self.inner.cause() {
            return Some(cause);
        }

        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(self.inner.fire(CancelCause::DeadlineExceeded))
            }
            _ => None,
        }
    }

    /// Returns `true` if this token has fired.
    pub fn is_cancelled(&self) -> bool {
        self.err().is_some()
    }

    /// Returns the effective deadline of this token, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Waits until this token fires and returns its cause.
    ///
    /// This future is cancel safe and is meant to be raced against other operations inside
    /// `tokio::select!`.
    pub async fn cancelled(&self) -> CancelCause {
        let mut cause_rx = self.inner.cause_tx.subscribe();
        let deadline = optional_future(self.inner.deadline.map(sleep_until));
        tokio::pin!(deadline);

        loop {
            if let Some(cause) = self.err() {
                return cause;
            }

            tokio::select! {
                // The sender lives as long as `self`, so this never reports a closed channel.
                _ = cause_rx.changed() => {}
                _ = &mut deadline => {}
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of an operation that returns partial output when its token fires.
///
/// Partial output is never discarded silently: the cancelled variant keeps whatever was
/// accumulated before the cause was observed, and callers decide what to do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelResult<T> {
    /// The operation ran to completion without its token firing.
    Ok(T),
    /// The token fired; the value holds the output accumulated until then.
    Cancelled(T, CancelCause),
}

impl<T> CancelResult<T> {
    /// Builds the result for `value` from the terminal state of `token`.
    pub fn from_token(value: T, token: &CancelToken) -> Self {
        match token.err() {
            Some(cause) => CancelResult::Cancelled(value, cause),
            None => CancelResult::Ok(value),
        }
    }

    /// Returns the (possibly partial) value.
    pub fn value(&self) -> &T {
        match self {
            CancelResult::Ok(value) | CancelResult::Cancelled(value, _) => value,
        }
    }

    /// Consumes the result and returns the (possibly partial) value.
    pub fn into_value(self) -> T {
        match self {
            CancelResult::Ok(value) | CancelResult::Cancelled(value, _) => value,
        }
    }

    /// Returns the cancellation cause, if the token fired.
    pub fn cause(&self) -> Option<CancelCause> {
        match self {
            CancelResult::Ok(_) => None,
            CancelResult::Cancelled(_, cause) => Some(*cause),
        }
    }

    /// Returns `true` if the token fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CancelResult::Cancelled(..))
    }

    /// Splits the result into the value and the cancellation cause.
    pub fn into_parts(self) -> (T, Option<CancelCause>) {
        match self {
            CancelResult::Ok(value) => (value, None),
            CancelResult::Cancelled(value, cause) => (value, Some(cause)),
        }
    }

    /// Converts into a [`crate::error::WeaveResult`], dropping partial output on cancellation.
    pub fn into_result(self) -> crate::error::WeaveResult<T> {
        match self {
            CancelResult::Ok(value) => Ok(value),
            CancelResult::Cancelled(_, cause) => Err(cause.into()),
        }
    }
}
