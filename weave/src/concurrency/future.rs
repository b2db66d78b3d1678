use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use pin_project_lite::pin_project;

pin_project! {
    /// Future adapter over an optional inner future.
    ///
    /// Resolves to the inner output when present and stays pending forever otherwise, which makes
    /// it usable as a `tokio::select!` branch that should only fire when armed, such as an
    /// optional deadline.
    #[derive(Debug)]
    pub struct OptionalFuture<F> {
        #[pin]
        inner: Option<F>,
    }
}

impl<F> OptionalFuture<F> {
    /// Creates a new [`OptionalFuture`] wrapping the given `inner` future.
    pub const fn new(inner: Option<F>) -> Self {
        Self { inner }
    }

    /// Returns `true` if an inner future is present.
    pub fn is_armed(&self) -> bool {
        self.inner.is_some()
    }
}

impl<F> Future for OptionalFuture<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        match this.inner.as_mut().as_pin_mut() {
            Some(inner) => inner.poll(cx),
            None => Poll::Pending,
        }
    }
}

/// Helper for constructing an [`OptionalFuture`] without naming the type.
#[inline]
pub fn optional_future<F>(inner: Option<F>) -> OptionalFuture<F> {
    OptionalFuture::new(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_unarmed_future_never_resolves() {
        let unarmed = optional_future::<tokio::time::Sleep>(None);
        assert!(!unarmed.is_armed());

        let outcome = tokio::time::timeout(Duration::from_secs(1), unarmed).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_armed_future_resolves_to_inner_output() {
        let armed = optional_future(Some(async { 7 }));
        assert!(armed.is_armed());
        assert_eq!(armed.await, 7);
    }
}
