//! Multi-stage data-flow pipeline built from bounded channels.
//!
//! Each stage is a standalone task that owns its output channel and closes it on exit, whether it
//! finished normally or observed cancellation. Stages are chained by handing the output of one
//! stage to the next:
//!
//! 1. [`source`] emits `0..n`.
//! 2. [`transform`] fans the stream out over `width` workers applying a function. The output is
//!    an unordered interleaving of the workers' results.
//! 3. [`filter`] forwards the values satisfying a predicate in the order it received them.
//!
//! [`run_pipeline`] wires the three stages together, drains the last one and returns the
//! accumulated values along with the terminal state of the root token.

use futures::{StreamExt, future};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use weave_config::shared::PipelineConfig;

use crate::concurrency::arena::TaskArena;
use crate::concurrency::cancel::{CancelResult, CancelToken};
use crate::concurrency::channel::{ChannelRx, bounded};
use crate::metrics::{STAGE_LABEL, WEAVE_PIPELINE_ITEMS_TOTAL};

/// Starts a stage emitting the integers `0..n` on a channel of capacity `buffer`.
///
/// Cancellation is checked before every send, so no value is emitted after the token fired.
pub fn source(token: &CancelToken, n: u64, buffer: usize) -> ChannelRx<u64> {
    let (tx, rx) = bounded(buffer);
    let token = token.clone();

    tokio::spawn(async move {
        for value in 0..n {
            if token.is_cancelled() {
                break;
            }

            if let Err(err) = tx.send(&token, value).await {
                debug!(error = %err, "source stage stopping");
                break;
            }

            counter!(WEAVE_PIPELINE_ITEMS_TOTAL, STAGE_LABEL => "source").increment(1);
        }
    });

    rx
}

/// Starts a stage applying `f` to every input value on `width` parallel workers.
///
/// The output channel is closed once every worker exited. A `width` of zero is raised to one.
pub fn transform<T, U, F>(
    token: &CancelToken,
    input: ChannelRx<T>,
    width: usize,
    buffer: usize,
    f: F,
) -> ChannelRx<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    if width == 0 {
        warn!("transform stage width is zero, using a single worker");
    }

    let (tx, rx) = bounded(buffer);
    let input = input.into_shared();
    let f = Arc::new(f);
    let mut arena = TaskArena::new("transform", width);

    for worker_id in 0..arena.max_slots() {
        let token = token.clone();
        let input = input.clone();
        let tx = tx.clone();
        let f = f.clone();

        arena.spawn(worker_id, async move {
            loop {
                let value = match input.recv(&token).await {
                    Ok(Some(value)) => value,
                    Ok(None) => break,
                    Err(cause) => {
                        debug!(worker_id, %cause, "transform worker stopping");
                        break;
                    }
                };

                if tx.send(&token, (*f)(value)).await.is_err() {
                    break;
                }

                counter!(WEAVE_PIPELINE_ITEMS_TOTAL, STAGE_LABEL => "transform").increment(1);
            }

            Ok(())
        });
    }

    // Barrier: the supervisor keeps the output open until every worker has exited.
    tokio::spawn(async move {
        if let Err(err) = arena.join_all().await {
            error!(error = %err, "transform stage finished with errors");
        }

        tx.close();
    });

    rx
}

/// Starts a stage forwarding the input values for which `predicate` holds.
///
/// Values keep the relative order in which they were received.
pub fn filter<T, P>(
    token: &CancelToken,
    mut input: ChannelRx<T>,
    buffer: usize,
    predicate: P,
) -> ChannelRx<T>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + 'static,
{
    let (tx, rx) = bounded(buffer);
    let token = token.clone();

    tokio::spawn(async move {
        loop {
            let value = match input.recv(&token).await {
                Ok(Some(value)) => value,
                Ok(None) => break,
                Err(cause) => {
                    debug!(%cause, "filter stage stopping");
                    break;
                }
            };

            if !predicate(&value) {
                continue;
            }

            if tx.send(&token, value).await.is_err() {
                break;
            }

            counter!(WEAVE_PIPELINE_ITEMS_TOTAL, STAGE_LABEL => "filter").increment(1);
        }
    });

    rx
}

/// Runs `source(n) -> transform(square) -> filter(multiple of 3)` and collects the output.
///
/// Every returned value is a perfect square divisible by three. Squares that do not fit in a
/// `u64` (sources above `u32::MAX`) are dropped by the filter. Values accumulated before the token
/// fired are returned alongside the cause.
pub async fn run_pipeline(
    token: &CancelToken,
    n: u64,
    buffer: usize,
    width: usize,
) -> CancelResult<Vec<u64>> {
    info!(n, buffer, width, "running pipeline");

    let numbers = source(token, n, buffer);
    let squares = transform(token, numbers, width, buffer, checked_square);
    let multiples = filter(token, squares, buffer, |square: &Option<u64>| {
        matches!(square, Some(value) if value % 3 == 0)
    });

    // The last stage closes its output on cancellation, so draining needs no token.
    let results: Vec<u64> = multiples.filter_map(future::ready).collect().await;

    let result = CancelResult::from_token(results, token);
    if let Some(cause) = result.cause() {
        warn!(%cause, collected = result.value().len(), "pipeline canceled");
    }

    result
}

fn checked_square(value: u64) -> Option<u64> {
    value.checked_mul(value)
}

/// Runs `source(n) -> transform(f)` and collects the output.
///
/// On an uncancelled run exactly `n` values are returned, in no particular order.
pub async fn run_transform<U, F>(
    token: &CancelToken,
    n: u64,
    width: usize,
    buffer: usize,
    f: F,
) -> CancelResult<Vec<U>>
where
    U: Send + 'static,
    F: Fn(u64) -> U + Send + Sync + 'static,
{
    let numbers = source(token, n, buffer);
    let results: Vec<U> = transform(token, numbers, width, buffer, f).collect().await;

    CancelResult::from_token(results, token)
}

/// Pipeline sized from a [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Runs [`run_pipeline`] over `0..n` with the configured buffer and width.
    pub async fn run(&self, token: &CancelToken, n: u64) -> CancelResult<Vec<u64>> {
        run_pipeline(token, n, self.config.buffer, self.config.width).await
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::cancel::CancelCause;

    #[test]
    fn test_checked_square_rejects_overflow() {
        let largest = u64::from(u32::MAX);
        assert_eq!(checked_square(largest), Some(largest * largest));
        assert_eq!(checked_square(largest + 1), None);
    }

    #[tokio::test]
    async fn test_overflowing_squares_are_dropped_by_filter() {
        let token = CancelToken::new();
        let (tx, rx) = bounded(4);
        let start = u64::from(u32::MAX) - 2;
        tokio::spawn(async move {
            for value in start..start + 4 {
                if tx.send(&CancelToken::new(), value).await.is_err() {
                    break;
                }
            }
        });

        let squares = transform(&token, rx, 1, 4, checked_square);
        let mut kept: Vec<Option<u64>> = filter(&token, squares, 4, |square: &Option<u64>| {
            square.is_some()
        })
        .collect()
        .await;
        kept.sort_unstable();

        let expected: Vec<Option<u64>> = (start..start + 3).map(|v| Some(v * v)).collect();
        assert_eq!(kept, expected);
    }

    #[tokio::test]
    async fn test_source_emits_range_in_order() {
        let token = CancelToken::new();
        let values: Vec<u64> = source(&token, 5, 0).collect().await;
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_filter_preserves_order() {
        let token = CancelToken::new();
        let evens: Vec<u64> = filter(&token, source(&token, 10, 2), 2, |value: &u64| value % 2 == 0)
            .collect()
            .await;
        assert_eq!(evens, vec![0, 2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn test_transform_with_zero_width_still_runs() {
        let token = CancelToken::new();
        let mut doubled: Vec<u64> = transform(&token, source(&token, 4, 0), 0, 0, |v: u64| v * 2)
            .collect()
            .await;
        doubled.sort_unstable();
        assert_eq!(doubled, vec![0, 2, 4, 6]);
    }

    #[tokio::test]
    async fn test_source_stops_when_cancelled() {
        let token = CancelToken::new();
        token.cancel();

        let values: Vec<u64> = source(&token, 1_000, 4).collect().await;
        assert!(values.is_empty());
        assert!(
            run_pipeline(&token, 10, 1, 1)
                .await
                .cause()
                .is_some_and(|cause| cause == CancelCause::Canceled)
        );
    }
}
