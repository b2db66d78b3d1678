use futures::StreamExt;
use tracing::{error, info, warn};
use weave_config::shared::FanInConfig;

use crate::combinators::relay;
use crate::concurrency::arena::TaskArena;
use crate::concurrency::cancel::{CancelResult, CancelToken};
use crate::concurrency::channel::{ChannelRx, bounded};

/// Merges `inputs` into one channel of capacity `out_buffer`.
///
/// One relay per input forwards values onto the output, with at most `max_relays` relays running
/// at once. The output closes once every relay exited, either because all inputs closed or because
/// the token fired.
///
/// Relays beyond `max_relays` only start when a running relay finishes, so inputs that never close
/// can starve later ones. Size the bound accordingly for unbounded inputs.
pub fn merge<T>(
    token: &CancelToken,
    inputs: Vec<ChannelRx<T>>,
    out_buffer: usize,
    max_relays: usize,
) -> ChannelRx<T>
where
    T: Send + 'static,
{
    let (tx, rx) = bounded(out_buffer);
    let mut arena = TaskArena::new("fan_in", max_relays);

    for (slot, input) in inputs.into_iter().enumerate() {
        arena.spawn(slot, relay("fan_in", token.clone(), input, tx.clone()));
    }

    tokio::spawn(async move {
        let relays = arena.spawned();
        if let Err(err) = arena.join_all().await {
            error!(error = %err, relays, "fan-in relays finished with errors");
        }

        tx.close();
    });

    rx
}

/// Merges `inputs` and collects every value.
///
/// When the token does not fire, the returned values are exactly the union of the inputs' values,
/// in no particular order. Otherwise the values collected so far are returned with the cause.
pub async fn fan_in<T>(
    token: &CancelToken,
    inputs: Vec<ChannelRx<T>>,
    out_buffer: usize,
) -> CancelResult<Vec<T>>
where
    T: Send + 'static,
{
    let max_relays = inputs.len();
    collect(token, merge(token, inputs, out_buffer, max_relays)).await
}

/// Same as [`fan_in`], with the output buffer and relay bound taken from `config`.
pub async fn fan_in_with_config<T>(
    token: &CancelToken,
    inputs: Vec<ChannelRx<T>>,
    config: &FanInConfig,
) -> CancelResult<Vec<T>>
where
    T: Send + 'static,
{
    collect(
        token,
        merge(token, inputs, config.out_buffer, config.max_relays),
    )
    .await
}

async fn collect<T>(token: &CancelToken, merged: ChannelRx<T>) -> CancelResult<Vec<T>> {
    // The merged output closes on cancellation, so draining needs no token.
    let values: Vec<T> = merged.collect().await;

    let result = CancelResult::from_token(values, token);
    match result.cause() {
        Some(cause) => warn!(%cause, collected = result.value().len(), "fan-in canceled"),
        None => info!(collected = result.value().len(), "fan-in finished"),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::cancel::CancelCause;

    #[tokio::test]
    async fn test_no_inputs_yields_nothing() {
        let token = CancelToken::new();
        let result = fan_in::<u8>(&token, Vec::new(), 0).await;
        assert_eq!(result, CancelResult::Ok(Vec::new()));
    }

    #[tokio::test]
    async fn test_cancelled_merge_closes_without_draining_inputs() {
        let token = CancelToken::new();
        // Inputs whose writers stay alive never close on their own.
        let (_tx_a, rx_a) = bounded::<u8>(1);
        let (_tx_b, rx_b) = bounded::<u8>(1);
        token.cancel();

        let result = fan_in(&token, vec![rx_a, rx_b], 0).await;
        assert_eq!(result, CancelResult::Cancelled(Vec::new(), CancelCause::Canceled));
    }
}
