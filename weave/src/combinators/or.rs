use tracing::debug;

use crate::concurrency::channel::{ChannelRx, bounded, closed_channel};

/// Returns a channel that closes as soon as any of `inputs` closes.
///
/// With no inputs the returned channel is already closed, and a single input is returned as is.
/// Larger sets are split in halves recursively and every internal node of that tree is watched by
/// one task, so a closure is detected after at most `ceil(log2(N))` hops. Values read from the
/// inputs while waiting are discarded.
///
/// Watchers stop as soon as the consumer of their output goes away, so dropping the returned
/// channel releases the whole tree.
pub fn first_closed<T>(mut inputs: Vec<ChannelRx<T>>) -> ChannelRx<T>
where
    T: Send + 'static,
{
    if inputs.len() <= 1 {
        return inputs.pop().unwrap_or_else(closed_channel);
    }

    let right = inputs.split_off(inputs.len() / 2);
    let mut left = first_closed(inputs);
    let mut right = first_closed(right);

    let (tx, rx) = bounded(0);
    tokio::spawn(async move {
        tokio::select! {
            _ = left.wait_closed() => {}
            _ = right.wait_closed() => {}
            _ = tx.closed() => {
                debug!("first-closed watcher abandoned by its consumer");
            }
        }

        tx.close();
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::cancel::CancelToken;
    use std::time::Duration;

    #[tokio::test]
    async fn test_zero_inputs_is_already_closed() {
        let token = CancelToken::new();
        let mut rx = first_closed::<()>(Vec::new());
        assert_eq!(rx.recv(&token).await, Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_input_is_returned_unchanged() {
        let token = CancelToken::new();
        let (tx, rx) = bounded(1);
        let mut combined = first_closed(vec![rx]);

        // Values still flow through, which a wrapping watcher would have discarded.
        tx.send(&token, 5).await.unwrap();
        assert_eq!(combined.recv(&token).await, Ok(Some(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closes_when_last_input_closes() {
        let token = CancelToken::new();
        let mut senders = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..7 {
            let (tx, rx) = bounded::<()>(0);
            senders.push(tx);
            receivers.push(rx);
        }

        let mut combined = first_closed(receivers);
        let still_open = tokio::time::timeout(Duration::from_millis(50), combined.recv(&token)).await;
        assert!(still_open.is_err());

        drop(senders.pop());
        assert_eq!(combined.recv(&token).await, Ok(None));
    }
}
