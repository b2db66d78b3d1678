use crate::concurrency::cancel::CancelToken;
use crate::concurrency::channel::{ChannelRx, ChannelTx, bounded};

/// Returns a closed channel holding `values`, readable in order.
pub async fn prefilled<T>(values: Vec<T>) -> ChannelRx<T> {
    let (tx, rx) = bounded(values.len());
    let token = CancelToken::new();

    for value in values {
        // Capacity matches the number of values, so no send can block or fail.
        let _ = tx.send(&token, value).await;
    }

    rx
}

/// Returns one closed, prefilled channel per group of values.
pub async fn prefilled_many<T>(groups: Vec<Vec<T>>) -> Vec<ChannelRx<T>> {
    let mut channels = Vec::with_capacity(groups.len());
    for values in groups {
        channels.push(prefilled(values).await);
    }

    channels
}

/// Returns `count` empty channels together with their writers, which keep them open.
pub fn open_channels<T>(count: usize, capacity: usize) -> (Vec<ChannelTx<T>>, Vec<ChannelRx<T>>) {
    (0..count).map(|_| bounded(capacity)).unzip()
}
