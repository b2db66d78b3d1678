use tracing::{debug, error};

use crate::concurrency::arena::TaskArena;
use crate::concurrency::cancel::CancelToken;
use crate::concurrency::channel::{ChannelRx, bounded};

/// Spreads `values` over one dedicated channel each.
///
/// Every returned channel yields exactly its value and then closes, or closes empty if the token
/// fires first. The returned channels are independent of each other; no ordering between them is
/// implied. At most `max_slots` values are being delivered at once.
pub fn fan_out<T>(token: &CancelToken, values: Vec<T>, max_slots: usize) -> Vec<ChannelRx<T>>
where
    T: Send + 'static,
{
    let mut outputs = Vec::with_capacity(values.len());
    let mut arena = TaskArena::new("fan_out", max_slots);

    for (slot, value) in values.into_iter().enumerate() {
        // One buffered slot lets the value be parked without waiting for a reader, so a bounded
        // arena cannot deadlock on readers draining channels out of order.
        let (tx, rx) = bounded(1);
        let token = token.clone();

        arena.spawn(slot, async move {
            if let Err(err) = tx.send(&token, value).await {
                debug!(slot, error = %err, "fan-out value not delivered");
            }

            Ok(())
        });

        outputs.push(rx);
    }

    tokio::spawn(async move {
        if let Err(err) = arena.join_all().await {
            error!(error = %err, "fan-out finished with errors");
        }
    });

    outputs
}
