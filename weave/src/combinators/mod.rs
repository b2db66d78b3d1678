//! Stream combinators over bounded channels.
//!
//! - [`fan_in`] merges many streams into one, with no ordering across inputs.
//! - [`fan_out`] spreads one-shot values over dedicated channels.
//! - [`or`] builds a channel that closes as soon as any of its inputs closes.
//! - [`generators`] produces, truncates and flattens streams.
//!
//! Per-input tasks run inside a [`crate::concurrency::arena::TaskArena`], so the number of tasks
//! running at once stays bounded no matter how many inputs are given.

pub mod fan_in;
pub mod fan_out;
pub mod generators;
pub mod or;

pub use fan_in::{fan_in, fan_in_with_config, merge};
pub use fan_out::fan_out;
pub use generators::{bridge, repeat_with, take};
pub use or::first_closed;

use metrics::counter;
use tracing::debug;

use crate::concurrency::cancel::CancelToken;
use crate::concurrency::channel::{ChannelRx, ChannelTx};
use crate::error::WeaveResult;
use crate::metrics::{COMBINATOR_LABEL, WEAVE_COMBINATOR_ITEMS_TOTAL};

/// Forwards every value of `input` onto `output` until the input closes or the token fires.
///
/// Both the read and the write race the token, so a relay never outlives cancellation even when
/// nobody drains `output`.
pub(crate) async fn relay<T>(
    combinator: &'static str,
    token: CancelToken,
    mut input: ChannelRx<T>,
    output: ChannelTx<T>,
) -> WeaveResult<()> {
    let mut relayed = 0u64;

    loop {
        let value = match input.recv(&token).await {
            Ok(Some(value)) => value,
            Ok(None) => break,
            Err(cause) => {
                debug!(combinator, %cause, relayed, "relay stopping");
                break;
            }
        };

        if let Err(err) = output.send(&token, value).await {
            debug!(combinator, error = %err, relayed, "relay stopping");
            break;
        }

        relayed += 1;
        counter!(WEAVE_COMBINATOR_ITEMS_TOTAL, COMBINATOR_LABEL => combinator).increment(1);
    }

    Ok(())
}
