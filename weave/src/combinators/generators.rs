use tracing::{debug, error};

use crate::combinators::relay;
use crate::concurrency::arena::TaskArena;
use crate::concurrency::cancel::CancelToken;
use crate::concurrency::channel::{ChannelRx, bounded};

/// Emits `n` values produced by `generator`, handing each one off synchronously.
pub fn repeat_with<T, G>(token: &CancelToken, n: usize, mut generator: G) -> ChannelRx<T>
where
    T: Send + 'static,
    G: FnMut() -> T + Send + 'static,
{
    let (tx, rx) = bounded(0);
    let token = token.clone();

    tokio::spawn(async move {
        for _ in 0..n {
            if tx.send(&token, generator()).await.is_err() {
                break;
            }
        }
    });

    rx
}

/// Forwards at most the first `n` values of `input`.
///
/// The output closes after `n` values, when `input` closes or when the token fires, whichever
/// happens first. Values left in `input` are not consumed.
pub fn take<T>(token: &CancelToken, mut input: ChannelRx<T>, n: usize) -> ChannelRx<T>
where
    T: Send + 'static,
{
    let (tx, rx) = bounded(0);
    let token = token.clone();

    tokio::spawn(async move {
        for _ in 0..n {
            let value = match input.recv(&token).await {
                Ok(Some(value)) => value,
                Ok(None) | Err(_) => break,
            };

            if tx.send(&token, value).await.is_err() {
                break;
            }
        }
    });

    rx
}

/// Flattens a stream of streams into one stream.
///
/// Every inner stream is relayed as soon as it arrives, with at most `max_relays` inner streams
/// relayed at once. The output closes once the outer stream closed and every inner relay exited,
/// or once the token fired. No ordering is kept across inner streams.
pub fn bridge<T>(
    token: &CancelToken,
    mut streams: ChannelRx<ChannelRx<T>>,
    max_relays: usize,
) -> ChannelRx<T>
where
    T: Send + 'static,
{
    let (tx, rx) = bounded(0);
    let token = token.clone();

    tokio::spawn(async move {
        let mut arena = TaskArena::new("bridge", max_relays);

        loop {
            let stream = match streams.recv(&token).await {
                Ok(Some(stream)) => stream,
                Ok(None) => break,
                Err(cause) => {
                    debug!(%cause, "bridge stopping");
                    break;
                }
            };

            let slot = arena.spawned();
            arena.spawn(slot, relay("bridge", token.clone(), stream, tx.clone()));
        }

        if let Err(err) = arena.join_all().await {
            error!(error = %err, "bridge relays finished with errors");
        }

        tx.close();
    });

    rx
}
