//! Strict two-party alternation over a pair of channels.
//!
//! An initiator and a responder exchange a payload-free token `n` times. The responder records a
//! [`Stroke::Ping`] every time it receives, the initiator records a [`Stroke::Pong`] every time the
//! answer comes back. Since neither side can proceed before the other answered, the recorded
//! history strictly alternates.

use futures::StreamExt;
use std::fmt;
use tracing::{debug, info, warn};
use weave_config::shared::RallyConfig;

use crate::concurrency::arena::TaskArena;
use crate::concurrency::cancel::{CancelResult, CancelToken};
use crate::concurrency::channel::{ChannelRx, ChannelTx, bounded};

/// One recorded event of a rally.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Stroke {
    /// The responder received the initiator's token.
    Ping,
    /// The initiator received the responder's answer.
    Pong,
}

impl fmt::Display for Stroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stroke::Ping => write!(f, "ping"),
            Stroke::Pong => write!(f, "pong"),
        }
    }
}

/// Runs `n` exchanges over channels of capacity `buffer` and returns the recorded history.
///
/// An uncancelled run returns exactly `2n` strokes in strict alternation. If the token fires, the
/// strokes recorded so far are returned together with the cause.
pub async fn rally(token: &CancelToken, n: usize, buffer: usize) -> CancelResult<Vec<Stroke>> {
    info!(n, buffer, "starting rally");

    let (ping_tx, ping_rx) = bounded(buffer);
    let (pong_tx, pong_rx) = bounded(buffer);
    // Large enough for the whole history so that recording never blocks a role.
    let (events_tx, events_rx) = bounded(n.saturating_mul(2));

    let mut arena = TaskArena::new("rally", 2);
    arena.spawn(
        0,
        run_initiator(token.clone(), n, ping_tx, pong_rx, events_tx.clone()),
    );
    arena.spawn(
        1,
        run_responder(token.clone(), ping_rx, pong_tx, events_tx.clone()),
    );

    // Barrier: the events channel closes once both roles exited.
    tokio::spawn(async move {
        if let Err(err) = arena.join_all().await {
            warn!(error = %err, "rally roles finished with errors");
        }

        events_tx.close();
    });

    let history: Vec<Stroke> = events_rx.collect().await;

    let result = CancelResult::from_token(history, token);
    if let Some(cause) = result.cause() {
        warn!(%cause, strokes = result.value().len(), "rally canceled");
    }

    result
}

/// Same as [`rally`], sized from `config`.
pub async fn rally_with_config(
    token: &CancelToken,
    config: &RallyConfig,
) -> CancelResult<Vec<Stroke>> {
    rally(token, config.exchanges, config.buffer).await
}

async fn run_initiator(
    token: CancelToken,
    n: usize,
    ping: ChannelTx<()>,
    mut pong: ChannelRx<()>,
    events: ChannelTx<Stroke>,
) -> crate::error::WeaveResult<()> {
    for exchange in 0..n {
        if let Err(err) = ping.send(&token, ()).await {
            debug!(exchange, error = %err, "initiator stopping on send");
            break;
        }

        match pong.recv(&token).await {
            Ok(Some(())) => {}
            Ok(None) => {
                debug!(exchange, "initiator stopping, responder is gone");
                break;
            }
            Err(cause) => {
                debug!(exchange, %cause, "initiator stopping on receive");
                break;
            }
        }

        if events.send(&token, Stroke::Pong).await.is_err() {
            break;
        }
    }

    // Closing `ping` tells the responder that the rally is over.
    ping.close();

    Ok(())
}

async fn run_responder(
    token: CancelToken,
    mut ping: ChannelRx<()>,
    pong: ChannelTx<()>,
    events: ChannelTx<Stroke>,
) -> crate::error::WeaveResult<()> {
    loop {
        match ping.recv(&token).await {
            Ok(Some(())) => {}
            Ok(None) => break,
            Err(cause) => {
                debug!(%cause, "responder stopping on receive");
                break;
            }
        }

        if events.send(&token, Stroke::Ping).await.is_err() {
            break;
        }

        if let Err(err) = pong.send(&token, ()).await {
            debug!(error = %err, "responder stopping on send");
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stroke_display() {
        assert_eq!(Stroke::Ping.to_string(), "ping");
        assert_eq!(Stroke::Pong.to_string(), "pong");
    }

    #[tokio::test]
    async fn test_zero_exchanges_is_empty() {
        let token = CancelToken::new();
        assert_eq!(rally(&token, 0, 0).await, CancelResult::Ok(Vec::new()));
    }

    #[tokio::test]
    async fn test_huge_rally_under_canceled_token_returns_cause() {
        let token = CancelToken::new();
        token.cancel();

        let result = rally(&token, usize::MAX / 2, 0).await;
        assert_eq!(result.cause(), Some(crate::concurrency::cancel::CancelCause::Canceled));
        assert!(result.value().is_empty());
    }

    #[tokio::test]
    async fn test_single_exchange() {
        let token = CancelToken::new();
        assert_eq!(
            rally(&token, 1, 0).await,
            CancelResult::Ok(vec![Stroke::Ping, Stroke::Pong])
        );
    }
}
