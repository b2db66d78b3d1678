#![cfg(feature = "test-utils")]

use std::time::Duration;

use weave::concurrency::cancel::{CancelCause, CancelToken};
use weave::rally::{Stroke, rally, rally_with_config};
use weave::test_utils::notify::timed;
use weave_config::shared::RallyConfig;
use weave_telemetry::tracing::init_test_tracing;

fn assert_alternates(history: &[Stroke]) {
    for (i, pair) in history.windows(2).enumerate() {
        assert_ne!(pair[0], pair[1], "history[{i}] == history[{}]", i + 1);
    }

    for pair in history.chunks_exact(2) {
        assert_eq!(pair, [Stroke::Ping, Stroke::Pong]);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unbuffered_rally_alternates() {
    init_test_tracing();
    let token = CancelToken::new();

    let history = timed("rally", rally(&token, 2000, 0))
        .await
        .into_result()
        .unwrap();

    assert_eq!(history.len(), 4000);
    assert_alternates(&history);
}

#[tokio::test(flavor = "multi_thread")]
async fn buffered_rally_alternates() {
    init_test_tracing();
    let token = CancelToken::new();

    let history = timed("rally", rally(&token, 2000, 10))
        .await
        .into_result()
        .unwrap();

    assert_eq!(history.len(), 4000);
    assert_alternates(&history);
}

#[tokio::test]
async fn rally_from_config() {
    init_test_tracing();
    let token = CancelToken::new();
    let config = RallyConfig {
        exchanges: 25,
        buffer: 1,
    };

    let history = rally_with_config(&token, &config)
        .await
        .into_result()
        .unwrap();
    assert_eq!(history.len(), 50);
    assert_eq!(history.first().map(ToString::to_string).as_deref(), Some("ping"));
}

#[tokio::test(flavor = "multi_thread")]
async fn rally_times_out_with_partial_history() {
    init_test_tracing();
    let token = CancelToken::new().child_with_timeout(Duration::from_millis(100));

    let result = timed("rally", rally(&token, 2_000_000, 10)).await;
    assert_eq!(result.cause(), Some(CancelCause::DeadlineExceeded));

    let history = result.into_value();
    assert!(history.len() < 4_000_000);
    assert_alternates(&history[..history.len() - history.len() % 2]);
}

#[tokio::test]
async fn cancelled_rally_reports_canceled() {
    init_test_tracing();
    let token = CancelToken::new();
    token.cancel();

    let result = rally(&token, 2_000_000, 0).await;
    assert_eq!(result.cause(), Some(CancelCause::Canceled));
    assert!(result.value().is_empty());
}
