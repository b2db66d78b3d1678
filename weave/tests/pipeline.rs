#![cfg(feature = "test-utils")]

use std::time::Duration;

use weave::concurrency::cancel::{CancelCause, CancelResult, CancelToken};
use weave::pipeline::{Pipeline, run_pipeline, run_transform};
use weave::test_utils::notify::timed;
use weave_config::shared::PipelineConfig;
use weave_telemetry::tracing::init_test_tracing;

fn is_perfect_square(value: u64) -> bool {
    let root = (value as f64).sqrt() as u64;
    (root.saturating_sub(1)..=root + 1).any(|candidate| candidate * candidate == value)
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_yields_squares_divisible_by_three() {
    init_test_tracing();
    let token = CancelToken::new();

    let result = timed("pipeline", run_pipeline(&token, 5000, 8, 4)).await;
    let CancelResult::Ok(mut values) = result else {
        panic!("pipeline should not be cancelled");
    };

    assert!(values.iter().all(|value| value % 3 == 0));
    assert!(values.iter().all(|value| is_perfect_square(*value)));

    // Exactly the squares of multiples of three below 5000 make it through.
    values.sort_unstable();
    let expected: Vec<u64> = (0..5000u64)
        .filter(|value| value % 3 == 0)
        .map(|value| value * value)
        .collect();
    assert_eq!(values, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_from_config_runs_with_configured_sizes() {
    init_test_tracing();
    let token = CancelToken::new();
    let pipeline = Pipeline::new(PipelineConfig {
        buffer: 0,
        width: 3,
    });
    assert_eq!(pipeline.config().width, 3);

    let values = timed("pipeline", pipeline.run(&token, 30))
        .await
        .into_result()
        .unwrap();
    assert_eq!(values.len(), 10);
}

#[tokio::test]
async fn pre_cancelled_pipeline_reports_canceled() {
    init_test_tracing();
    let token = CancelToken::new();
    token.cancel();

    let result = run_pipeline(&token, 1_000, 4, 2).await;
    assert_eq!(result.cause(), Some(CancelCause::Canceled));
}

#[tokio::test(flavor = "multi_thread")]
async fn huge_pipeline_times_out_with_partial_results() {
    init_test_tracing();
    let token = CancelToken::new().child_with_timeout(Duration::from_millis(1));

    let result = timed("pipeline", run_pipeline(&token, 1_000_000_000, 0, 1)).await;
    assert_eq!(result.cause(), Some(CancelCause::DeadlineExceeded));
    assert!(result.value().iter().all(|value| value % 3 == 0));
}

#[tokio::test(flavor = "multi_thread")]
async fn transform_returns_exactly_n_results() {
    init_test_tracing();

    for width in [1, 100] {
        for buffer in [0, 100, 1000] {
            let token = CancelToken::new();
            let result = timed(
                "transform",
                run_transform(&token, 30_000, width, buffer, |value| value * 2),
            )
            .await;

            let mut values = result.into_result().unwrap();
            assert_eq!(values.len(), 30_000, "width {width}, buffer {buffer}");

            values.sort_unstable();
            assert!(values.iter().enumerate().all(|(i, value)| *value == i as u64 * 2));
        }
    }
}

#[tokio::test]
async fn pre_cancelled_transform_reports_canceled() {
    init_test_tracing();
    let token = CancelToken::new();
    token.cancel();

    let result = run_transform(&token, 30_000, 4, 10, |value| value).await;
    assert_eq!(result.cause(), Some(CancelCause::Canceled));
    assert!(result.value().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn transform_deadline_reports_deadline_exceeded() {
    init_test_tracing();
    let token = CancelToken::new().child_with_timeout(Duration::from_millis(1));

    let result = timed(
        "transform",
        run_transform(&token, 1_000_000_000, 1, 0, |value| value + 1),
    )
    .await;
    assert_eq!(result.cause(), Some(CancelCause::DeadlineExceeded));
    assert!(result.value().len() < 1_000_000_000);
}
