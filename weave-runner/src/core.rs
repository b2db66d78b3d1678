use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};
use weave::combinators::{fan_in_with_config, repeat_with};
use weave::concurrency::cancel::{CancelCause, CancelResult, CancelToken};
use weave::error::WeaveError;
use weave::pipeline::Pipeline;
use weave::rally::rally_with_config;
use weave::workers::pool::WorkerPool;
use weave_config::shared::{RunnerConfig, Workload};

use crate::error::RunnerResult;

/// Outcome of one workload run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub workload: &'static str,
    /// Items produced before the run finished or was cut short.
    pub items: usize,
    pub cause: Option<CancelCause>,
}

/// Runs the configured workload under a root token wired to shutdown signals.
///
/// A signal cancels the run gracefully. Running past `timeout_ms` is an error.
pub async fn start_runner_with_config(config: RunnerConfig) -> RunnerResult<RunSummary> {
    info!("starting runner service");
    log_config(&config);

    let root = CancelToken::new();
    let token = match config.timeout() {
        Some(timeout) => root.child_with_timeout(timeout),
        None => root.child(),
    };

    let shutdown_handle = tokio::spawn(cancel_on_shutdown_signal(root.clone()));
    let summary = run_workload(&token, &config).await;

    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    let summary = summary?;
    info!(
        workload = summary.workload,
        items = summary.items,
        cause = ?summary.cause,
        "runner service completed"
    );

    match summary.cause {
        Some(CancelCause::DeadlineExceeded) => {
            Err(WeaveError::from(CancelCause::DeadlineExceeded).into())
        }
        _ => Ok(summary),
    }
}

/// Runs the workload selected in `config` until it completes or `token` fires.
pub async fn run_workload(
    token: &CancelToken,
    config: &RunnerConfig,
) -> RunnerResult<RunSummary> {
    match &config.workload {
        Workload::Pool { tasks } => run_pool(token, config, *tasks).await,
        Workload::Pipeline { items } => {
            let result = Pipeline::new(config.pipeline.clone()).run(token, *items).await;
            Ok(summarize("pipeline", result))
        }
        Workload::FanIn {
            inputs,
            items_per_input,
        } => {
            let streams = (0..*inputs)
                .map(|input| repeat_with(token, *items_per_input, move || input))
                .collect();
            let result = fan_in_with_config(token, streams, &config.fan_in).await;
            Ok(summarize("fan_in", result))
        }
        Workload::Rally => {
            let result = rally_with_config(token, &config.rally).await;
            Ok(summarize("rally", result))
        }
    }
}

async fn run_pool(
    token: &CancelToken,
    config: &RunnerConfig,
    tasks: usize,
) -> RunnerResult<RunSummary> {
    let pool = WorkerPool::from_config(token.clone(), &config.pool);
    let executed = Arc::new(AtomicUsize::new(0));

    for _ in 0..tasks {
        let executed = executed.clone();
        let submitted = pool
            .submit(token, move |_| async move {
                tokio::task::yield_now().await;
                executed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .await;

        if let Err(err) = submitted {
            warn!(error = %err, "stopped submitting tasks");
            break;
        }
    }

    pool.close();
    let waited = pool.wait().await;

    let stats = pool.stats();
    debug!(
        completed = stats.completed,
        failed = stats.failed,
        panicked = stats.panicked,
        "worker pool drained"
    );

    let items = executed.load(Ordering::Relaxed);
    match waited {
        Ok(()) => Ok(RunSummary {
            workload: "pool",
            items,
            cause: None,
        }),
        // The pool reports its own token, whose cause is the one worth surfacing.
        Err(_) if token.is_cancelled() => Ok(RunSummary {
            workload: "pool",
            items,
            cause: token.err(),
        }),
        Err(err) => Err(err.into()),
    }
}

fn summarize<T>(workload: &'static str, result: CancelResult<Vec<T>>) -> RunSummary {
    let (values, cause) = result.into_parts();

    RunSummary {
        workload,
        items: values.len(),
        cause,
    }
}

/// Cancels `root` on Ctrl-C, or on SIGTERM where available.
async fn cancel_on_shutdown_signal(root: CancelToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("sigint (ctrl+c) received, cancelling workload");
                    }
                    _ = sigterm.recv() => {
                        info!("sigterm received, cancelling workload");
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to register sigterm handler, listening for ctrl+c only");
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("sigint (ctrl+c) received, cancelling workload");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("sigint (ctrl+c) received, cancelling workload");
        }
    }

    root.cancel();
}

fn log_config(config: &RunnerConfig) {
    debug!(workload = ?config.workload, timeout_ms = ?config.timeout_ms, "runner config");
    debug!(workers = config.pool.workers, "pool config");
    debug!(
        buffer = config.pipeline.buffer,
        width = config.pipeline.width,
        "pipeline config"
    );
    debug!(
        out_buffer = config.fan_in.out_buffer,
        max_relays = config.fan_in.max_relays,
        "fan-in config"
    );
    debug!(
        exchanges = config.rally.exchanges,
        buffer = config.rally.buffer,
        "rally config"
    );
}

#[cfg(test)]
mod tests {
    use weave_config::shared::{FanInConfig, PipelineConfig, PoolConfig, RallyConfig};

    use super::*;

    fn config(workload: Workload) -> RunnerConfig {
        RunnerConfig {
            workload,
            timeout_ms: None,
            metrics_port: None,
            pool: PoolConfig { workers: 3 },
            pipeline: PipelineConfig {
                buffer: 4,
                width: 2,
            },
            fan_in: FanInConfig {
                out_buffer: 2,
                max_relays: 3,
            },
            rally: RallyConfig {
                exchanges: 20,
                buffer: 0,
            },
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pool_workload_runs_every_task() {
        let token = CancelToken::new();

        let summary = run_workload(&token, &config(Workload::Pool { tasks: 50 }))
            .await
            .unwrap();
        assert_eq!(
            summary,
            RunSummary {
                workload: "pool",
                items: 50,
                cause: None,
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pipeline_workload_counts_filtered_items() {
        let token = CancelToken::new();

        let summary = run_workload(&token, &config(Workload::Pipeline { items: 90 }))
            .await
            .unwrap();
        assert_eq!(summary.items, 30);
        assert_eq!(summary.cause, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fan_in_workload_merges_every_input() {
        let token = CancelToken::new();
        let workload = Workload::FanIn {
            inputs: 7,
            items_per_input: 11,
        };

        let summary = run_workload(&token, &config(workload)).await.unwrap();
        assert_eq!(summary.items, 77);
    }

    #[tokio::test]
    async fn rally_workload_records_both_strokes() {
        let token = CancelToken::new();

        let summary = run_workload(&token, &config(Workload::Rally)).await.unwrap();
        assert_eq!(summary.items, 40);
    }

    #[tokio::test]
    async fn cancelled_pool_workload_reports_cause() {
        let token = CancelToken::new();
        token.cancel();

        let summary = run_workload(&token, &config(Workload::Pool { tasks: 5 }))
            .await
            .unwrap();
        assert_eq!(summary.cause, Some(CancelCause::Canceled));
        assert_eq!(summary.items, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runner_fails_when_deadline_passes() {
        let mut config = config(Workload::Pipeline {
            items: 1_000_000_000,
        });
        config.timeout_ms = Some(5);

        let err = start_runner_with_config(config).await.unwrap_err();
        assert_eq!(err.category(), "workload error");
    }
}
