//! Weave runner service binary.
//!
//! Loads configuration, initializes telemetry and runs one configured workload under a
//! root cancellation token that shutdown signals and the optional deadline cancel.

use tracing::{debug, error};
use weave_config::shared::RunnerConfig;
use weave_telemetry::tracing::init_tracing;

use crate::config::load_runner_config;
use crate::core::start_runner_with_config;
use crate::error::{RunnerError, RunnerResult};

mod config;
mod core;
mod error;
mod metrics;

fn main() -> RunnerResult<()> {
    let runner_config = load_runner_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(RunnerError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(runner_config))?;

    Ok(())
}

async fn async_main(runner_config: RunnerConfig) -> RunnerResult<()> {
    let metrics_handle = metrics::init_metrics(runner_config.metrics_port)?;

    let result = start_runner_with_config(runner_config).await;

    if let Some(handle) = metrics_handle {
        debug!(metrics = %handle.render(), "final metrics");
    }

    if let Err(err) = result {
        error!("{err}");
        eprint!("{}", err.render_report());

        return Err(err);
    }

    Ok(())
}
