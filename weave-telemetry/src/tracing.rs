use std::io;
use std::sync::Once;

use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::log_tracer::SetLoggerError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};
use weave_config::Environment;

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Environment variable enabling log output in tests.
const ENABLE_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] io::Error),

    #[error("failed to install the log bridge: {0}")]
    LogTracer(#[from] SetLoggerError),

    #[error("failed to install the global tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Flushes buffered log lines when dropped.
///
/// Keep it alive until the end of `main`, otherwise trailing lines are lost.
#[must_use = "log lines are dropped once the flusher goes out of scope"]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Installs the global subscriber for a service named `app_name`.
///
/// Logs go to stdout through a non-blocking writer. Output is JSON in `prod` and
/// human-readable otherwise, filtered by `RUST_LOG` (default `info`). Records emitted
/// through the `log` facade are forwarded as well.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load()?;
    tracing_log::LogTracer::init()?;

    let (writer, guard) = tracing_appender::non_blocking(io::stdout());
    let filter = env_filter();

    if environment.is_prod() {
        let subscriber = Registry::default().with(filter).with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(writer),
        );
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default()
            .with(filter)
            .with(fmt::layer().pretty().with_writer(writer));
        tracing::subscriber::set_global_default(subscriber)?;
    }

    tracing::info!(app = app_name, %environment, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}

/// Installs a test subscriber once per process when `ENABLE_TRACING` is set.
///
/// Output goes through the test harness writer, so it is captured per test.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        if std::env::var(ENABLE_TRACING_ENV_NAME).is_err() {
            return;
        }

        let subscriber = Registry::default()
            .with(env_filter())
            .with(fmt::layer().with_test_writer());

        // Another harness may have installed a subscriber already.
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_can_be_initialized_repeatedly() {
        init_test_tracing();
        init_test_tracing();
        tracing::debug!("still fine");
    }
}
