use metrics_exporter_prometheus::PrometheusHandle;
use weave::metrics::register_metrics;
use weave_telemetry::metrics::{init_metrics_handle, init_metrics as init_metrics_listener};

use crate::error::{RunnerError, RunnerResult};

/// Installs the metrics recorder and describes the weave metrics.
///
/// Serves them on `port` when given. Otherwise returns a handle for rendering them.
pub fn init_metrics(port: Option<u16>) -> RunnerResult<Option<PrometheusHandle>> {
    let handle = match port {
        Some(port) => {
            init_metrics_listener(port, env!("CARGO_PKG_NAME")).map_err(RunnerError::config)?;
            None
        }
        None => Some(init_metrics_handle().map_err(RunnerError::config)?),
    };

    register_metrics();

    Ok(handle)
}
