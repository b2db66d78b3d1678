use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::{sync::Mutex, time::Duration};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::trace;

/// Interval between two upkeep passes over the recorder's histograms.
const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

// Installing a recorder is global and fails the second time, while tests call
// `init_metrics_handle` many times. The fallible initialization rules out `OnceLock`.
static PROMETHEUS_HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Installs the Prometheus recorder once and returns a handle for rendering.
///
/// Later calls return a clone of the cached handle. Must be called from within a
/// Tokio runtime, which hosts the periodic upkeep task.
pub fn init_metrics_handle() -> Result<PrometheusHandle, BuildError> {
    let mut prometheus_handle = PROMETHEUS_HANDLE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(handle) = &*prometheus_handle {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    *prometheus_handle = Some(handle.clone());

    let upkeep_handle = handle.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(UPKEEP_INTERVAL).await;
            trace!("running metrics upkeep");
            upkeep_handle.run_upkeep();
        }
    });

    Ok(handle)
}

/// Installs the Prometheus recorder with an HTTP listener on `[::]:{port}/metrics`.
pub fn init_metrics(port: u16, service: &str) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port))
        .add_global_label("service", service)
        .install()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_is_cached_across_calls() {
        let first = init_metrics_handle().unwrap();
        let second = init_metrics_handle().unwrap();

        assert_eq!(first.render(), second.render());
    }
}
