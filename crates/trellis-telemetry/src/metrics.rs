//! Prometheus metrics.
//!
//! Recording functions are always safe to call: without an installed
//! recorder the `metrics` facade discards the samples.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::{TelemetryError, TelemetryResult};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics exporter configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether to install the exporter.
    pub enabled: bool,
    /// Listen address of the `/metrics` endpoint.
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Installs the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    let handle = PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();
    Ok(())
}

/// Renders the current metrics in Prometheus text format.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!("trellis_requests_total", "Responses written by the pipeline");
    describe_histogram!(
        "trellis_request_duration_seconds",
        "Time from handler spawn to response selection"
    );
    describe_counter!("trellis_request_timeouts_total", "Requests that hit their deadline");
    describe_counter!("trellis_handler_panics_total", "Handler panics recovered");
    describe_counter!("trellis_import_rows_total", "Imported rows by outcome");
}

/// Records one written response.
pub fn record_request(status: u16, duration: Duration) {
    counter!("trellis_requests_total", "status" => status.to_string()).increment(1);
    histogram!("trellis_request_duration_seconds").record(duration.as_secs_f64());
}

/// Records a deadline expiry.
pub fn record_timeout() {
    counter!("trellis_request_timeouts_total").increment(1);
}

/// Records a recovered panic.
pub fn record_panic() {
    counter!("trellis_handler_panics_total").increment(1);
}

/// Records one imported row; `outcome` is `ok` or `failed`.
pub fn record_import_row(outcome: &'static str) {
    counter!("trellis_import_rows_total", "outcome" => outcome).increment(1);
}
