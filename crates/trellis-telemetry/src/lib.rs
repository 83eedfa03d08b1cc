//! Logging and metrics for Trellis services.
//!
//! - **Logging**: a `tracing-subscriber` registry with an `EnvFilter` and a
//!   JSON (production) or pretty (development) formatter.
//! - **Metrics**: counters and histograms recorded through the `metrics`
//!   facade, optionally exported by a Prometheus HTTP listener.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `trellis_requests_total` | Counter | `status` | Responses written |
//! | `trellis_request_duration_seconds` | Histogram | - | Pipeline latency |
//! | `trellis_request_timeouts_total` | Counter | - | Deadline expiries |
//! | `trellis_handler_panics_total` | Counter | - | Recovered panics |
//! | `trellis_import_rows_total` | Counter | `outcome` | Imported rows |
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_telemetry::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(trace_id = "…", "ready");
//! ```

#![doc(html_root_url = "https://docs.rs/trellis-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{init_metrics, MetricsConfig};

/// Result type for telemetry initialisation.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
