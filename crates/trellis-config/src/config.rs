//! Configuration records and their defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use trellis_core::ServiceInfo;
use trellis_telemetry::{LogConfig, LogFormat, MetricsConfig};

use crate::ConfigError;

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Deployment tags.
    pub app: AppSettings,
    /// Listener and timeouts.
    pub server: ServerSettings,
    /// Notification credentials.
    pub notifications: NotificationSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Metrics exporter.
    pub metrics: MetricsSettings,
    /// Importer defaults.
    pub import: ImportSettings,
}

impl AppConfig {
    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.api_timeout_secs == 0 {
            return Err(ConfigError::validation_error("api_timeout_secs must be greater than zero"));
        }
        if self.server.max_header_bytes == 0 {
            return Err(ConfigError::validation_error("max_header_bytes must be greater than zero"));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::validation_error("max_body_bytes must be greater than zero"));
        }
        if self.import.workers == 0 {
            return Err(ConfigError::validation_error("import.workers must be greater than zero"));
        }
        if self.server.tls_cert_file.is_some() != self.server.tls_key_file.is_some() {
            return Err(ConfigError::validation_error(
                "tls_cert_file and tls_key_file must be set together",
            ));
        }
        Ok(())
    }

    /// Deployment tags for logs and notifications.
    #[must_use]
    pub fn service_info(&self) -> ServiceInfo {
        ServiceInfo {
            app_name: self.app.name.clone(),
            env: self.app.env.clone(),
            container: self.app.container.clone(),
            version: self.app.version.clone(),
        }
    }

    /// Logging configuration for `trellis_telemetry::init_logging`.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig::production()
            .with_level(self.logging.level.clone())
            .with_format(self.logging.format)
    }

    /// Metrics configuration for `trellis_telemetry::init_metrics`.
    #[must_use]
    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            enabled: self.metrics.enabled,
            addr: self.metrics.addr.clone(),
        }
    }
}

/// Deployment tags (`APP_NAME`, `APPS_ENV`, `CONTAINER_NAME`, `APP_VERSION`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppSettings {
    /// Application name.
    pub name: String,
    /// Environment tag.
    pub env: String,
    /// Instance tag.
    pub container: String,
    /// Application version.
    pub version: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "trellis".to_string(),
            env: "development".to_string(),
            container: String::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    /// Listener port (`APP_PORT`).
    pub port: u16,
    /// Per-request deadline in seconds (`API_TIMEOUT`).
    pub api_timeout_secs: u64,
    /// Header read timeout in seconds (`SERVER_READ_TIMEOUT`).
    pub read_timeout_secs: u64,
    /// Response production bound in seconds (`SERVER_WRITE_TIMEOUT`).
    pub write_timeout_secs: u64,
    /// Max header buffer in bytes (`SERVER_MAX_HEADER_BYTES`).
    pub max_header_bytes: usize,
    /// Max buffered request body in bytes (`SERVER_MAX_BODY_BYTES`).
    pub max_body_bytes: usize,
    /// Add `X-XSS-Protection` / `X-Content-Type-Options` (`SECURE_HEADERS`).
    pub secure_headers: bool,
    /// PEM certificate chain (`TLS_CERT_FILE`).
    pub tls_cert_file: Option<PathBuf>,
    /// PEM private key (`TLS_KEY_FILE`).
    pub tls_key_file: Option<PathBuf>,
    /// Post start/stop notices (`NOTIFY_SERVICE_STATUS`).
    pub notify_service_status: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            api_timeout_secs: 3,
            read_timeout_secs: 10,
            write_timeout_secs: 10,
            max_header_bytes: 1 << 20,
            max_body_bytes: 32 << 20,
            secure_headers: true,
            tls_cert_file: None,
            tls_key_file: None,
            notify_service_status: false,
        }
    }
}

impl ServerSettings {
    /// Per-request deadline.
    #[must_use]
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Header read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Response production bound.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Whether both TLS files are configured.
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        self.tls_cert_file.is_some() && self.tls_key_file.is_some()
    }
}

/// Notification sink credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationSettings {
    /// Slack webhook; activates the Slack sink (`NOTIFICATIONS_SLACK_WEBHOOK_URL`).
    pub slack_webhook_url: Option<String>,
    /// Alternate Slack webhook for importer summaries (`NOTIFICATION_SLACK_INFO_WEBHOOK`).
    pub slack_info_webhook: Option<String>,
    /// Telegram bot token; activates the Telegram sink (`NOTIFICATIONS_TELEGRAM_TOKEN`).
    pub telegram_token: Option<String>,
    /// Telegram chat id (`NOTIFICATIONS_TELEGRAM_CHAT_ID`).
    pub telegram_chat_id: Option<String>,
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Filter directive (`LOG_LEVEL`).
    pub level: String,
    /// Output format (`LOG_FORMAT`).
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Metrics exporter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsSettings {
    /// Install the Prometheus listener (`METRICS_ENABLED`).
    pub enabled: bool,
    /// Listener address (`METRICS_ADDR`).
    pub addr: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Importer defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportSettings {
    /// Worker tasks per import (`IMPORT_WORKERS`).
    pub workers: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self { workers: 10 }
    }
}
