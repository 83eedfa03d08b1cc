//! Listener configuration.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use trellis_server::ServerConfig;
//!
//! let config = ServerConfig::builder()
//!     .port(9000)
//!     .read_timeout(Duration::from_secs(5))
//!     .build();
//!
//! assert_eq!(config.socket_addr().to_string(), "0.0.0.0:9000");
//! assert!(config.tls().is_none());
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use trellis_config::AppConfig;

/// Default listener port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default header read timeout in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;

/// Default response production bound in seconds.
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;

/// Default maximum header buffer.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 1 << 20;

/// Default cap on a buffered request body (32 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 << 20;

/// Drain window after a shutdown signal.
pub const SHUTDOWN_DRAIN_SECS: u64 = 10;

/// Smallest buffer the HTTP/1 codec accepts.
const MIN_BUF_SIZE: usize = 8192;

/// Certificate and key files for TLS mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM certificate chain.
    pub cert_file: PathBuf,
    /// PEM private key.
    pub key_file: PathBuf,
}

/// Listener configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    host: IpAddr,
    port: u16,
    read_timeout: Duration,
    write_timeout: Duration,
    max_header_bytes: usize,
    max_body_bytes: usize,
    shutdown_timeout: Duration,
    tls: Option<TlsConfig>,
    notify_service_status: bool,
}

impl ServerConfig {
    /// Creates a builder with defaults.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Bind address.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Header read timeout; also bounds reading the request body.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Bound on producing a response once the request is read.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Maximum header buffer.
    #[must_use]
    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    /// Maximum buffered request body.
    #[must_use]
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Buffer size handed to the HTTP/1 codec.
    pub(crate) fn codec_buf_size(&self) -> usize {
        self.max_header_bytes.max(MIN_BUF_SIZE)
    }

    /// Drain window after a shutdown signal.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// TLS files, when serving HTTPS.
    #[must_use]
    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    /// Whether start/stop notices are sent.
    #[must_use]
    pub fn notify_service_status(&self) -> bool {
        self.notify_service_status
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<&AppConfig> for ServerConfig {
    fn from(config: &AppConfig) -> Self {
        let server = &config.server;
        let mut builder = Self::builder()
            .port(server.port)
            .read_timeout(server.read_timeout())
            .write_timeout(server.write_timeout())
            .max_header_bytes(server.max_header_bytes)
            .max_body_bytes(server.max_body_bytes)
            .notify_service_status(server.notify_service_status);
        if let (Some(cert), Some(key)) = (&server.tls_cert_file, &server.tls_key_file) {
            builder = builder.tls(cert.clone(), key.clone());
        }
        builder.build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Creates a builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ServerConfig {
                host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                port: DEFAULT_PORT,
                read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
                write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
                max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
                shutdown_timeout: Duration::from_secs(SHUTDOWN_DRAIN_SECS),
                tls: None,
                notify_service_status: false,
            },
        }
    }

    /// Sets the bind host. Defaults to `0.0.0.0`.
    #[must_use]
    pub fn host(mut self, host: IpAddr) -> Self {
        self.config.host = host;
        self
    }

    /// Sets the port. `0` picks an ephemeral port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the header read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Sets the response production bound.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Sets the maximum header buffer.
    #[must_use]
    pub fn max_header_bytes(mut self, bytes: usize) -> Self {
        self.config.max_header_bytes = bytes;
        self
    }

    /// Sets the maximum buffered request body.
    #[must_use]
    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.config.max_body_bytes = bytes;
        self
    }

    /// Sets the drain window.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Serves HTTPS with the given PEM files.
    #[must_use]
    pub fn tls(mut self, cert_file: impl Into<PathBuf>, key_file: impl Into<PathBuf>) -> Self {
        self.config.tls = Some(TlsConfig {
            cert_file: cert_file.into(),
            key_file: key_file.into(),
        });
        self
    }

    /// Enables start/stop notices.
    #[must_use]
    pub fn notify_service_status(mut self, enabled: bool) -> Self {
        self.config.notify_service_status = enabled;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
