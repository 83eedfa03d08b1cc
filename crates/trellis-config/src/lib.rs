//! Typed configuration for Trellis services.
//!
//! [`AppConfig`] gathers everything a service reads at startup: deployment
//! tags, listener and timeout knobs, notification credentials, logging,
//! metrics, and importer defaults. [`ConfigLoader`] builds it in layers:
//!
//! 1. built-in defaults
//! 2. an optional TOML file
//! 3. a `.env` file loaded into the process environment
//! 4. environment variables (`APP_PORT`, `API_TIMEOUT`, `NOTIFICATIONS_SLACK_WEBHOOK_URL`, ...)
//!
//! The result is constructed once in `main` and passed to the server,
//! notifier, and importer.
//!
//! # Example
//!
//! ```no_run
//! use trellis_config::ConfigLoader;
//!
//! # fn main() -> Result<(), trellis_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("trellis.toml")?
//!     .with_dotenv()?
//!     .load()?;
//!
//! println!("listening on port {}", config.server.port);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [app]
//! name = "billing"
//! env = "production"
//!
//! [server]
//! port = 8080
//! api_timeout_secs = 3
//!
//! [notifications]
//! slack_webhook_url = "https://hooks.slack.com/services/..."
//! ```

#![doc(html_root_url = "https://docs.rs/trellis-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::{
    AppConfig, AppSettings, ImportSettings, LoggingSettings, MetricsSettings, NotificationSettings,
    ServerSettings,
};
pub use error::ConfigError;
pub use loader::ConfigLoader;
