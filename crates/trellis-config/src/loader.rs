//! Layered configuration loading.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{AppConfig, ConfigError};

/// Builds an [`AppConfig`] from defaults, a TOML file, `.env`, and the environment.
///
/// Later layers override earlier ones. By default the process environment is
/// read at [`ConfigLoader::load`]; tests can substitute an explicit map with
/// [`ConfigLoader::with_vars`].
///
/// # Example
///
/// ```
/// use trellis_config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_vars([("APP_PORT", "9000"), ("API_TIMEOUT", "5")])
///     .load()
///     .unwrap();
///
/// assert_eq!(config.server.port, 9000);
/// assert_eq!(config.server.api_timeout_secs, 5);
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: AppConfig,
    vars: Option<HashMap<String, String>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Starts from the built-in defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            vars: None,
        }
    }

    /// Loads a TOML file; fails when it does not exist.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        self.config = toml::from_str(&content)?;
        Ok(self)
    }

    /// Loads a TOML file when it exists.
    pub fn with_optional_file(self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads `.env` from the current directory or its ancestors into the
    /// process environment. A missing file is not an error; variables already
    /// set in the environment win.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::DotEnv(e.to_string())),
        }
    }

    /// Loads a specific env file into the process environment.
    pub fn with_dotenv_file(self, path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        dotenvy::from_path(&path)
            .map_err(|e| ConfigError::DotEnv(format!("{}: {e}", path.display())))?;
        Ok(self)
    }

    /// Reads variables from `vars` instead of the process environment.
    #[must_use]
    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Applies environment overrides and validates.
    pub fn load(self) -> Result<AppConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides without validating.
    pub fn load_unvalidated(mut self) -> Result<AppConfig, ConfigError> {
        let vars = match self.vars.take() {
            Some(vars) => vars,
            None => env::vars().collect(),
        };
        let mut keys: Vec<&String> = vars.keys().collect();
        keys.sort();
        for key in keys {
            self.apply_env_var(key, &vars[key])?;
        }
        Ok(self.config)
    }

    fn apply_env_var(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let c = &mut self.config;
        match key {
            "APP_NAME" => c.app.name = value.to_string(),
            "APPS_ENV" => c.app.env = value.to_string(),
            "CONTAINER_NAME" => c.app.container = value.to_string(),
            "APP_VERSION" => c.app.version = value.to_string(),

            "APP_PORT" => c.server.port = parse_number(key, value)?,
            "API_TIMEOUT" => c.server.api_timeout_secs = parse_number(key, value)?,
            "SERVER_READ_TIMEOUT" => c.server.read_timeout_secs = parse_number(key, value)?,
            "SERVER_WRITE_TIMEOUT" => c.server.write_timeout_secs = parse_number(key, value)?,
            "SERVER_MAX_HEADER_BYTES" => c.server.max_header_bytes = parse_number(key, value)?,
            "SERVER_MAX_BODY_BYTES" => c.server.max_body_bytes = parse_number(key, value)?,
            "SECURE_HEADERS" => c.server.secure_headers = parse_flag(key, value)?,
            "TLS_CERT_FILE" => c.server.tls_cert_file = non_empty(value).map(PathBuf::from),
            "TLS_KEY_FILE" => c.server.tls_key_file = non_empty(value).map(PathBuf::from),
            "NOTIFY_SERVICE_STATUS" => c.server.notify_service_status = parse_flag(key, value)?,

            "NOTIFICATIONS_SLACK_WEBHOOK_URL" => {
                c.notifications.slack_webhook_url = non_empty(value).map(str::to_string);
            }
            "NOTIFICATION_SLACK_INFO_WEBHOOK" => {
                c.notifications.slack_info_webhook = non_empty(value).map(str::to_string);
            }
            "NOTIFICATIONS_TELEGRAM_TOKEN" => {
                c.notifications.telegram_token = non_empty(value).map(str::to_string);
            }
            "NOTIFICATIONS_TELEGRAM_CHAT_ID" => {
                c.notifications.telegram_chat_id = non_empty(value).map(str::to_string);
            }

            "LOG_LEVEL" => c.logging.level = value.to_string(),
            "LOG_FORMAT" => {
                c.logging.format = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected 'json' or 'pretty'"))?;
            }

            "METRICS_ENABLED" => c.metrics.enabled = parse_flag(key, value)?,
            "METRICS_ADDR" => c.metrics.addr = value.to_string(),

            "IMPORT_WORKERS" => c.import.workers = parse_number(key, value)?,

            _ => {}
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
