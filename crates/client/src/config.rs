//! Client configuration
//!
//! Loaded from `REHAFLOW_*` environment variables. The binary loads
//! `.env.local` and `.env` from the repository root first.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use rehaflow_domain::{ClassificationMode, ClassifierConfig, DomainError};

use crate::infrastructure::messaging::DEFAULT_COMMAND_TIMEOUT_MS;
use crate::infrastructure::websocket::{
    ReconnectPolicy, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL_MS,
};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8765;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Client configuration loaded from environment
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Sensor server host
    pub host: String,
    /// Sensor server port
    pub port: u16,
    /// Deadline for each command response
    pub command_timeout: Duration,
    /// Deadline for opening the socket
    pub connect_timeout: Duration,
    /// Automatic reconnection after an unexpected close
    pub reconnect: ReconnectPolicy,
    /// Fail in-flight commands when the connection drops instead of letting them time out
    pub cancel_pending_on_disconnect: bool,
    /// Feedback classification settings
    pub classifier: ClassifierConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            reconnect: ReconnectPolicy::default(),
            cancel_pending_on_disconnect: false,
            classifier: ClassifierConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let pressure_threshold: f64 = parse(&get, "REHAFLOW_PRESSURE_THRESHOLD", 1.0)?;
        let mode = match get("REHAFLOW_CLASSIFICATION_MODE") {
            Some(value) => ClassificationMode::from_str(&value)?,
            None => ClassificationMode::default(),
        };
        let classifier = ClassifierConfig::default()
            .with_pressure_threshold(pressure_threshold)
            .with_mode(mode);
        classifier.validate()?;

        let config = Self {
            host: get("REHAFLOW_SENSOR_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse(&get, "REHAFLOW_SENSOR_PORT", DEFAULT_PORT)?,
            command_timeout: Duration::from_millis(parse(
                &get,
                "REHAFLOW_COMMAND_TIMEOUT_MS",
                DEFAULT_COMMAND_TIMEOUT_MS,
            )?),
            connect_timeout: Duration::from_millis(parse(
                &get,
                "REHAFLOW_CONNECT_TIMEOUT_MS",
                DEFAULT_CONNECT_TIMEOUT_MS,
            )?),
            reconnect: ReconnectPolicy::new(
                Duration::from_millis(parse(
                    &get,
                    "REHAFLOW_RECONNECT_INTERVAL_MS",
                    DEFAULT_RECONNECT_INTERVAL_MS,
                )?),
                parse(
                    &get,
                    "REHAFLOW_MAX_RECONNECT_ATTEMPTS",
                    DEFAULT_MAX_RECONNECT_ATTEMPTS,
                )?,
            ),
            cancel_pending_on_disconnect: parse_bool(
                &get,
                "REHAFLOW_CANCEL_PENDING_ON_DISCONNECT",
                false,
            )?,
            classifier,
        };

        config.server_url()?;
        Ok(config)
    }

    /// `ws://<host>:<port>`
    pub fn server_url(&self) -> Result<Url, ConfigError> {
        let raw = format!("ws://{}:{}", self.host, self.port);
        Url::parse(&raw).map_err(|_| ConfigError::InvalidValue {
            key: "REHAFLOW_SENSOR_HOST".to_string(),
            value: self.host.clone(),
        })
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn parse_bool(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match get(key) {
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        },
        None => Ok(default),
    }
}

/// Load `.env.local` then `.env` from the repository root.
///
/// Variables already set are not overridden, so local overrides win.
pub fn load_dotenv_from_repo_root() -> Vec<PathBuf> {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..");
    load_dotenv_from(&repo_root)
}

/// Load `.env.local` then `.env` from `dir`; returns the files that were read.
pub fn load_dotenv_from(dir: &Path) -> Vec<PathBuf> {
    let mut loaded = Vec::new();
    for filename in [".env.local", ".env"] {
        let path = dir.join(filename);
        if !path.exists() {
            continue;
        }
        match dotenvy::from_path(&path) {
            Ok(()) => loaded.push(path),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to load env file"),
        }
    }
    loaded
}
