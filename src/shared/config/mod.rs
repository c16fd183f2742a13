//! Sync layer configuration
//!
//! Every field has a default, so a configuration file only needs the
//! values it changes:
//!
//! ```toml
//! server_url = "https://tasks.example.com"
//! cache_version = "v2"
//!
//! [backoff]
//! max_secs = 120
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default origin of the remote API
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Schema version this build knows how to create
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Shape of the delay between failed periodic passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// `base_secs` every time
    Fixed,
    /// Doubling from `base_secs` up to `max_secs`, with jitter
    #[default]
    Exponential,
}

/// Backoff applied to periodic passes after transient failures
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub strategy: BackoffKind,
    /// Delay after the first failed pass, in seconds
    pub base_secs: u64,
    /// Upper bound on the delay, in seconds
    pub max_secs: u64,
    /// Random extra delay as a fraction of the computed delay (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffKind::Exponential,
            base_secs: 1,
            max_secs: 300,
            jitter: 0.1,
        }
    }
}

/// Sync layer configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Origin serving both the app shell and the API
    pub server_url: String,
    /// Path prefix of API requests (network-first)
    pub api_prefix: String,
    /// Location of the local database file
    pub database_path: PathBuf,
    /// Schema version to open the local database with
    pub schema_version: u32,
    /// Prefix of cache namespace names
    pub cache_prefix: String,
    /// Version tag of the current cache namespaces
    pub cache_version: String,
    /// Routes cached at install time
    pub static_assets: Vec<String>,
    /// Route served for navigations while offline
    pub offline_page: String,
    /// Background-sync registration tag that triggers a drain
    pub sync_tag: String,
    /// Interval of the periodic drain, in seconds
    pub poll_interval_secs: u64,
    /// Per-request timeout; unset leaves it to the transport
    pub request_timeout_secs: Option<u64>,
    pub backoff: BackoffConfig,
    /// Transient failures after which an action is rejected; unset retries indefinitely
    pub max_transient_attempts: Option<u32>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            api_prefix: "/api/".to_string(),
            database_path: default_database_path(),
            schema_version: CURRENT_SCHEMA_VERSION,
            cache_prefix: "taskapp".to_string(),
            cache_version: "v1".to_string(),
            static_assets: ["/", "/home", "/my-tasks", "/offline", "/manifest.json"]
                .iter()
                .map(|route| route.to_string())
                .collect(),
            offline_page: "/offline".to_string(),
            sync_tag: "sync-tasks".to_string(),
            poll_interval_secs: 30,
            request_timeout_secs: None,
            backoff: BackoffConfig::default(),
            max_transient_attempts: None,
        }
    }
}

/// Platform data directory, falling back to the temp dir
fn default_database_path() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
    path.push("taskapp");
    path.push("local.db");
    path
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Parse a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Build from the environment
    ///
    /// `TASKAPP_CONFIG` names a TOML file to start from; `TASKAPP_SERVER_URL`
    /// and `TASKAPP_DB_PATH` override individual values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("TASKAPP_CONFIG") {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        if let Ok(url) = std::env::var("TASKAPP_SERVER_URL") {
            config.server_url = url;
        }
        if let Ok(path) = std::env::var("TASKAPP_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let origin = reqwest::Url::parse(&self.server_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", self.server_url, e)))?;
        if origin.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl(self.server_url.clone()));
        }
        if !self.api_prefix.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "api_prefix",
                message: "must start with '/'".to_string(),
            });
        }
        if self.schema_version != CURRENT_SCHEMA_VERSION {
            return Err(ConfigError::InvalidValue {
                field: "schema_version",
                message: format!("must be {}", CURRENT_SCHEMA_VERSION),
            });
        }
        if self.cache_version.is_empty() {
            return Err(ConfigError::MissingValue("cache_version"));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval_secs",
                message: "must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(ConfigError::InvalidValue {
                field: "backoff.jitter",
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        Ok(())
    }

    /// Parsed origin
    pub fn origin(&self) -> Result<reqwest::Url, ConfigError> {
        reqwest::Url::parse(&self.server_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", self.server_url, e)))
    }

    /// Absolute URL of a same-origin path
    pub fn url_for(&self, path: &str) -> Result<reqwest::Url, ConfigError> {
        self.origin()?
            .join(path)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// Name of the namespace seeded at install time
    pub fn static_cache_name(&self) -> String {
        format!("{}-static-{}", self.cache_prefix, self.cache_version)
    }

    /// Name of the lazily populated namespace
    pub fn dynamic_cache_name(&self) -> String {
        format!("{}-dynamic-{}", self.cache_prefix, self.cache_version)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.api_prefix = prefix.into();
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = path.into();
        self
    }

    pub fn schema_version(mut self, version: u32) -> Self {
        self.config.schema_version = version;
        self
    }

    pub fn cache_version(mut self, version: impl Into<String>) -> Self {
        self.config.cache_version = version.into();
        self
    }

    pub fn static_assets<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.static_assets = routes.into_iter().map(Into::into).collect();
        self
    }

    pub fn offline_page(mut self, route: impl Into<String>) -> Self {
        self.config.offline_page = route.into();
        self
    }

    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.backoff = backoff;
        self
    }

    pub fn max_transient_attempts(mut self, attempts: u32) -> Self {
        self.config.max_transient_attempts = Some(attempts);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
