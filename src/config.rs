//! Configuration system.
//!
//! Hierarchical loading, later layers override earlier ones:
//! - `config.toml` (checked-in defaults)
//! - `config.local.toml` (git-ignored local overrides)
//! - Environment variables under the `VERDICT_` prefix
//!   (`VERDICT_DATABASE__URL`, `VERDICT_LOGGING__LEVEL`, ...)
//!
//! CLI flags in the server binary override all of these.
//!
//! ```toml
//! [database]
//! url = "/var/lib/verdict/verdict.db"
//! max_open = 32
//!
//! [logging]
//! level = "INFO"
//! sample_rate = 100
//!
//! [http]
//! host = "127.0.0.1"
//! port = 8080
//! ```

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::logging::level_directive;
use crate::store::ConnectionConfig;

/// Main configuration struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Database location and pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file. Required.
    pub url: String,

    /// Maximum open connections.
    #[serde(default = "default_max_open")]
    pub max_open: u32,

    /// Idle connections kept warm.
    #[serde(default = "default_min_idle")]
    pub min_idle: Option<u32>,

    /// Recycle connections older than this many seconds.
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,

    /// Close connections idle longer than this many seconds.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of TRACE, DEBUG, INFO, WARN, ERROR, FATAL.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 1-in-N sampling for warn/error logs on high-rate paths.
    /// Counters increment regardless.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_host")]
    pub host: String,

    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_max_open() -> u32 {
    32
}

fn default_min_idle() -> Option<u32> {
    Some(8)
}

fn default_max_lifetime_secs() -> u64 {
    1800
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_busy_timeout_ms() -> u32 {
    30_000
}

fn default_log_level() -> String {
    "INFO".to_owned()
}

fn default_sample_rate() -> u32 {
    100
}

fn default_http_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_http_port() -> u16 {
    8080
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

impl Config {
    /// Load from the standard layer stack.
    pub fn load() -> Result<Self, figment::Error> {
        let config: Config = Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("VERDICT_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit file, still honoring env overrides.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        let config: Config = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("VERDICT_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), figment::Error> {
        if self.database.url.is_empty() {
            return Err(figment::Error::from(
                "database.url must not be empty".to_owned(),
            ));
        }
        if self.logging.sample_rate == 0 {
            return Err(figment::Error::from(
                "logging.sample_rate must be a positive integer".to_owned(),
            ));
        }
        if level_directive(&self.logging.level).is_none() {
            return Err(figment::Error::from(format!(
                "unknown log level '{}' (expected TRACE, DEBUG, INFO, WARN, ERROR, or FATAL)",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// Pool settings in the form the store layer consumes.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            max_open: self.database.max_open,
            min_idle: self.database.min_idle,
            max_lifetime_secs: self.database.max_lifetime_secs,
            idle_timeout_secs: self.database.idle_timeout_secs,
            busy_timeout_ms: self.database.busy_timeout_ms,
        }
    }
}
