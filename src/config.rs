//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CacheError;

/// Largest page a caller may configure
pub const MAX_PAGE_SIZE: usize = 200;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub retention: RetentionConfig,
    pub logging: LoggingConfig,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
    /// How long a statement waits on a locked file before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// How long a caller waits for the store's connection; 0 waits indefinitely
    #[serde(default)]
    pub acquire_timeout_ms: u64,
    /// Optional schema script replacing the bundled one
    #[serde(default)]
    pub schema_path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// Config for a database file with every other knob at its default
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
            acquire_timeout_ms: 0,
            schema_path: None,
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Record handling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Rows returned per page (default: 20)
    pub page_size: usize,
    /// Record field holding the decimal status identifier (default: "idstr")
    pub id_key: String,
    /// Largest payload blob accepted on write (default: 1 MiB)
    pub max_payload_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_size: crate::service::DEFAULT_PAGE_SIZE,
            id_key: "idstr".to_string(),
            max_payload_bytes: 1024 * 1024,
        }
    }
}

/// Retention configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Rows older than this are swept (default: 432000 = 5 days)
    pub max_age_seconds: u64,
    /// Periodic sweep interval; 0 sweeps only on the background signal
    pub sweep_interval_seconds: u64,
}

impl RetentionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: 5 * 24 * 60 * 60,
            sweep_interval_seconds: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (STATUSCACHE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, CacheError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("database.path", "data/status.db")?
            .set_default("database.busy_timeout_ms", 5000)?
            .set_default("database.acquire_timeout_ms", 0)?
            .set_default("cache.page_size", 20)?
            .set_default("cache.id_key", "idstr")?
            .set_default("cache.max_payload_bytes", 1024 * 1024)?
            .set_default("retention.max_age_seconds", 5 * 24 * 60 * 60)?
            .set_default("retention.sweep_interval_seconds", 0)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("STATUSCACHE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: Self = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Defaults for a database file, without touching files or environment
    pub fn for_database(path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseConfig::at(path),
            cache: CacheConfig::default(),
            retention: RetentionConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.cache.page_size == 0 || self.cache.page_size > MAX_PAGE_SIZE {
            return Err(CacheError::Config(format!(
                "cache.page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if self.cache.id_key.trim().is_empty() {
            return Err(CacheError::Config(
                "cache.id_key must not be empty".to_string(),
            ));
        }

        if self.cache.max_payload_bytes == 0 {
            return Err(CacheError::Config(
                "cache.max_payload_bytes must be greater than 0".to_string(),
            ));
        }

        if self.retention.max_age_seconds == 0 {
            return Err(CacheError::Config(
                "retention.max_age_seconds must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            tracing::warn!(
                format = %self.logging.format,
                "Unknown logging.format, falling back to pretty"
            );
        }

        Ok(())
    }
}
