//! Service configuration.
//!
//! Configuration is read from JSON (every field optional) and then
//! overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `ROWBIND_DB_PATH` | `database.path` |
//! | `ROWBIND_DB_BUSY_TIMEOUT_MS` | `database.busy_timeout_ms` |
//! | `ROWBIND_ENCRYPT_PASSWORD` | `encrypt.password` |
//! | `ROWBIND_ENCRYPT_ITERATIONS` | `encrypt.iterations` |
//! | `ROWBIND_LOG_LEVEL` | `log.level` |

use crate::encrypt::DEFAULT_ITERATIONS;
use rowbind_core::Error;
use rowbind_core::error::ConfigError;
use rowbind_sqlite::SqliteConfig;
use serde::Deserialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub const ENV_DB_PATH: &str = "ROWBIND_DB_PATH";
pub const ENV_DB_BUSY_TIMEOUT_MS: &str = "ROWBIND_DB_BUSY_TIMEOUT_MS";
pub const ENV_ENCRYPT_PASSWORD: &str = "ROWBIND_ENCRYPT_PASSWORD";
pub const ENV_ENCRYPT_ITERATIONS: &str = "ROWBIND_ENCRYPT_ITERATIONS";
pub const ENV_LOG_LEVEL: &str = "ROWBIND_LOG_LEVEL";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub database: DatabaseConfig,
    pub encrypt: EncryptConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file, or `:memory:`
    pub path: String,
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

impl DatabaseConfig {
    pub fn sqlite(&self) -> SqliteConfig {
        SqliteConfig::file(self.path.clone()).busy_timeout(self.busy_timeout_ms)
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EncryptConfig {
    /// Server-side pepper the password encryption key is derived from
    pub password: String,
    pub iterations: u32,
}

impl Default for EncryptConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

// Keep the pepper out of logs.
impl std::fmt::Debug for EncryptConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptConfig")
            .field("password", &"<redacted>")
            .field("iterations", &self.iterations)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. `info` or `rowbind_query=trace`
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AuthConfig {
    /// Parse a JSON document.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid configuration: {}", e),
                source: Some(Box::new(e)),
            })
        })
    }

    /// Defaults overridden from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::default().with_env_overrides()
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, Error> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.database.path = path;
        }
        if let Some(raw) = lookup(ENV_DB_BUSY_TIMEOUT_MS) {
            self.database.busy_timeout_ms = parse_number(ENV_DB_BUSY_TIMEOUT_MS, &raw)?;
        }
        if let Some(password) = lookup(ENV_ENCRYPT_PASSWORD) {
            self.encrypt.password = password;
        }
        if let Some(raw) = lookup(ENV_ENCRYPT_ITERATIONS) {
            self.encrypt.iterations = parse_number(ENV_ENCRYPT_ITERATIONS, &raw)?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log.level = level;
        }
        Ok(self)
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u32, Error> {
    raw.trim().parse().map_err(|e: std::num::ParseIntError| {
        Error::Config(ConfigError {
            message: format!("{} must be a non-negative integer, got {:?}", key, raw),
            source: Some(Box::new(e)),
        })
    })
}

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` wins over `config.level` when set. Calling this more than once
/// is harmless; only the first call installs a subscriber.
pub fn init_tracing(config: &LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .ok();
}
