//! Process configuration, read from `LEDGER_*` environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use ledger_observability::LogFormat;
use thiserror::Error;

pub const ENV_DATABASE_URL: &str = "LEDGER_DATABASE_URL";
pub const ENV_BIND_ADDR: &str = "LEDGER_BIND_ADDR";
pub const ENV_LOG_FORMAT: &str = "LEDGER_LOG_FORMAT";
pub const ENV_QUERY_TIMEOUT_MS: &str = "LEDGER_QUERY_TIMEOUT_MS";
pub const ENV_MAX_CONNECTIONS: &str = "LEDGER_MAX_CONNECTIONS";

const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// `postgres://…` or `sqlite:…`; the dialect follows the backend.
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub log_format: LogFormat,
    /// Deadline applied to every request's store calls.
    pub query_timeout: Option<Duration>,
    pub max_connections: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_format: LogFormat::Json,
            query_timeout: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Unset and empty values
    /// fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get(ENV_DATABASE_URL).unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let raw_addr = get(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid(ENV_BIND_ADDR, &raw_addr, e))?;

        let log_format = match get(ENV_LOG_FORMAT) {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|e| ConfigError::invalid(ENV_LOG_FORMAT, &raw, e))?,
            None => LogFormat::default(),
        };

        let query_timeout = get(ENV_QUERY_TIMEOUT_MS)
            .map(|raw| match raw.trim().parse::<u64>() {
                Ok(0) => Err(ConfigError::invalid(ENV_QUERY_TIMEOUT_MS, &raw, "must be positive")),
                Ok(ms) => Ok(Duration::from_millis(ms)),
                Err(e) => Err(ConfigError::invalid(ENV_QUERY_TIMEOUT_MS, &raw, e)),
            })
            .transpose()?;

        let max_connections = match get(ENV_MAX_CONNECTIONS) {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(0) => {
                    return Err(ConfigError::invalid(ENV_MAX_CONNECTIONS, &raw, "must be positive"));
                }
                Ok(n) => n,
                Err(e) => return Err(ConfigError::invalid(ENV_MAX_CONNECTIONS, &raw, e)),
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            bind_addr,
            log_format,
            query_timeout,
            max_connections,
        })
    }

    /// In-memory SQLite lives inside one connection, so the pool must not
    /// open a second one or recycle the first.
    pub fn is_in_memory(&self) -> bool {
        self.database_url.starts_with("sqlite:") && self.database_url.contains(":memory:")
    }
}
