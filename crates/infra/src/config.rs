//! Configuration loading and representation.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    /// Upper bound on any row-hold wait inside a unit of work.
    pub lock_timeout: Duration,
}

impl DatabaseConfig {
    pub const URL: &'static str = "DATABASE_URL";
    pub const MAX_CONNECTIONS: &'static str = "KASIR_DB_MAX_CONNECTIONS";
    pub const MIN_CONNECTIONS: &'static str = "KASIR_DB_MIN_CONNECTIONS";
    pub const ACQUIRE_TIMEOUT_MS: &'static str = "KASIR_DB_ACQUIRE_TIMEOUT_MS";
    pub const LOCK_TIMEOUT_MS: &'static str = "KASIR_LOCK_TIMEOUT_MS";

    /// Settings with defaults for everything but the URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 25,
            min_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(5),
        }
    }

    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through `lookup` (environment, file, test map, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(Self::URL)
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing(Self::URL))?;
        let mut config = Self::new(url);

        if let Some(value) = lookup(Self::MAX_CONNECTIONS) {
            config.max_connections = parse(Self::MAX_CONNECTIONS, &value)?;
        }
        if let Some(value) = lookup(Self::MIN_CONNECTIONS) {
            config.min_connections = parse(Self::MIN_CONNECTIONS, &value)?;
        }
        if let Some(value) = lookup(Self::ACQUIRE_TIMEOUT_MS) {
            config.acquire_timeout = Duration::from_millis(parse(Self::ACQUIRE_TIMEOUT_MS, &value)?);
        }
        if let Some(value) = lookup(Self::LOCK_TIMEOUT_MS) {
            config.lock_timeout = Duration::from_millis(parse(Self::LOCK_TIMEOUT_MS, &value)?);
        }

        if config.max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: Self::MAX_CONNECTIONS,
                value: "0".to_string(),
            });
        }
        if config.min_connections > config.max_connections {
            return Err(ConfigError::Invalid {
                key: Self::MIN_CONNECTIONS,
                value: config.min_connections.to_string(),
            });
        }
        if config.lock_timeout.is_zero() {
            // Postgres reads lock_timeout = 0 as "wait forever".
            return Err(ConfigError::Invalid {
                key: Self::LOCK_TIMEOUT_MS,
                value: "0".to_string(),
            });
        }

        Ok(config)
    }

    /// Connection URL with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        let Some(scheme_end) = self.url.find("://") else {
            return self.url.clone();
        };
        let rest = &self.url[scheme_end + 3..];
        let Some(at) = rest.rfind('@') else {
            return self.url.clone();
        };
        match rest[..at].find(':') {
            Some(colon) => format!(
                "{}{}:***{}",
                &self.url[..scheme_end + 3],
                &rest[..colon],
                &rest[at..]
            ),
            None => self.url.clone(),
        }
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
