//! Application configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::presence::DEFAULT_PRESENCE_TTL;

/// Where sessions, messages, users and audit entries live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// In-process tables, lost on restart
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND", s.to_string())),
        }
    }
}

/// Where agent presence records live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceBackend {
    Redis,
    Memory,
}

impl PresenceBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

impl FromStr for PresenceBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("PRESENCE_BACKEND", s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::Invalid("LOG_FORMAT", s.to_string())),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Presence
    pub presence_backend: PresenceBackend,
    pub redis_url: String,
    pub presence_ttl: Duration,

    // Logging
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend: StoreBackend = parse_or("STORE_BACKEND", StoreBackend::Postgres)?;

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),

            // Database
            store_backend,
            database_url,
            database_max_connections: parse_number("DATABASE_MAX_CONNECTIONS", 10)?,

            // Presence
            presence_backend: parse_or("PRESENCE_BACKEND", PresenceBackend::Redis)?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            presence_ttl: parse_ttl("PRESENCE_TTL_SECS", DEFAULT_PRESENCE_TTL)?,

            // Logging
            log_format: parse_or("LOG_FORMAT", LogFormat::default())?,
        })
    }
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr<Err = ConfigError>,
{
    match env::var(key) {
        Ok(raw) => raw.parse(),
        Err(_) => Ok(default),
    }
}

fn parse_number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, raw)),
        Err(_) => Ok(default),
    }
}

/// Whole seconds, at least one
fn parse_ttl(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match parse_number(key, default.as_secs())? {
        0 => Err(ConfigError::Invalid(key, "0".to_string())),
        secs => Ok(Duration::from_secs(secs)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
