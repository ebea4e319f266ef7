//! Configuration management for the data-access layer.

use std::env;
use std::str::FromStr;

/// Default number of mutations per batch-writer commit.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Default number of batch-writer workers.
pub const DEFAULT_BATCH_WRITERS: usize = 8;

/// Configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Connection pool size
    pub max_connections: u32,
    /// Mutations per batch-writer commit
    pub batch_size: usize,
    /// Concurrent batch-writer workers
    pub batch_writers: usize,
    /// Upsert count at which a sync switches to the batch writer
    pub batch_write_threshold: Option<usize>,
    /// Ceiling on mutations per commit
    pub mutation_limit: Option<usize>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?;

        Ok(Self {
            database_url,
            max_connections: parse_or(&lookup, "MAX_CONNECTIONS", 10)?,
            batch_size: parse_positive(&lookup, "BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            batch_writers: parse_positive(&lookup, "BATCH_WRITERS", DEFAULT_BATCH_WRITERS)?,
            batch_write_threshold: parse_optional(&lookup, "BATCH_WRITE_THRESHOLD")?,
            mutation_limit: parse_optional(&lookup, "MUTATION_LIMIT")?,
        })
    }
}

fn parse_optional<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }))
        .transpose()
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_optional(lookup, key)?.unwrap_or(default))
}

fn parse_positive<F>(lookup: &F, key: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, key, default)? {
        0 => Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
        }),
        n => Ok(n),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid {key} value: {value}")]
    Invalid { key: &'static str, value: String },
}
