// Process configuration, read from environment variables at startup.
//
// Everything goes through `AppConfig::from_lookup` so tests can feed values
// without touching the real process environment.

use crate::core::moderation::{FailurePolicy, ModerationPolicy};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const TABLE_NAME_VAR: &str = "CONTENT_MODERATION_TABLE_NAME";
pub const TOPIC_VAR: &str = "CONTENT_MODERATION_TOPIC";

const DEFAULT_DATABASE_URL: &str = "sqlite://data/moderation.db?mode=rwc";
const DEFAULT_CLASSIFIER_URL: &str = "http://127.0.0.1:8088";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("expected 'sqlite' or 'memory', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub table_name: String,
    pub topic: String,
    pub database_url: String,
    pub store_backend: StoreBackend,
    pub classifier_url: String,
    pub classifier_api_key: Option<String>,
    pub policy: ModerationPolicy,
    pub io_timeout: Duration,
    pub bind_addr: String,
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub visibility_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let table_name = var(TABLE_NAME_VAR).ok_or(ConfigError::Missing(TABLE_NAME_VAR))?;
        validate_identifier(TABLE_NAME_VAR, &table_name)?;
        let topic = var(TOPIC_VAR).ok_or(ConfigError::Missing(TOPIC_VAR))?;

        let toxicity_threshold: f64 = parse_or(&var, "TOXICITY_THRESHOLD", 0.3)?;
        if !(0.0..=1.0).contains(&toxicity_threshold) {
            return Err(ConfigError::Invalid {
                name: "TOXICITY_THRESHOLD",
                reason: format!("{} is outside [0, 1]", toxicity_threshold),
            });
        }

        let on_classification_failure = parse_or(
            &var,
            "MODERATION_FAILURE_STATUS",
            FailurePolicy::ReviewRequired,
        )?;

        let batch_size: usize = parse_or(&var, "CONSUMER_BATCH_SIZE", 10)?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "CONSUMER_BATCH_SIZE",
                reason: "must be at least 1".to_string(),
            });
        }

        // A zero timeout would fail every classify and every store write.
        let io_timeout_secs: u64 = parse_or(&var, "IO_TIMEOUT_SECS", 30)?;
        if io_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "IO_TIMEOUT_SECS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            table_name,
            topic,
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            store_backend: parse_or(&var, "CONTENT_STORE_BACKEND", StoreBackend::Sqlite)?,
            classifier_url: var("CLASSIFIER_URL")
                .unwrap_or_else(|| DEFAULT_CLASSIFIER_URL.to_string()),
            classifier_api_key: var("CLASSIFIER_API_KEY"),
            policy: ModerationPolicy {
                toxicity_threshold,
                on_classification_failure,
            },
            io_timeout: Duration::from_secs(io_timeout_secs),
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            batch_size,
            poll_interval: Duration::from_millis(parse_or(&var, "CONSUMER_POLL_INTERVAL_MS", 1000)?),
            visibility_timeout: Duration::from_secs(parse_or(
                &var,
                "QUEUE_VISIBILITY_TIMEOUT_SECS",
                60,
            )?),
        })
    }
}

fn parse_or<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Table names are spliced into SQL, so only plain identifiers are accepted.
fn validate_identifier(name: &'static str, value: &str) -> Result<(), ConfigError> {
    let mut chars = value.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            name,
            reason: format!("'{}' is not a valid table identifier", value),
        })
    }
}
