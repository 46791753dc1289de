//! Process configuration read from environment variables.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `LOTKEEPER_LOT_PREFIX` | `LOT` | prefix of generated lot numbers |
//! | `LOTKEEPER_EXPIRY_WARNING_DAYS` | `30` | look-ahead for "expiring soon" |
//! | `LOTKEEPER_MAX_CONFLICT_RETRIES` | `3` | re-runs after a concurrency conflict |
//! | `USE_PERSISTENT_STORES` | `false` | `true` selects the Postgres store |
//! | `DATABASE_URL` | - | required when persistent stores are on |

use std::str::FromStr;

use thiserror::Error;

use lotkeeper_lots::ExpiryPolicy;
use lotkeeper_lots::expiry::DEFAULT_WARNING_WINDOW_DAYS;

pub const DEFAULT_LOT_PREFIX: &str = "LOT";
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

/// Which lot store the process should run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotkeeperConfig {
    pub lot_prefix: String,
    pub expiry_warning_days: u32,
    pub max_conflict_retries: u32,
    pub backend: StoreBackend,
}

impl Default for LotkeeperConfig {
    fn default() -> Self {
        Self {
            lot_prefix: DEFAULT_LOT_PREFIX.to_string(),
            expiry_warning_days: DEFAULT_WARNING_WINDOW_DAYS,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            backend: StoreBackend::InMemory,
        }
    }
}

impl LotkeeperConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let lot_prefix = match lookup("LOTKEEPER_LOT_PREFIX") {
            Some(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
                    return Err(ConfigError::InvalidValue {
                        name: "LOTKEEPER_LOT_PREFIX",
                        value: raw,
                    });
                }
                trimmed.to_string()
            }
            None => defaults.lot_prefix,
        };

        let expiry_warning_days = parse_var(
            &lookup,
            "LOTKEEPER_EXPIRY_WARNING_DAYS",
            defaults.expiry_warning_days,
        )?;
        let max_conflict_retries = parse_var(
            &lookup,
            "LOTKEEPER_MAX_CONFLICT_RETRIES",
            defaults.max_conflict_retries,
        )?;

        let use_persistent = lookup("USE_PERSISTENT_STORES")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let backend = if use_persistent {
            let database_url = lookup("DATABASE_URL")
                .filter(|url| !url.trim().is_empty())
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            StoreBackend::Postgres { database_url }
        } else {
            StoreBackend::InMemory
        };

        Ok(Self {
            lot_prefix,
            expiry_warning_days,
            max_conflict_retries,
            backend,
        })
    }

    pub fn expiry_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy::new(self.expiry_warning_days)
    }

    pub fn database_url(&self) -> Option<&str> {
        match &self.backend {
            StoreBackend::Postgres { database_url } => Some(database_url),
            StoreBackend::InMemory => None,
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        None => Ok(default),
    }
}
