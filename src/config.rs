use crate::load::loader::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_LINE_BYTES};
use crate::load::{LoadMode, LoadOptions};
use crate::store::StoreConfig;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}'")]
    InvalidValue { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

fn env_parse<T: FromStr, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidValue {
                    key,
                    value: value.clone(),
                })
        }
        _ => Ok(default),
    }
}

fn env_usize<F>(lookup: &F, key: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = env_parse(lookup, key, default)?;
    if value == 0 {
        return Err(ConfigError::Zero { key });
    }
    Ok(value)
}

fn env_u64<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    env_parse(lookup, key, default)
}

fn env_bool<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(default),
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}

fn env_string<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Runtime configuration for bulk loads.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupConfig {
    pub store_path: PathBuf,
    pub batch_size: usize,
    pub pipelined: bool,
    pub queue_depth: usize,
    pub parse_threads: usize,
    pub cache_capacity_mb: u64,
    pub report_interval: Duration,
    pub skip_log_limit: u64,
    pub max_line_bytes: usize,
}

impl LookupConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            store_path: PathBuf::from(env_string(&lookup, "LOOKUP_STORE_PATH", "./data/lookup")),
            batch_size: env_usize(&lookup, "LOOKUP_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            pipelined: env_bool(&lookup, "LOOKUP_PIPELINED", false)?,
            queue_depth: env_usize(&lookup, "LOOKUP_QUEUE_DEPTH", 4)?,
            parse_threads: env_usize(&lookup, "LOOKUP_PARSE_THREADS", num_cpus::get())?,
            cache_capacity_mb: env_u64(&lookup, "LOOKUP_CACHE_CAPACITY_MB", 256)?,
            report_interval: Duration::from_secs(env_u64(
                &lookup,
                "LOOKUP_REPORT_INTERVAL_SECS",
                15,
            )?),
            skip_log_limit: env_u64(&lookup, "LOOKUP_SKIP_LOG_LIMIT", 10)?,
            max_line_bytes: env_usize(&lookup, "LOOKUP_MAX_LINE_BYTES", DEFAULT_MAX_LINE_BYTES)?,
        })
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.store_path).with_cache_capacity_mb(self.cache_capacity_mb)
    }

    pub fn load_options(&self) -> LoadOptions {
        let mode = if self.pipelined {
            LoadMode::Pipelined {
                queue_depth: self.queue_depth,
                parse_threads: self.parse_threads,
            }
        } else {
            LoadMode::Sequential
        };

        LoadOptions {
            batch_size: self.batch_size,
            mode,
            max_line_bytes: self.max_line_bytes,
        }
    }
}
