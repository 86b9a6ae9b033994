//! Store configuration.

use crate::error::SheetError;
use crate::persist::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the character directory.
pub const ENV_DATA_DIR: &str = "SHEET_DATA_DIR";
pub const ENV_MAX_RETRIES: &str = "SHEET_MAX_RETRIES";
pub const ENV_RETRY_BASE_MS: &str = "SHEET_RETRY_BASE_MS";
pub const ENV_RETRY_MAX_MS: &str = "SHEET_RETRY_MAX_MS";
/// Optional JSON file replacing the built-in reference tables.
pub const ENV_REFERENCE_DATA: &str = "SHEET_REFERENCE_DATA";

/// Configuration for opening a character store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetConfig {
    /// Directory holding one JSON file per character.
    pub data_dir: PathBuf,

    /// Backoff for transient store failures.
    pub retry: RetryPolicy,

    /// Reference data file; `None` uses the built-in tables.
    pub reference_data: Option<PathBuf>,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("characters"),
            retry: RetryPolicy::default(),
            reference_data: None,
        }
    }
}

impl SheetConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    /// Load reference tables from a JSON file.
    pub fn with_reference_data(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_data = Some(path.into());
        self
    }

    /// Read configuration from the environment, loading `.env` if present.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, SheetError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SheetError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            config.retry.max_retries = parse_number(ENV_MAX_RETRIES, &value)? as u32;
        }
        if let Some(value) = lookup(ENV_RETRY_BASE_MS) {
            config.retry.base_delay = Duration::from_millis(parse_number(ENV_RETRY_BASE_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_RETRY_MAX_MS) {
            config.retry.max_delay = Duration::from_millis(parse_number(ENV_RETRY_MAX_MS, &value)?);
        }
        if let Some(path) = lookup(ENV_REFERENCE_DATA).filter(|p| !p.trim().is_empty()) {
            config.reference_data = Some(PathBuf::from(path));
        }

        Ok(config)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, SheetError> {
    let parsed: u64 = value
        .trim()
        .parse()
        .map_err(|_| SheetError::validation(format!("{key} must be a non-negative integer, got {value:?}")))?;
    if key == ENV_MAX_RETRIES && parsed > u32::MAX as u64 {
        return Err(SheetError::validation(format!("{key} is too large")));
    }
    Ok(parsed)
}
