//! Runtime configuration for the planner core.
//!
//! Values come from `PlannerConfig::default()` and may be overridden by
//! `FLUX_*` environment variables through [`PlannerConfig::from_env`].

use crate::logging::default_log_level;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "FLUX_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "FLUX_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "FLUX_LOG_DIR";
pub const ENV_REORDER_DEBOUNCE_MS: &str = "FLUX_REORDER_DEBOUNCE_MS";
pub const ENV_BATCH_MODE: &str = "FLUX_BATCH_MODE";

/// Quiet period before a day's reorder is written.
pub const DEFAULT_REORDER_DEBOUNCE: Duration = Duration::from_millis(300);

const DEFAULT_DB_FILE_NAME: &str = "flux.sqlite3";

/// How a reorder batch is written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// One transaction; a failure applies nothing and restores local order.
    #[default]
    Transactional,
    /// Each pair on its own; failures are reported and nothing is rolled back.
    Independent,
}

impl BatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transactional => "transactional",
            Self::Independent => "independent",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "transactional" => Ok(Self::Transactional),
            "independent" => Ok(Self::Independent),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_BATCH_MODE,
                value: value.to_string(),
            }),
        }
    }
}

/// Planner core settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    pub db_path: PathBuf,
    pub log_level: String,
    /// File logging is off when unset.
    pub log_dir: Option<PathBuf>,
    pub reorder_debounce: Duration,
    pub batch_mode: BatchMode,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            db_path: std::env::temp_dir().join(DEFAULT_DB_FILE_NAME),
            log_level: default_log_level().to_string(),
            log_dir: None,
            reorder_debounce: DEFAULT_REORDER_DEBOUNCE,
            batch_mode: BatchMode::default(),
        }
    }
}

impl PlannerConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`, which maps a variable name to its
    /// value. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = read(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path.trim());
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.log_level = level.trim().to_string();
        }
        if let Some(dir) = read(ENV_LOG_DIR) {
            config.log_dir = Some(PathBuf::from(dir.trim()));
        }
        if let Some(raw) = read(ENV_REORDER_DEBOUNCE_MS) {
            let millis = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: ENV_REORDER_DEBOUNCE_MS,
                    value: raw.clone(),
                })?;
            config.reorder_debounce = Duration::from_millis(millis);
        }
        if let Some(raw) = read(ENV_BATCH_MODE) {
            config.batch_mode = BatchMode::parse(&raw)?;
        }

        Ok(config)
    }
}

/// Configuration parse failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value } => write!(f, "invalid value for {key}: `{value}`"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{BatchMode, ConfigError, PlannerConfig, ENV_BATCH_MODE, ENV_REORDER_DEBOUNCE_MS};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_transactional_batches_and_300ms_debounce() {
        let config = PlannerConfig::default();
        assert_eq!(config.batch_mode, BatchMode::Transactional);
        assert_eq!(config.reorder_debounce, Duration::from_millis(300));
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = PlannerConfig::from_lookup(lookup(&[
            ("FLUX_DB_PATH", "/tmp/flux-test.sqlite3"),
            ("FLUX_LOG_DIR", "/tmp/flux-logs"),
            ("FLUX_REORDER_DEBOUNCE_MS", "50"),
            ("FLUX_BATCH_MODE", "Independent"),
            ("FLUX_LOG_LEVEL", ""),
        ]))
        .expect("valid env");

        assert_eq!(config.db_path, PathBuf::from("/tmp/flux-test.sqlite3"));
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/flux-logs")));
        assert_eq!(config.reorder_debounce, Duration::from_millis(50));
        assert_eq!(config.batch_mode, BatchMode::Independent);
        assert_eq!(config.log_level, PlannerConfig::default().log_level);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = PlannerConfig::from_lookup(lookup(&[(ENV_REORDER_DEBOUNCE_MS, "soon")]))
            .expect_err("non-numeric debounce");
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: ENV_REORDER_DEBOUNCE_MS,
                value: "soon".to_string()
            }
        );

        let err = PlannerConfig::from_lookup(lookup(&[(ENV_BATCH_MODE, "eventual")]))
            .expect_err("unknown batch mode");
        assert!(err.to_string().contains(ENV_BATCH_MODE));
    }
}
