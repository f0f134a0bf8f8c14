//! Process configuration.
//!
//! # Responsibility
//! - Deserialize the JSON configuration file into typed settings.
//! - Supply defaults for every field so an empty object is valid.
//!
//! # Invariants
//! - Configuration is loaded once and passed by value; nothing reads it
//!   from global state.
//! - `1 <= default_page_size <= max_page_size`.

use crate::logging::default_log_level;
use crate::model::registration::WITHDRAWAL_REDACTED_FIELDS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const DEFAULT_DATABASE_PATH: &str = "regview.sqlite3";
const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

/// Tunables of the registration visibility rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Filtering on any of these fields hides withdrawn registrations.
    pub withdrawal_filter_fields: BTreeSet<String>,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            withdrawal_filter_fields: WITHDRAWAL_REDACTED_FIELDS
                .iter()
                .map(|field| (*field).to_string())
                .collect(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl PolicyConfig {
    /// Resolves a requested page size against the configured bounds.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}

/// Top-level settings for the CLI and embedding hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    /// Falls back to `default_log_level()` when unset.
    pub log_level: Option<String>,
    /// File logging stays off when unset.
    pub log_dir: Option<PathBuf>,
    pub policy: PolicyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            log_level: None,
            log_dir: None,
            policy: PolicyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(default_log_level())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let policy = &self.policy;
        if policy.default_page_size == 0 {
            return Err(ConfigError::Invalid(
                "policy.default_page_size must be at least 1".to_string(),
            ));
        }
        if policy.max_page_size < policy.default_page_size {
            return Err(ConfigError::Invalid(format!(
                "policy.max_page_size ({}) must not be below policy.default_page_size ({})",
                policy.max_page_size, policy.default_page_size
            )));
        }
        if let Some(log_dir) = self.log_dir.as_ref() {
            if !log_dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "log_dir must be an absolute path, got `{}`",
                    log_dir.display()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, ConfigError, PolicyConfig};
    use std::io::Write;

    #[test]
    fn empty_object_yields_defaults() {
        let config = AppConfig::from_json_str("{}").expect("defaults parse");
        assert_eq!(config, AppConfig::default());
        assert!(config
            .policy
            .withdrawal_filter_fields
            .contains("category"));
        assert!(!config.policy.withdrawal_filter_fields.contains("title"));
    }

    #[test]
    fn log_level_falls_back_to_default() {
        let config = AppConfig::default();
        assert_eq!(config.log_level(), crate::logging::default_log_level());

        let config = AppConfig::from_json_str(r#"{"log_level": "debug"}"#).expect("level parses");
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn page_size_is_clamped() {
        let policy = PolicyConfig::default();
        assert_eq!(policy.page_size(None), 10);
        assert_eq!(policy.page_size(Some(0)), 1);
        assert_eq!(policy.page_size(Some(1_000)), 100);
    }

    #[test]
    fn rejects_inverted_page_bounds() {
        let err = AppConfig::from_json_str(
            r#"{"policy": {"default_page_size": 50, "max_page_size": 20}}"#,
        )
        .expect_err("inverted bounds must fail");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_relative_log_dir() {
        let err = AppConfig::from_json_str(r#"{"log_dir": "logs"}"#)
            .expect_err("relative log dir must fail");
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn load_reads_file_and_overrides_fields() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"database_path": "/tmp/reg.sqlite3", "policy": {{"withdrawal_filter_fields": ["tags"]}}}}"#
        )
        .expect("write config");

        let config = AppConfig::load(file.path()).expect("config loads");
        assert_eq!(config.database_path.to_str(), Some("/tmp/reg.sqlite3"));
        assert_eq!(
            config.policy.withdrawal_filter_fields.into_iter().collect::<Vec<_>>(),
            vec!["tags".to_string()]
        );
        assert_eq!(config.policy.default_page_size, 10);
    }
}
