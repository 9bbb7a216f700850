//! Configuration loading for the mapping engine.
//!
//! Every field has a documented default so an empty TOML file is valid.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Ledger key under which the schema version is stored.
pub const DEFAULT_SCHEMA_VERSION_KEY: &str = "MPPMVERSION";

/// Upper bound on `recent_window_minutes`: one hundred years.
pub const MAX_RECENT_WINDOW_MINUTES: u64 = 100 * 366 * 24 * 60;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BrickmapConfig {
    /// Key of the schema-version ledger entry
    pub schema_version_key: String,
    /// Default number of modification dates reported for colors
    pub color_bucket_limit: usize,
    /// Default number of modification dates reported for parts
    pub part_bucket_limit: usize,
    /// Width of the "recent changes" window, in minutes
    pub recent_window_minutes: u64,
    /// SQLite database file; `None` means the embedder supplies the store
    pub database_path: Option<PathBuf>,
}

impl Default for BrickmapConfig {
    fn default() -> Self {
        Self {
            schema_version_key: DEFAULT_SCHEMA_VERSION_KEY.to_string(),
            color_bucket_limit: 5,
            part_bucket_limit: 20,
            recent_window_minutes: 15,
            database_path: None,
        }
    }
}

impl BrickmapConfig {
    /// Read, parse and validate a TOML config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate TOML source.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: BrickmapConfig = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema_version_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "schema_version_key",
                reason: "must not be empty".to_string(),
            });
        }
        if self.color_bucket_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "color_bucket_limit",
                reason: "must be > 0".to_string(),
            });
        }
        if self.part_bucket_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "part_bucket_limit",
                reason: "must be > 0".to_string(),
            });
        }
        if self.recent_window_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "recent_window_minutes",
                reason: "must be > 0".to_string(),
            });
        }
        if self.recent_window_minutes > MAX_RECENT_WINDOW_MINUTES {
            return Err(ConfigError::InvalidValue {
                field: "recent_window_minutes",
                reason: format!("must be <= {}", MAX_RECENT_WINDOW_MINUTES),
            });
        }
        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "database_path",
                    reason: "must not be empty when set".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The "recent changes" window as a duration.
    pub fn recent_window(&self) -> Result<chrono::TimeDelta, ConfigError> {
        i64::try_from(self.recent_window_minutes)
            .ok()
            .and_then(chrono::TimeDelta::try_minutes)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "recent_window_minutes",
                reason: "out of range".to_string(),
            })
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn with_schema_version_key(mut self, key: impl Into<String>) -> Self {
        self.schema_version_key = key.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = BrickmapConfig::from_toml_str("").unwrap();
        assert_eq!(config, BrickmapConfig::default());
        assert_eq!(config.recent_window(), Ok(chrono::TimeDelta::minutes(15)));
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = BrickmapConfig::from_toml_str(
            r#"
            part_bucket_limit = 7
            database_path = "/var/lib/brickmap/mapping.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.part_bucket_limit, 7);
        assert_eq!(config.color_bucket_limit, 5);
        assert_eq!(
            config.database_path.as_deref(),
            Some(Path::new("/var/lib/brickmap/mapping.db"))
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = BrickmapConfig::from_toml_str("cache_size = 10").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let err = BrickmapConfig::from_toml_str("color_bucket_limit = 0").unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                field: "color_bucket_limit",
                reason: "must be > 0".to_string(),
            }
        );
    }

    #[test]
    fn test_recent_window_bounds() {
        let mut config = BrickmapConfig::default();
        config.recent_window_minutes = MAX_RECENT_WINDOW_MINUTES;
        assert!(config.validate().is_ok());
        assert!(config.recent_window().is_ok());

        for minutes in [MAX_RECENT_WINDOW_MINUTES + 1, 1_000_000_000_000, u64::MAX] {
            config.recent_window_minutes = minutes;
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::InvalidValue {
                        field: "recent_window_minutes",
                        ..
                    })
                ),
                "{minutes}"
            );
        }
        config.recent_window_minutes = u64::MAX;
        assert!(config.recent_window().is_err());

        let err = BrickmapConfig::from_toml_str("recent_window_minutes = 200000000000000").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_blank_version_key_rejected() {
        let config = BrickmapConfig::default().with_schema_version_key("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "recent_window_minutes = 30").unwrap();
        let config = BrickmapConfig::from_path(file.path()).unwrap();
        assert_eq!(config.recent_window(), Ok(chrono::TimeDelta::minutes(30)));
    }

    #[test]
    fn test_from_missing_path() {
        let err = BrickmapConfig::from_path(Path::new("/nonexistent/brickmap.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
