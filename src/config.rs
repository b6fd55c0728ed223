//! Application configuration
//!
//! `Config` is loaded once at startup and passed explicitly to whatever needs
//! it. There is no global instance, so tests build their own fixtures.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::DEFAULT_TTL_MS;

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The config file is not valid TOML for `Config`
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub debounce: DebounceConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Cache location and TTLs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory; the XDG cache dir when unset
    pub dir: Option<PathBuf>,
    /// TTL for entries stored without an explicit one
    pub default_ttl_ms: u64,
    /// TTL for cached topic lists
    pub topics_ttl_ms: u64,
    /// TTL for cached lesson lists
    pub lessons_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            default_ttl_ms: DEFAULT_TTL_MS,
            topics_ttl_ms: DEFAULT_TTL_MS,
            lessons_ttl_ms: DEFAULT_TTL_MS,
        }
    }
}

/// Backoff settings for backend requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
        }
    }
}

/// Minimum spacing between user-triggered refreshes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    pub refresh_interval_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1_000,
        }
    }
}

/// Remote backend connection settings
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    /// Default location of the config file
    ///
    /// `~/.config/lingocache/config.toml` on Linux. Returns `None` without a
    /// home directory.
    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "lingocache")?;
        Some(project_dirs.config_dir().join("config.toml"))
    }

    /// Loads configuration from `path`, or defaults if the file does not exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_toml_str(&contents)
    }

    /// Parses and validates configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ttls = [
            ("cache.default_ttl_ms", self.cache.default_ttl_ms),
            ("cache.topics_ttl_ms", self.cache.topics_ttl_ms),
            ("cache.lessons_ttl_ms", self.cache.lessons_ttl_ms),
        ];
        for (field, ttl) in ttls {
            if ttl == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "TTL must be greater than zero".to_string(),
                });
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "at least one attempt is required".to_string(),
            });
        }

        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(ConfigError::Invalid {
                field: "retry.max_delay_ms",
                reason: format!(
                    "{} is smaller than retry.initial_delay_ms ({})",
                    self.retry.max_delay_ms, self.retry.initial_delay_ms
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.default_ttl_ms, 1_800_000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay_ms, 1_000);
        assert_eq!(config.retry.max_delay_ms, 10_000);
        assert_eq!(config.debounce.refresh_interval_ms, 1_000);
        assert!(config.cache.dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [cache]
            dir = "/var/cache/tutor"
            topics_ttl_ms = 60000

            [backend]
            url = "https://example.invalid"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.dir, Some(PathBuf::from("/var/cache/tutor")));
        assert_eq!(config.cache.topics_ttl_ms, 60_000);
        assert_eq!(config.cache.lessons_ttl_ms, DEFAULT_TTL_MS);
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.backend.url.as_deref(), Some("https://example.invalid"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[retry]\nmax_attempts = 5\n").unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let result = Config::from_toml_str("[cache\ndir = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let err = Config::from_toml_str("[cache]\nlessons_ttl_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("cache.lessons_ttl_ms"));
    }

    #[test]
    fn test_max_delay_below_initial_delay_is_rejected() {
        let err = Config::from_toml_str("[retry]\ninitial_delay_ms = 500\nmax_delay_ms = 100\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "retry.max_delay_ms",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        let err = Config::from_toml_str("[retry]\nmax_attempts = 0\n").unwrap_err();
        assert!(err.to_string().contains("retry.max_attempts"));
    }

    #[test]
    fn test_api_key_is_redacted_in_debug_output() {
        let backend = BackendConfig {
            url: Some("https://example.invalid".to_string()),
            api_key: Some("sk-secret".to_string()),
        };

        let debug = format!("{:?}", backend);

        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
