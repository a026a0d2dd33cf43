//! Configuration settings for clinic-sync.
//!
//! Settings are loaded from `~/.clinic-sync/config.yaml`. Every field has a
//! default, so a partial file (or no file at all) is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::args::OutputFormat;
use crate::config::Paths;
use crate::error::SyncError;
use crate::sync::EngineConfig;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Sync engine tuning.
    pub sync: SyncConfig,
    /// Remote store settings.
    pub remote: RemoteConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default output format.
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
}

/// Sync engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Failed attempts before an operation is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Operations read from the log per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Seconds between automatic drain cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Upper bound on a single remote submission, in seconds.
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,
}

/// Remote store settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RemoteConfig {
    /// Path of the SQLite mirror database. Defaults to `remote.db` in the
    /// data directory.
    pub database: Option<PathBuf>,
}

const fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_batch_size() -> usize {
    50
}

const fn default_poll_interval() -> u64 {
    30
}

const fn default_submit_timeout() -> u64 {
    10
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: default_output_format(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval(),
            submit_timeout_secs: default_submit_timeout(),
        }
    }
}

impl SyncConfig {
    /// Convert into the engine's runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is zero where the engine needs a positive one.
    pub fn engine_config(&self) -> Result<EngineConfig, SyncError> {
        if self.max_attempts == 0 {
            return Err(SyncError::Config("sync.max_attempts must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(SyncError::Config("sync.batch_size must be at least 1".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(SyncError::Config(
                "sync.poll_interval_secs must be at least 1".to_string(),
            ));
        }

        Ok(EngineConfig {
            max_attempts: self.max_attempts,
            batch_size: self.batch_size,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            submit_timeout: Duration::from_secs(self.submit_timeout_secs.max(1)),
        })
    }
}

impl RemoteConfig {
    /// Resolve the mirror database path, falling back to the data directory.
    #[must_use]
    pub fn database_path(&self, paths: &Paths) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| paths.remote_database.clone())
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self, SyncError> {
        let paths = Paths::new()?;
        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &Path) -> Result<Self, SyncError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            SyncError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &Path) -> Result<(), SyncError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| SyncError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            SyncError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.general.default_output, OutputFormat::Pretty);
        assert_eq!(config.sync.max_attempts, 5);
        assert_eq!(config.sync.batch_size, 50);
        assert_eq!(config.sync.poll_interval_secs, 30);
        assert_eq!(config.sync.submit_timeout_secs, 10);
        assert!(config.remote.database.is_none());
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let config = Config::load_from_path(&config_path).unwrap();
        assert_eq!(config.sync.max_attempts, 5);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = Config::default();
        config.sync.max_attempts = 8;
        config.remote.database = Some(PathBuf::from("/srv/clinic/mirror.db"));

        config.save_to_path(&config_path).unwrap();
        let loaded = Config::load_from_path(&config_path).unwrap();

        assert_eq!(loaded.sync.max_attempts, 8);
        assert_eq!(
            loaded.remote.database,
            Some(PathBuf::from("/srv/clinic/mirror.db"))
        );
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let partial_yaml = r"
sync:
  batch_size: 10
";
        std::fs::write(&config_path, partial_yaml).unwrap();

        let config = Config::load_from_path(&config_path).unwrap();

        assert_eq!(config.sync.batch_size, 10);
        assert_eq!(config.sync.max_attempts, 5);
        assert_eq!(config.general.default_output, OutputFormat::Pretty);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "sync: [not, a, map]").unwrap();

        assert!(matches!(
            Config::load_from_path(&config_path),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn test_engine_config_conversion() {
        let engine = SyncConfig::default().engine_config().unwrap();
        assert_eq!(engine.max_attempts, 5);
        assert_eq!(engine.poll_interval, Duration::from_secs(30));
        assert_eq!(engine.submit_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_engine_config_rejects_zero_attempts() {
        let sync = SyncConfig {
            max_attempts: 0,
            ..SyncConfig::default()
        };
        assert!(sync.engine_config().is_err());
    }

    #[test]
    fn test_remote_database_default() {
        let paths = Paths::with_root(PathBuf::from("/data"));
        let remote = RemoteConfig::default();
        assert_eq!(remote.database_path(&paths), PathBuf::from("/data/remote.db"));
    }
}
