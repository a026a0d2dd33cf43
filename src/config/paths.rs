//! Path resolution for clinic-sync configuration and data files.
//!
//! All data is stored in `~/.clinic-sync/` unless `CLINIC_SYNC_HOME` points
//! somewhere else:
//! - `config.yaml` - Main configuration file
//! - `queue.db` - SQLite operation log
//! - `remote.db` - Default location of the SQLite mirror remote

use std::path::PathBuf;

use crate::error::SyncError;

/// Environment variable overriding the data directory.
pub const HOME_ENV: &str = "CLINIC_SYNC_HOME";

/// Paths to clinic-sync configuration and data files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.clinic-sync/`
    pub root: PathBuf,
    /// Config file: `~/.clinic-sync/config.yaml`
    pub config_file: PathBuf,
    /// Operation log database: `~/.clinic-sync/queue.db`
    pub database: PathBuf,
    /// Default mirror remote database: `~/.clinic-sync/remote.db`
    pub remote_database: PathBuf,
}

impl Paths {
    /// Resolve paths from `CLINIC_SYNC_HOME` or the user's home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if neither variable is set.
    pub fn new() -> Result<Self, SyncError> {
        if let Ok(root) = std::env::var(HOME_ENV) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }

        let home = std::env::var("HOME")
            .map_err(|_| SyncError::Config("Could not determine home directory".to_string()))?;

        Ok(Self::with_root(PathBuf::from(home).join(".clinic-sync")))
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("queue.db"),
            remote_database: root.join("remote.db"),
            root,
        }
    }

    /// Ensure the root directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), SyncError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| {
                SyncError::Config(format!(
                    "Failed to create directory {}: {e}",
                    self.root.display()
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_with_root() {
        let root = PathBuf::from("/tmp/test-clinic-sync");
        let paths = Paths::with_root(root.clone());

        assert_eq!(paths.root, root);
        assert_eq!(paths.config_file, root.join("config.yaml"));
        assert_eq!(paths.database, root.join("queue.db"));
        assert_eq!(paths.remote_database, root.join("remote.db"));
    }

    #[test]
    fn test_ensure_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().join("data"));

        paths.ensure_dirs().unwrap();
        assert!(paths.root.exists());
    }
}
