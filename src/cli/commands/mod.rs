//! Command implementations for clinic-sync.
//!
//! Every command returns its rendered output as a `String`; `main` prints it.

mod completions;
mod queue;
mod sync;

pub use completions::completions;
pub use queue::{discard, enqueue, list, retry, status};
pub use sync::{run_once, watch};

use std::path::Path;
use std::sync::Arc;

use crate::cli::args::OutputFormat;
use crate::config::{Config, Paths};
use crate::error::SyncError;
use crate::remote::{RemoteStore, SqliteRemote};
use crate::sync::{ConnectivitySignal, OperationLog, SyncEngine};

/// Resolved paths, configuration and output format for one invocation.
#[derive(Debug, Clone)]
pub struct Context {
    pub paths: Paths,
    pub config: Config,
    pub format: OutputFormat,
}

impl Context {
    /// Resolve the data directory and load the config file.
    ///
    /// An explicit `--output` wins over `general.default_output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be created or the
    /// config file cannot be parsed.
    pub fn load(config_file: Option<&Path>, output: Option<OutputFormat>) -> Result<Self, SyncError> {
        let paths = Paths::new()?;
        paths.ensure_dirs()?;
        let config = Config::load_from_path(config_file.unwrap_or(&paths.config_file))?;
        let format = output.unwrap_or(config.general.default_output);

        Ok(Self {
            paths,
            config,
            format,
        })
    }

    /// Open the local operation log.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open_log(&self) -> Result<OperationLog, SyncError> {
        OperationLog::open(&self.paths.database)
    }

    /// Open the configured remote store.
    ///
    /// # Errors
    ///
    /// Returns an error if the mirror database cannot be opened.
    pub fn open_remote(&self) -> Result<Arc<SqliteRemote>, SyncError> {
        let path = self.config.remote.database_path(&self.paths);
        Ok(Arc::new(SqliteRemote::open(&path)?))
    }

    /// Build an engine over the local log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be opened or the sync settings
    /// are invalid.
    pub fn engine(&self, remote: Arc<dyn RemoteStore>, online: bool) -> Result<SyncEngine, SyncError> {
        SyncEngine::new(
            self.open_log()?,
            remote,
            ConnectivitySignal::new(online),
            self.config.sync.engine_config()?,
        )
    }
}
