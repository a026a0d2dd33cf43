//! Error types for clinic-sync.

use thiserror::Error;

/// Errors surfaced by the library and the command-line front end.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local database could not be read or written.
    ///
    /// An `append` that fails with this error was NOT queued.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration could not be loaded, saved or resolved.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A referenced operation or record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller supplied an argument the operation cannot accept.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl SyncError {
    /// Wrap a `rusqlite` failure with some context about what was attempted.
    pub(crate) fn database(context: &str, err: &rusqlite::Error) -> Self {
        Self::Database(format!("{context}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_message() {
        let err = SyncError::database("Failed to append", &rusqlite::Error::InvalidQuery);
        assert!(err.to_string().starts_with("Database error: Failed to append"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: SyncError = json_err.into();
        assert!(matches!(err, SyncError::Parse(_)));
    }
}
