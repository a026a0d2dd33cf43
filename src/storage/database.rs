//! `SQLite` database connection for the local operation log.
//!
//! The database (`queue.db` in the data directory) holds:
//! - the operation log (pending and dead-lettered mutations)
//! - sync metadata (last successful sync)

use std::path::Path;

use rusqlite::Connection;

use crate::error::SyncError;

use super::migrations;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at a specific path.
    ///
    /// Creates the database file and runs migrations if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_at(path: &Path) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            SyncError::Database(format!("Failed to open database {}: {e}", path.display()))
        })?;

        // Every append must be on disk before we report it queued.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(|e| SyncError::database("Failed to configure journal", &e))?;
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(|e| SyncError::database("Failed to configure journal", &e))?;

        let db = Self { conn };
        db.migrate()?;

        tracing::debug!(path = %path.display(), "opened operation log database");
        Ok(db)
    }

    /// Open an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SyncError::database("Failed to open in-memory database", &e))?;

        let db = Self { conn };
        db.migrate()?;

        Ok(db)
    }

    fn migrate(&self) -> Result<(), SyncError> {
        migrations::run(&self.conn)
    }

    /// Get the current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be read.
    pub fn schema_version(&self) -> Result<i32, SyncError> {
        migrations::get_version(&self.conn)
    }

    /// Get a reference to the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.schema_version().unwrap() > 0);
    }

    #[test]
    fn test_open_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("queue.db");

        let db = Database::open_at(&db_path).unwrap();
        assert!(db.schema_version().unwrap() > 0);
        assert!(db_path.exists());
    }

    #[test]
    fn test_reopen_database() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("queue.db");

        {
            let db = Database::open_at(&db_path).unwrap();
            db.connection()
                .execute(
                    "INSERT INTO sync_meta (key, value) VALUES ('probe', 'kept')",
                    [],
                )
                .unwrap();
        }

        // Reopen - migrations must not wipe existing rows
        {
            let db = Database::open_at(&db_path).unwrap();
            let value: String = db
                .connection()
                .query_row("SELECT value FROM sync_meta WHERE key = 'probe'", [], |r| {
                    r.get(0)
                })
                .unwrap();
            assert_eq!(value, "kept");
        }
    }
}
