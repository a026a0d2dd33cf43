//! Database migrations for the local operation log.
//!
//! Each migration upgrades the schema by one version and is tracked with
//! `PRAGMA user_version`. Migrations run automatically when the database is
//! opened.

use rusqlite::Connection;

use crate::error::SyncError;

/// Current schema version.
const CURRENT_VERSION: i32 = 1;

/// Get the current schema version from the database.
///
/// Returns 0 for a new database.
pub fn get_version(conn: &Connection) -> Result<i32, SyncError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| SyncError::database("Failed to get schema version", &e))
}

fn set_version(conn: &Connection, version: i32) -> Result<(), SyncError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| SyncError::database("Failed to set schema version", &e))
}

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<(), SyncError> {
    let current = get_version(conn)?;

    if current >= CURRENT_VERSION {
        return Ok(());
    }

    for version in (current + 1)..=CURRENT_VERSION {
        run_migration(conn, version)?;
        set_version(conn, version)?;
        tracing::info!(version, "applied operation log migration");
    }

    Ok(())
}

fn run_migration(conn: &Connection, version: i32) -> Result<(), SyncError> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(SyncError::Database(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: operation log and sync metadata.
fn migrate_v1(conn: &Connection) -> Result<(), SyncError> {
    conn.execute_batch(
        r"
        -- Pending and dead-lettered mutations; id is the ordering key
        CREATE TABLE IF NOT EXISTS operation_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            resource TEXT NOT NULL,
            entity_key TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_attempt TEXT,
            last_error TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            dead_reason TEXT,
            dead_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_operation_log_status
        ON operation_log(status, id);

        CREATE INDEX IF NOT EXISTS idx_operation_log_entity
        ON operation_log(resource, entity_key);

        -- Key/value sync metadata (last_sync, ...)
        CREATE TABLE IF NOT EXISTS sync_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )
    .map_err(|e| SyncError::database("Migration v1 failed", &e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_v1() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);

        conn.execute(
            "INSERT INTO operation_log (kind, resource, entity_key, payload, created_at)
             VALUES ('create', 'patients', 'P1', '{}', '2024-01-01T10:00:00Z')",
            [],
        )
        .unwrap();

        let status: String = conn
            .query_row("SELECT status FROM operation_log", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "pending");
    }

    #[test]
    fn test_migration_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_get_version_new_database() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_version(&conn).unwrap(), 0);
    }
}
