//! `SQLite` mirror remote.
//!
//! Applies operations to a local mirror database with the same contract a
//! hosted store offers: idempotent replay keyed by operation ID and conflict
//! rejection when the base state is stale.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;

use super::{RemoteError, RemoteStore};
use crate::error::SyncError;
use crate::sync::{EntityRef, OperationKind, PendingOperation};

/// Idempotent DDL for the mirror tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS records (
    resource TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    payload TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (resource, entity_key)
);

CREATE TABLE IF NOT EXISTS applied_operations (
    operation_id INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
";

/// A row as the mirror currently sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteRecord {
    /// Entity
    pub entity: EntityRef,
    /// Current JSON body
    pub payload: String,
    /// Tombstoned by a delete
    pub deleted: bool,
}

/// Mirror database implementing [`RemoteStore`].
pub struct SqliteRemote {
    conn: Mutex<Connection>,
}

impl SqliteRemote {
    /// Open or create a mirror database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| {
            SyncError::Database(format!("Failed to open remote {}: {e}", path.display()))
        })?;
        Self::init(conn)
    }

    /// In-memory mirror for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SyncError::database("Failed to open in-memory remote", &e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, SyncError> {
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| SyncError::database("Failed to create remote tables", &e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, SyncError> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Database("remote lock poisoned".to_string()))
    }

    /// Look up an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn record(&self, entity: &EntityRef) -> Result<Option<RemoteRecord>, SyncError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT payload, deleted FROM records WHERE resource = ?1 AND entity_key = ?2",
            params![entity.resource, entity.key],
            |row| {
                Ok(RemoteRecord {
                    entity: entity.clone(),
                    payload: row.get(0)?,
                    deleted: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(|e| SyncError::database("Failed to read remote record", &e))
    }

    /// Number of distinct operations applied so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn applied_count(&self) -> Result<u64, SyncError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM applied_operations", [], |row| row.get(0))
            .map_err(|e| SyncError::database("Failed to count applied operations", &e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn apply(&self, operation: &PendingOperation) -> Result<(), RemoteError> {
        let mut conn = self
            .conn()
            .map_err(|e| RemoteError::Transient(e.to_string()))?;
        let tx = conn.transaction().map_err(transient)?;

        let already_applied: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM applied_operations WHERE operation_id = ?1)",
                [operation.id],
                |row| row.get(0),
            )
            .map_err(transient)?;
        if already_applied {
            tracing::debug!(id = operation.id, "replayed operation ignored by mirror");
            return Ok(());
        }

        apply_mutation(&tx, operation)?;

        tx.execute(
            "INSERT INTO applied_operations (operation_id, applied_at) VALUES (?1, ?2)",
            params![operation.id, Utc::now().to_rfc3339()],
        )
        .map_err(transient)?;
        tx.commit().map_err(transient)
    }
}

#[async_trait]
impl RemoteStore for SqliteRemote {
    async fn submit(&self, operation: &PendingOperation) -> Result<(), RemoteError> {
        self.apply(operation)
    }

    async fn is_reachable(&self) -> bool {
        self.conn()
            .map(|conn| conn.query_row("SELECT 1", [], |_| Ok(())).is_ok())
            .unwrap_or(false)
    }
}

#[allow(clippy::needless_pass_by_value)]
fn transient(err: rusqlite::Error) -> RemoteError {
    RemoteError::Transient(err.to_string())
}

fn apply_mutation(tx: &Transaction<'_>, operation: &PendingOperation) -> Result<(), RemoteError> {
    let entity = &operation.entity;
    let now = Utc::now().to_rfc3339();

    let current: Option<(String, bool)> = tx
        .query_row(
            "SELECT payload, deleted FROM records WHERE resource = ?1 AND entity_key = ?2",
            params![entity.resource, entity.key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(transient)?;

    match (operation.kind, current) {
        (OperationKind::Create, Some((_, false))) => {
            Err(RemoteError::Conflict(format!("{entity} already exists")))
        }
        (OperationKind::Create, _) => {
            tx.execute(
                r"INSERT INTO records (resource, entity_key, payload, deleted, updated_at)
                  VALUES (?1, ?2, ?3, 0, ?4)
                  ON CONFLICT(resource, entity_key) DO UPDATE SET
                    payload = excluded.payload, deleted = 0, updated_at = excluded.updated_at",
                params![entity.resource, entity.key, operation.payload, now],
            )
            .map_err(transient)?;
            Ok(())
        }
        (OperationKind::Update | OperationKind::Delete, None | Some((_, true))) => Err(
            RemoteError::Conflict(format!("{entity} does not exist or was deleted")),
        ),
        (OperationKind::Update, Some((existing, false))) => {
            let merged = merge_payload(&existing, &operation.payload);
            tx.execute(
                "UPDATE records SET payload = ?1, updated_at = ?2 WHERE resource = ?3 AND entity_key = ?4",
                params![merged, now, entity.resource, entity.key],
            )
            .map_err(transient)?;
            Ok(())
        }
        (OperationKind::Delete, Some((_, false))) => {
            tx.execute(
                "UPDATE records SET deleted = 1, updated_at = ?1 WHERE resource = ?2 AND entity_key = ?3",
                params![now, entity.resource, entity.key],
            )
            .map_err(transient)?;
            Ok(())
        }
    }
}

/// Shallow-merge a JSON object patch into the stored body; anything that is
/// not a pair of objects replaces the body outright.
fn merge_payload(existing: &str, patch: &str) -> String {
    let parsed = (
        serde_json::from_str::<serde_json::Value>(existing),
        serde_json::from_str::<serde_json::Value>(patch),
    );
    match parsed {
        (Ok(serde_json::Value::Object(mut base)), Ok(serde_json::Value::Object(changes))) => {
            base.extend(changes);
            serde_json::Value::Object(base).to_string()
        }
        _ => patch.to_string(),
    }
}
