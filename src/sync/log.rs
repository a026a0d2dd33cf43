//! Durable operation log.
//!
//! Append-only for application code; confirmed entries are deleted, failed
//! ones keep their position until they cross the attempt ceiling and become
//! dead letters.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::operation::{
    CorruptEntry, DeadLetter, DeadLetterReason, EntityRef, NewOperation, OperationKind,
    PendingOperation,
};
use crate::error::SyncError;
use crate::storage::Database;

/// A row read from the active log: decoded, or flagged as corrupt.
pub type BatchEntry = Result<PendingOperation, CorruptEntry>;

const LAST_SYNC_KEY: &str = "last_sync";

const SELECT_COLUMNS: &str = "id, kind, resource, entity_key, payload, created_at, attempts, \
                              last_attempt, last_error";

/// What `mark_failed` did with the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still pending, will be retried on a later pass.
    Retrying {
        /// Attempts so far
        attempts: u32,
    },
    /// Crossed the ceiling and was dead-lettered.
    DeadLettered {
        /// Attempts so far
        attempts: u32,
    },
    /// No active operation with that ID.
    Missing,
}

/// Aggregate counts over the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogStats {
    /// Active (retryable) operations
    pub pending: u64,
    /// Dead-lettered operations
    pub dead: u64,
    /// Creation time of the oldest active operation
    pub oldest_pending: Option<DateTime<Utc>>,
}

/// SQLite-backed operation log.
pub struct OperationLog {
    db: Mutex<Database>,
}

impl OperationLog {
    /// Open (or create) the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        Ok(Self::with_database(Database::open_at(path)?))
    }

    /// In-memory log for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self, SyncError> {
        Ok(Self::with_database(Database::open_in_memory()?))
    }

    /// Wrap an existing database connection.
    #[must_use]
    pub const fn with_database(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>, SyncError> {
        self.db
            .lock()
            .map_err(|_| SyncError::Database("operation log lock poisoned".to_string()))
    }

    /// Append an operation.
    ///
    /// The row is committed before this returns; on error the operation
    /// was not queued.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Database`] if the row cannot be written.
    pub fn append(&self, operation: &NewOperation) -> Result<PendingOperation, SyncError> {
        let db = self.db()?;
        let conn = db.connection();
        let created_at = Utc::now();

        conn.execute(
            r"INSERT INTO operation_log (kind, resource, entity_key, payload, created_at, attempts, status)
              VALUES (?1, ?2, ?3, ?4, ?5, 0, 'pending')",
            params![
                operation.kind.as_str(),
                operation.entity.resource,
                operation.entity.key,
                operation.payload,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| SyncError::database("Failed to append operation", &e))?;

        let id = conn.last_insert_rowid();
        tracing::debug!(id, kind = %operation.kind, entity = %operation.entity, "appended operation");

        Ok(PendingOperation {
            id,
            kind: operation.kind,
            entity: operation.entity.clone(),
            payload: operation.payload.clone(),
            created_at,
            attempts: 0,
            last_attempt: None,
            last_error: None,
        })
    }

    /// Up to `limit` oldest active operations, in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn peek_batch(&self, limit: usize) -> Result<Vec<BatchEntry>, SyncError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM operation_log
             WHERE status = 'pending' AND id > ?1
             ORDER BY id ASC
             LIMIT ?2"
        );
        self.query_batch(&sql, 0, limit)
    }

    /// Like [`peek_batch`](Self::peek_batch), but leaves out operations
    /// queued behind a dead letter for the same entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn peek_ready_batch(&self, limit: usize) -> Result<Vec<BatchEntry>, SyncError> {
        self.peek_ready_after(0, limit)
    }

    /// Ready operations with an ID greater than `after`, oldest first.
    ///
    /// Passing the last ID of the previous page walks the whole log one
    /// window at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn peek_ready_after(&self, after: i64, limit: usize) -> Result<Vec<BatchEntry>, SyncError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM operation_log o
             WHERE o.status = 'pending'
               AND o.id > ?1
               AND NOT EXISTS (
                   SELECT 1 FROM operation_log d
                   WHERE d.status = 'dead'
                     AND d.resource = o.resource
                     AND d.entity_key = o.entity_key
                     AND d.id < o.id)
             ORDER BY o.id ASC
             LIMIT ?2"
        );
        self.query_batch(&sql, after, limit)
    }

    fn query_batch(&self, sql: &str, after: i64, limit: usize) -> Result<Vec<BatchEntry>, SyncError> {
        let db = self.db()?;
        let mut stmt = db
            .connection()
            .prepare(sql)
            .map_err(|e| SyncError::database("Failed to prepare batch query", &e))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![after, limit], RawRow::from_row)
            .map_err(|e| SyncError::database("Failed to read operation batch", &e))?;

        let mut batch = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| SyncError::database("Failed to read operation row", &e))?;
            batch.push(raw.decode());
        }
        Ok(batch)
    }

    /// Get an active operation by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub fn get(&self, id: i64) -> Result<Option<PendingOperation>, SyncError> {
        let db = self.db()?;
        let sql =
            format!("SELECT {SELECT_COLUMNS} FROM operation_log WHERE id = ?1 AND status = 'pending'");
        let raw = db
            .connection()
            .query_row(&sql, [id], RawRow::from_row)
            .optional()
            .map_err(|e| SyncError::database("Failed to query operation", &e))?;

        raw.map(|r| {
            r.decode()
                .map_err(|c| SyncError::Database(format!("Operation {} is corrupt: {}", c.id, c.reason)))
        })
        .transpose()
    }

    /// Remove a remotely acknowledged operation.
    ///
    /// Idempotent: confirming an unknown ID returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn confirm(&self, id: i64) -> Result<bool, SyncError> {
        let db = self.db()?;
        let rows = db
            .connection()
            .execute(
                "DELETE FROM operation_log WHERE id = ?1 AND status = 'pending'",
                [id],
            )
            .map_err(|e| SyncError::database("Failed to confirm operation", &e))?;
        Ok(rows > 0)
    }

    /// Record a failed attempt.
    ///
    /// The operation keeps its position; once `attempts` reaches `ceiling`
    /// it is dead-lettered with [`DeadLetterReason::ExhaustedRetries`].
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_failed(
        &self,
        id: i64,
        error: &str,
        ceiling: u32,
    ) -> Result<FailureOutcome, SyncError> {
        let db = self.db()?;
        let now = Utc::now().to_rfc3339();

        let updated: Option<(i64, String)> = db
            .connection()
            .query_row(
                r"UPDATE operation_log SET
                    attempts = attempts + 1,
                    last_attempt = ?1,
                    last_error = ?2,
                    status = CASE WHEN attempts + 1 >= ?3 THEN 'dead' ELSE 'pending' END,
                    dead_reason = CASE WHEN attempts + 1 >= ?3 THEN 'exhausted_retries' ELSE NULL END,
                    dead_at = CASE WHEN attempts + 1 >= ?3 THEN ?1 ELSE NULL END
                  WHERE id = ?4 AND status = 'pending'
                  RETURNING attempts, status",
                params![now, error, ceiling, id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| SyncError::database("Failed to record failed attempt", &e))?;

        Ok(match updated {
            None => FailureOutcome::Missing,
            Some((attempts, status)) => {
                let attempts = u32::try_from(attempts).unwrap_or(u32::MAX);
                if status == "dead" {
                    tracing::warn!(id, attempts, error, "operation exhausted retries");
                    FailureOutcome::DeadLettered { attempts }
                } else {
                    FailureOutcome::Retrying { attempts }
                }
            }
        })
    }

    /// Move an active operation straight to dead-letter state.
    ///
    /// Returns `false` if there was no active operation with that ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn dead_letter(
        &self,
        id: i64,
        reason: DeadLetterReason,
        error: &str,
    ) -> Result<bool, SyncError> {
        let db = self.db()?;
        let now = Utc::now().to_rfc3339();
        let rows = db
            .connection()
            .execute(
                r"UPDATE operation_log SET
                    status = 'dead',
                    dead_reason = ?1,
                    dead_at = ?2,
                    last_attempt = ?2,
                    last_error = ?3
                  WHERE id = ?4 AND status = 'pending'",
                params![reason.as_str(), now, error, id],
            )
            .map_err(|e| SyncError::database("Failed to dead-letter operation", &e))?;

        if rows > 0 {
            tracing::warn!(id, %reason, error, "operation dead-lettered");
        }
        Ok(rows > 0)
    }

    /// All dead letters, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>, SyncError> {
        let db = self.db()?;
        let mut stmt = db
            .connection()
            .prepare(
                r"SELECT id, kind, resource, entity_key, payload, attempts,
                         dead_reason, last_error, dead_at
                  FROM operation_log
                  WHERE status = 'dead'
                  ORDER BY id ASC",
            )
            .map_err(|e| SyncError::database("Failed to prepare dead-letter query", &e))?;

        let rows = stmt
            .query_map([], row_to_dead_letter)
            .map_err(|e| SyncError::database("Failed to query dead letters", &e))?;

        let mut letters = Vec::new();
        for row in rows {
            letters.push(row.map_err(|e| SyncError::database("Failed to read dead letter", &e))?);
        }
        Ok(letters)
    }

    /// Put a dead letter back into the active log at its original position,
    /// with its attempt count reset.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if `id` is not a dead letter.
    pub fn retry_dead_letter(&self, id: i64) -> Result<(), SyncError> {
        let db = self.db()?;
        let rows = db
            .connection()
            .execute(
                r"UPDATE operation_log SET
                    status = 'pending',
                    attempts = 0,
                    dead_reason = NULL,
                    dead_at = NULL,
                    last_error = NULL
                  WHERE id = ?1 AND status = 'dead'",
                [id],
            )
            .map_err(|e| SyncError::database("Failed to retry dead letter", &e))?;

        if rows == 0 {
            return Err(SyncError::NotFound(format!("Dead letter {id}")));
        }
        tracing::info!(id, "dead letter returned to the log");
        Ok(())
    }

    /// Retry every dead letter. Returns how many were reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn retry_all_dead_letters(&self) -> Result<usize, SyncError> {
        let db = self.db()?;
        db.connection()
            .execute(
                r"UPDATE operation_log SET
                    status = 'pending',
                    attempts = 0,
                    dead_reason = NULL,
                    dead_at = NULL,
                    last_error = NULL
                  WHERE status = 'dead'",
                [],
            )
            .map_err(|e| SyncError::database("Failed to retry dead letters", &e))
    }

    /// Permanently drop a dead letter.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if `id` is not a dead letter.
    pub fn discard(&self, id: i64) -> Result<(), SyncError> {
        let db = self.db()?;
        let rows = db
            .connection()
            .execute(
                "DELETE FROM operation_log WHERE id = ?1 AND status = 'dead'",
                [id],
            )
            .map_err(|e| SyncError::database("Failed to discard dead letter", &e))?;

        if rows == 0 {
            return Err(SyncError::NotFound(format!("Dead letter {id}")));
        }
        tracing::info!(id, "dead letter discarded");
        Ok(())
    }

    /// Number of active operations.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn pending_count(&self) -> Result<u64, SyncError> {
        self.count_status("pending")
    }

    /// Number of dead letters.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn dead_count(&self) -> Result<u64, SyncError> {
        self.count_status("dead")
    }

    fn count_status(&self, status: &str) -> Result<u64, SyncError> {
        let db = self.db()?;
        let count: i64 = db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM operation_log WHERE status = ?1",
                [status],
                |row| row.get(0),
            )
            .map_err(|e| SyncError::database("Failed to count operations", &e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Get log statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn stats(&self) -> Result<LogStats, SyncError> {
        let pending = self.pending_count()?;
        let dead = self.dead_count()?;

        let db = self.db()?;
        let oldest: Option<String> = db
            .connection()
            .query_row(
                "SELECT created_at FROM operation_log WHERE status = 'pending' ORDER BY id ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SyncError::database("Failed to get oldest pending", &e))?;

        Ok(LogStats {
            pending,
            dead,
            oldest_pending: oldest.as_deref().and_then(parse_timestamp),
        })
    }

    /// Time of the last fully successful drain, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn last_sync(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        let db = self.db()?;
        let value: Option<String> = db
            .connection()
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?1",
                [LAST_SYNC_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SyncError::database("Failed to read last sync", &e))?;
        Ok(value.as_deref().and_then(parse_timestamp))
    }

    /// Persist the time of a fully successful drain.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn record_last_sync(&self, at: DateTime<Utc>) -> Result<(), SyncError> {
        let db = self.db()?;
        db.connection()
            .execute(
                "INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![LAST_SYNC_KEY, at.to_rfc3339()],
            )
            .map_err(|e| SyncError::database("Failed to record last sync", &e))?;
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

/// Undecoded active row.
struct RawRow {
    id: i64,
    kind: String,
    resource: String,
    key: String,
    payload: String,
    created_at: String,
    attempts: i64,
    last_attempt: Option<String>,
    last_error: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            resource: row.get(2)?,
            key: row.get(3)?,
            payload: row.get(4)?,
            created_at: row.get(5)?,
            attempts: row.get(6)?,
            last_attempt: row.get(7)?,
            last_error: row.get(8)?,
        })
    }

    fn decode(self) -> BatchEntry {
        let entity = EntityRef::new(self.resource, self.key);
        let corrupt = |reason: String| CorruptEntry {
            id: self.id,
            entity: entity.clone(),
            reason,
        };

        let kind = self
            .kind
            .parse::<OperationKind>()
            .map_err(|e| corrupt(e.to_string()))?;
        let created_at = parse_timestamp(&self.created_at)
            .ok_or_else(|| corrupt(format!("Invalid created_at '{}'", self.created_at)))?;
        let attempts = u32::try_from(self.attempts)
            .map_err(|_| corrupt(format!("Invalid attempt count {}", self.attempts)))?;

        Ok(PendingOperation {
            id: self.id,
            kind,
            entity: entity.clone(),
            payload: self.payload,
            created_at,
            attempts,
            last_attempt: self.last_attempt.as_deref().and_then(parse_timestamp),
            last_error: self.last_error,
        })
    }
}

fn row_to_dead_letter(row: &Row<'_>) -> Result<DeadLetter, rusqlite::Error> {
    let attempts: i64 = row.get(5)?;
    let reason: Option<String> = row.get(6)?;
    let dead_at: Option<String> = row.get(8)?;

    Ok(DeadLetter {
        id: row.get(0)?,
        kind: row.get(1)?,
        entity: EntityRef::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
        payload: row.get(4)?,
        attempts: u32::try_from(attempts).unwrap_or(0),
        reason: reason
            .as_deref()
            .map_or(DeadLetterReason::Corrupt, DeadLetterReason::from_storage),
        last_error: row.get(7)?,
        dead_at: dead_at.as_deref().and_then(parse_timestamp),
    })
}
