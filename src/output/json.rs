//! JSON output formatting for clinic-sync.
//!
//! This module provides functions for formatting sync state as JSON.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::error::SyncError;
use crate::sync::{DeadLetter, PendingOperation, SyncStatus};

/// Format the sync status as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_status_json(
    status: &SyncStatus,
    oldest_pending: Option<DateTime<Utc>>,
) -> Result<String, SyncError> {
    let output = json!({
        "is_online": status.is_online,
        "is_syncing": status.is_syncing,
        "pending_operations": status.pending_operations,
        "dead_letters": status.dead_letters,
        "last_sync": status.last_sync.map(|t| t.to_rfc3339()),
        "oldest_pending": oldest_pending.map(|t| t.to_rfc3339()),
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format active operations as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_operations_json(operations: &[PendingOperation]) -> Result<String, SyncError> {
    let output = json!({
        "count": operations.len(),
        "items": operations
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format dead letters as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_dead_letters_json(dead: &[DeadLetter]) -> Result<String, SyncError> {
    let output = json!({
        "count": dead.len(),
        "items": dead
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Serialize any value to JSON (generic helper)
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, SyncError> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{DeadLetterReason, EntityRef, OperationKind};

    fn make_operation(id: i64) -> PendingOperation {
        PendingOperation {
            id,
            kind: OperationKind::Update,
            entity: EntityRef::new("inventory", "SKU-1"),
            payload: r#"{"qty":3}"#.to_string(),
            created_at: Utc::now(),
            attempts: 2,
            last_attempt: None,
            last_error: Some("timeout".to_string()),
        }
    }

    #[test]
    fn test_format_status_json() {
        let status = SyncStatus {
            is_online: true,
            pending_operations: 3,
            ..SyncStatus::default()
        };
        let result = format_status_json(&status, None).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();

        assert_eq!(parsed["is_online"], true);
        assert_eq!(parsed["is_syncing"], false);
        assert_eq!(parsed["pending_operations"], 3);
        assert!(parsed["last_sync"].is_null());
    }

    #[test]
    fn test_format_operations_json() {
        let result = format_operations_json(&[make_operation(1), make_operation(2)]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();

        assert_eq!(parsed["count"], 2);
        assert_eq!(parsed["items"][0]["id"], 1);
        assert_eq!(parsed["items"][0]["kind"], "update");
        assert_eq!(parsed["items"][0]["entity"]["resource"], "inventory");
        assert_eq!(parsed["items"][1]["attempts"], 2);
    }

    #[test]
    fn test_format_dead_letters_json() {
        let dead = DeadLetter {
            id: 9,
            kind: "create".to_string(),
            entity: EntityRef::new("patients", "P1"),
            payload: "{}".to_string(),
            attempts: 5,
            reason: DeadLetterReason::ExhaustedRetries,
            last_error: None,
            dead_at: None,
        };
        let result = format_dead_letters_json(&[dead]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();

        assert_eq!(parsed["count"], 1);
        assert_eq!(parsed["items"][0]["reason"], "exhausted_retries");
    }

    #[test]
    fn test_to_json_generic() {
        let result = to_json(&serde_json::json!({"reset": 2})).unwrap();
        assert!(result.contains("\"reset\": 2"));
    }
}
