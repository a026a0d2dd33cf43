//! Operation types for the operation log.
//!
//! A mutation is recorded as a [`PendingOperation`]: what kind of change,
//! which entity it targets and an opaque JSON payload for the remote store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Kind of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Insert a new row
    Create,
    /// Modify an existing row
    Update,
    /// Remove an existing row
    Delete,
}

impl OperationKind {
    /// Storage and wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Get the display name for this kind.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for OperationKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" | "insert" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" | "remove" => Ok(Self::Delete),
            other => Err(SyncError::InvalidInput(format!(
                "Unknown operation kind: {other}"
            ))),
        }
    }
}

/// Logical resource (table) plus row key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Resource name, e.g. `patients` or `appointments`
    pub resource: String,
    /// Row key within the resource
    pub key: String,
}

impl EntityRef {
    /// Create an entity reference.
    #[must_use]
    pub fn new(resource: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource, self.key)
    }
}

impl FromStr for EntityRef {
    type Err = SyncError;

    /// Parse `resource/key`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((resource, key)) if !resource.is_empty() && !key.is_empty() => {
                Ok(Self::new(resource, key))
            }
            _ => Err(SyncError::InvalidInput(format!(
                "Entity must look like resource/key, got '{s}'"
            ))),
        }
    }
}

/// A mutation that has not been appended yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperation {
    /// Kind of mutation
    pub kind: OperationKind,
    /// Target entity
    pub entity: EntityRef,
    /// JSON body handed to the remote store
    pub payload: String,
}

impl NewOperation {
    /// Create a new operation from a serializable payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn new<T: Serialize>(
        kind: OperationKind,
        entity: EntityRef,
        payload: &T,
    ) -> Result<Self, SyncError> {
        Ok(Self {
            kind,
            entity,
            payload: serde_json::to_string(payload)?,
        })
    }

    /// Create an operation from an already-encoded JSON payload.
    ///
    /// # Errors
    ///
    /// Returns an error if `payload` is not valid JSON.
    pub fn from_json(
        kind: OperationKind,
        entity: EntityRef,
        payload: &str,
    ) -> Result<Self, SyncError> {
        serde_json::from_str::<serde_json::Value>(payload)?;
        Ok(Self {
            kind,
            entity,
            payload: payload.to_string(),
        })
    }

    /// Create a payload-less delete.
    #[must_use]
    pub fn delete(entity: EntityRef) -> Self {
        Self {
            kind: OperationKind::Delete,
            entity,
            payload: "{}".to_string(),
        }
    }
}

/// An operation recorded in the log and awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Monotonic ID, also the ordering key and the idempotency key
    pub id: i64,
    /// Kind of mutation
    pub kind: OperationKind,
    /// Target entity
    pub entity: EntityRef,
    /// JSON body
    pub payload: String,
    /// When the mutation was made locally
    pub created_at: DateTime<Utc>,
    /// Failed replay attempts so far
    pub attempts: u32,
    /// Last attempt timestamp
    pub last_attempt: Option<DateTime<Utc>>,
    /// Last error message
    pub last_error: Option<String>,
}

/// Why an operation left the active retry set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Remote rejected it because the base state was stale
    Conflict,
    /// Attempt ceiling reached
    ExhaustedRetries,
    /// The stored entry could not be decoded
    Corrupt,
}

impl DeadLetterReason {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::ExhaustedRetries => "exhausted_retries",
            Self::Corrupt => "corrupt",
        }
    }

    /// Parse the storage representation; unknown values read as `Corrupt`.
    #[must_use]
    pub fn from_storage(s: &str) -> Self {
        match s {
            "conflict" => Self::Conflict,
            "exhausted_retries" => Self::ExhaustedRetries,
            _ => Self::Corrupt,
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Conflict => "conflict",
            Self::ExhaustedRetries => "retries exhausted",
            Self::Corrupt => "corrupt entry",
        };
        f.write_str(s)
    }
}

/// A dead-lettered log entry awaiting manual retry or discard.
///
/// Corrupt rows keep their raw text so an operator can still inspect them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Log ID
    pub id: i64,
    /// Stored kind (raw, may be unparseable for corrupt rows)
    pub kind: String,
    /// Target entity
    pub entity: EntityRef,
    /// JSON body
    pub payload: String,
    /// Failed attempts before dead-lettering
    pub attempts: u32,
    /// Why it was dead-lettered
    pub reason: DeadLetterReason,
    /// Last error message
    pub last_error: Option<String>,
    /// When it was dead-lettered
    pub dead_at: Option<DateTime<Utc>>,
}

/// A log row that could not be decoded into a [`PendingOperation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptEntry {
    /// Log ID of the bad row
    pub id: i64,
    /// Entity, when the row got that far
    pub entity: EntityRef,
    /// What was wrong with it
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_storage_name() {
        for kind in [OperationKind::Create, OperationKind::Update, OperationKind::Delete] {
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_kind_aliases() {
        assert_eq!("INSERT".parse::<OperationKind>().unwrap(), OperationKind::Create);
        assert_eq!("remove".parse::<OperationKind>().unwrap(), OperationKind::Delete);
        assert!("upsert".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_entity_parse_and_display() {
        let entity: EntityRef = "patients/P1".parse().unwrap();
        assert_eq!(entity, EntityRef::new("patients", "P1"));
        assert_eq!(entity.to_string(), "patients/P1");

        assert!("patients".parse::<EntityRef>().is_err());
        assert!("/P1".parse::<EntityRef>().is_err());
        assert!("patients/".parse::<EntityRef>().is_err());
    }

    #[test]
    fn test_entity_key_may_contain_slash() {
        let entity: EntityRef = "files/2024/scan.pdf".parse().unwrap();
        assert_eq!(entity.resource, "files");
        assert_eq!(entity.key, "2024/scan.pdf");
    }

    #[test]
    fn test_new_operation_serializes_payload() {
        #[derive(Serialize)]
        struct Patient<'a> {
            name: &'a str,
        }

        let op = NewOperation::new(
            OperationKind::Create,
            EntityRef::new("patients", "P1"),
            &Patient { name: "Ada" },
        )
        .unwrap();
        assert_eq!(op.payload, r#"{"name":"Ada"}"#);
    }

    #[test]
    fn test_from_json_rejects_invalid_payload() {
        let result = NewOperation::from_json(
            OperationKind::Update,
            EntityRef::new("patients", "P1"),
            "{not json",
        );
        assert!(matches!(result, Err(SyncError::Parse(_))));
    }

    #[test]
    fn test_dead_letter_reason_storage() {
        assert_eq!(
            DeadLetterReason::from_storage(DeadLetterReason::ExhaustedRetries.as_str()),
            DeadLetterReason::ExhaustedRetries
        );
        assert_eq!(DeadLetterReason::from_storage("???"), DeadLetterReason::Corrupt);
    }
}
