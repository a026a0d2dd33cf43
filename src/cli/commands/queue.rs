//! Operation log commands.
//!
//! Inspect the log, append to it and manage dead letters. None of these
//! talk to the remote except `status`, which probes reachability.

use colored::Colorize;

use super::Context;
use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::output::{format_dead_letters, format_operations, format_status, to_json};
use crate::remote::RemoteStore;
use crate::sync::{EntityRef, NewOperation, OperationKind, SyncStatus};

/// Show log counts and remote reachability.
///
/// # Errors
///
/// Returns an error if the log or the remote store cannot be opened.
pub async fn status(ctx: &Context) -> Result<String, SyncError> {
    let log = ctx.open_log()?;
    let stats = log.stats()?;
    let remote = ctx.open_remote()?;

    let status = SyncStatus {
        is_online: remote.is_reachable().await,
        is_syncing: false,
        pending_operations: stats.pending,
        dead_letters: stats.dead,
        last_sync: log.last_sync()?,
    };

    format_status(&status, stats.oldest_pending, ctx.format)
}

/// Build the operation described on the command line.
fn build_operation(
    kind: OperationKind,
    entity: EntityRef,
    payload: Option<&str>,
) -> Result<NewOperation, SyncError> {
    match (kind, payload) {
        (OperationKind::Delete, None) => Ok(NewOperation::delete(entity)),
        (_, Some(payload)) => NewOperation::from_json(kind, entity, payload),
        (_, None) => Err(SyncError::InvalidInput(format!(
            "--payload is required for {}",
            kind.as_str()
        ))),
    }
}

/// Append an operation to the log.
///
/// # Errors
///
/// Returns an error if the payload is not valid JSON or the append fails.
pub fn enqueue(
    ctx: &Context,
    kind: OperationKind,
    entity: EntityRef,
    payload: Option<&str>,
) -> Result<String, SyncError> {
    let operation = build_operation(kind, entity, payload)?;
    let log = ctx.open_log()?;
    let appended = log.append(&operation)?;

    match ctx.format {
        OutputFormat::Json => to_json(&appended),
        OutputFormat::Pretty => Ok(format!(
            "Queued {} {} (ID: {})",
            appended.kind.display_name(),
            appended.entity.to_string().bold(),
            appended.id
        )),
    }
}

/// List pending operations, or dead letters with `dead`.
///
/// # Errors
///
/// Returns an error if the log cannot be read.
pub fn list(ctx: &Context, dead: bool, limit: usize) -> Result<String, SyncError> {
    let log = ctx.open_log()?;

    if dead {
        let letters: Vec<_> = log.dead_letters()?.into_iter().take(limit).collect();
        return format_dead_letters(&letters, ctx.format);
    }

    let operations: Vec<_> = log
        .peek_batch(limit)?
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(operation) => Some(operation),
            Err(corrupt) => {
                tracing::warn!(id = corrupt.id, reason = %corrupt.reason, "skipping corrupt log entry");
                None
            }
        })
        .collect();

    format_operations(&operations, ctx.format)
}

/// Reset one dead letter, or all of them, for retry.
///
/// # Errors
///
/// Returns an error if neither an ID nor `all` is given, or the ID is not
/// a dead letter.
pub fn retry(ctx: &Context, all: bool, id: Option<i64>) -> Result<String, SyncError> {
    let log = ctx.open_log()?;

    if let Some(op_id) = id {
        log.retry_dead_letter(op_id)?;
        match ctx.format {
            OutputFormat::Json => to_json(&serde_json::json!({ "retried": [op_id] })),
            OutputFormat::Pretty => Ok(format!("Reset dead letter {op_id} for retry")),
        }
    } else if all {
        let count = log.retry_all_dead_letters()?;
        match ctx.format {
            OutputFormat::Json => to_json(&serde_json::json!({ "reset": count })),
            OutputFormat::Pretty => Ok(format!("Reset {count} dead letters for retry")),
        }
    } else {
        Err(SyncError::InvalidInput(
            "Specify --all or provide a dead letter ID".to_string(),
        ))
    }
}

/// Permanently drop a dead letter.
///
/// # Errors
///
/// Returns an error if the ID is not a dead letter.
pub fn discard(ctx: &Context, id: i64) -> Result<String, SyncError> {
    ctx.open_log()?.discard(id)?;

    match ctx.format {
        OutputFormat::Json => to_json(&serde_json::json!({ "discarded": id })),
        OutputFormat::Pretty => Ok(format!("Discarded dead letter {id}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Paths};
    use crate::sync::DeadLetterReason;
    use tempfile::TempDir;

    fn context(dir: &TempDir, format: OutputFormat) -> Context {
        Context {
            paths: Paths::with_root(dir.path().to_path_buf()),
            config: Config::default(),
            format,
        }
    }

    #[test]
    fn test_build_operation_delete_without_payload() {
        let op = build_operation(OperationKind::Delete, EntityRef::new("patients", "P1"), None)
            .unwrap();
        assert_eq!(op.kind, OperationKind::Delete);
    }

    #[test]
    fn test_build_operation_requires_payload_for_create() {
        let result = build_operation(OperationKind::Create, EntityRef::new("patients", "P1"), None);
        assert!(matches!(result, Err(SyncError::InvalidInput(_))));
    }

    #[test]
    fn test_enqueue_then_list() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, OutputFormat::Json);

        enqueue(
            &ctx,
            OperationKind::Create,
            EntityRef::new("patients", "P1"),
            Some(r#"{"name":"Ada"}"#),
        )
        .unwrap();

        let listed = list(&ctx, false, 10).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&listed).unwrap();
        assert_eq!(parsed["count"], 1);
        assert_eq!(parsed["items"][0]["entity"]["key"], "P1");
    }

    #[test]
    fn test_retry_and_discard_dead_letters() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, OutputFormat::Pretty);
        let log = ctx.open_log().unwrap();
        let first = log
            .append(&NewOperation::delete(EntityRef::new("patients", "P1")))
            .unwrap();
        let second = log
            .append(&NewOperation::delete(EntityRef::new("patients", "P2")))
            .unwrap();
        log.dead_letter(first.id, DeadLetterReason::Conflict, "gone").unwrap();
        log.dead_letter(second.id, DeadLetterReason::Conflict, "gone").unwrap();

        assert!(retry(&ctx, false, Some(first.id)).unwrap().contains("Reset dead letter"));
        assert!(discard(&ctx, second.id).unwrap().contains("Discarded"));
        assert_eq!(log.dead_count().unwrap(), 0);
        assert_eq!(log.pending_count().unwrap(), 1);

        assert!(matches!(retry(&ctx, false, None), Err(SyncError::InvalidInput(_))));
        assert!(matches!(discard(&ctx, second.id), Err(SyncError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_status_reports_counts() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, OutputFormat::Json);
        enqueue(
            &ctx,
            OperationKind::Delete,
            EntityRef::new("inventory", "SKU-1"),
            None,
        )
        .unwrap();

        let output = status(&ctx).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["pending_operations"], 1);
        assert_eq!(parsed["is_online"], true);
        assert!(parsed["oldest_pending"].is_string());
    }
}
