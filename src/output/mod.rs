//! Output formatting for clinic-sync.
//!
//! This module provides formatters for displaying sync state in various formats.

mod json;
mod pretty;

use chrono::{DateTime, Utc};

use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::sync::{DeadLetter, PendingOperation, SyncStatus, SyncSummary};

pub use json::*;
pub use pretty::*;

/// Format the sync status based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_status(
    status: &SyncStatus,
    oldest_pending: Option<DateTime<Utc>>,
    format: OutputFormat,
) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_status_pretty(status, oldest_pending)),
        OutputFormat::Json => format_status_json(status, oldest_pending),
    }
}

/// Format active operations based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_operations(
    operations: &[PendingOperation],
    format: OutputFormat,
) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_operations_pretty(operations)),
        OutputFormat::Json => format_operations_json(operations),
    }
}

/// Format dead letters based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_dead_letters(dead: &[DeadLetter], format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_dead_letters_pretty(dead)),
        OutputFormat::Json => format_dead_letters_json(dead),
    }
}

/// Format a sync summary based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_summary(summary: &SyncSummary, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_summary_pretty(summary)),
        OutputFormat::Json => to_json(summary),
    }
}
