use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::sync::{DeadLetter, DeadLetterReason, PendingOperation, SkipReason, SyncStatus, SyncSummary};

const ERROR_WIDTH: usize = 50;

/// Human-friendly age of a timestamp relative to `now`.
pub fn relative_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(at);
    if age.num_days() > 0 {
        format!("{} days ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hours ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minutes ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn shorten(text: &str) -> String {
    if text.chars().count() > ERROR_WIDTH {
        let head: String = text.chars().take(ERROR_WIDTH - 3).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Format the sync status as a pretty block
pub fn format_status_pretty(status: &SyncStatus, oldest_pending: Option<DateTime<Utc>>) -> String {
    let now = Utc::now();
    let mut lines = Vec::new();

    lines.push("Sync Status".bold().to_string());
    lines.push("─".repeat(40));

    let connectivity = if status.is_online {
        "online".green()
    } else {
        "offline".yellow()
    };
    lines.push(format!("  Remote:     {connectivity}"));

    if status.is_syncing {
        lines.push(format!("  State:      {}", "syncing".cyan()));
    }

    lines.push(format!(
        "  Pending:    {} {}",
        status.pending_operations,
        if status.pending_operations > 0 {
            "operations waiting".dimmed()
        } else {
            "".dimmed()
        }
    ));

    lines.push(format!(
        "  Dead:       {} {}",
        status.dead_letters,
        if status.dead_letters > 0 {
            "operations need attention".red()
        } else {
            "".normal()
        }
    ));

    if let Some(oldest) = oldest_pending {
        lines.push(format!("  Oldest:     {}", relative_age(oldest, now).dimmed()));
    }

    let last_sync = status
        .last_sync
        .map_or_else(|| "never".to_string(), |at| relative_age(at, now));
    lines.push(format!("  Last sync:  {}", last_sync.dimmed()));

    if status.pending_operations > 0 {
        lines.push(String::new());
        lines.push(
            "Run 'clinic-sync run' to push pending operations"
                .dimmed()
                .to_string(),
        );
    }
    if status.dead_letters > 0 {
        lines.push(
            "Run 'clinic-sync list --dead' to inspect dead letters"
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// One-line status, used when streaming changes
pub fn format_status_line(status: &SyncStatus) -> String {
    let connectivity = if status.is_online {
        "online".green()
    } else {
        "offline".yellow()
    };
    let state = if status.is_syncing {
        "syncing".cyan()
    } else {
        "idle".normal()
    };
    format!(
        "[{}] {} {}  pending={} dead={}",
        Utc::now().format("%H:%M:%S").to_string().dimmed(),
        connectivity,
        state,
        status.pending_operations,
        status.dead_letters
    )
}

/// Format active operations as a table
pub fn format_operations_pretty(operations: &[PendingOperation]) -> String {
    if operations.is_empty() {
        return "No pending operations.".to_string();
    }

    let mut lines = Vec::new();
    lines.push(format!("Pending Operations ({})", operations.len()));
    lines.push("─".repeat(70));
    lines.push(format!(
        "{:<6} {:<8} {:<30} {:<17} {}",
        "ID", "Kind", "Entity", "Created", "Tries"
    ));
    lines.push("─".repeat(70));

    for op in operations {
        lines.push(format!(
            "{:<6} {:<8} {:<30} {:<17} {}",
            op.id,
            op.kind.display_name(),
            op.entity.to_string(),
            op.created_at.format("%Y-%m-%d %H:%M"),
            op.attempts
        ));
        if let Some(error) = &op.last_error {
            lines.push(format!("       {}", shorten(error).yellow()));
        }
    }

    lines.join("\n")
}

/// Format dead letters as a table
pub fn format_dead_letters_pretty(dead: &[DeadLetter]) -> String {
    if dead.is_empty() {
        return "No dead letters.".to_string();
    }

    let mut lines = Vec::new();
    lines.push(format!("Dead Letters ({})", dead.len()));
    lines.push("─".repeat(70));
    lines.push(format!(
        "{:<6} {:<8} {:<30} {:<18} {}",
        "ID", "Kind", "Entity", "Reason", "Tries"
    ));
    lines.push("─".repeat(70));

    for letter in dead {
        let reason = match letter.reason {
            DeadLetterReason::Conflict => letter.reason.to_string().red(),
            DeadLetterReason::ExhaustedRetries => letter.reason.to_string().yellow(),
            DeadLetterReason::Corrupt => letter.reason.to_string().magenta(),
        };
        lines.push(format!(
            "{:<6} {:<8} {:<30} {:<18} {}",
            letter.id,
            letter.kind,
            letter.entity.to_string(),
            reason,
            letter.attempts
        ));
        if let Some(error) = &letter.last_error {
            lines.push(format!("       {}", shorten(error).red()));
        }
    }

    lines.push(String::new());
    lines.push(
        "Use 'clinic-sync retry <id>' or 'clinic-sync discard <id>'"
            .dimmed()
            .to_string(),
    );

    lines.join("\n")
}

/// Format the outcome of a sync request
pub fn format_summary_pretty(summary: &SyncSummary) -> String {
    match summary.skipped {
        Some(SkipReason::Offline) => {
            return format!(
                "{} remote is offline, {} operations still pending",
                "Skipped:".yellow(),
                summary.remaining
            );
        }
        Some(SkipReason::AlreadySyncing) => {
            return format!("{} a sync is already running", "Skipped:".yellow());
        }
        None => {}
    }

    if summary.synced == 0
        && summary.failed == 0
        && summary.dead_lettered == 0
        && summary.remaining == 0
    {
        return "No pending operations to sync.".to_string();
    }

    let mut lines = Vec::new();
    let headline = if summary.success {
        "Sync complete".green().bold()
    } else {
        "Sync incomplete".yellow().bold()
    };
    lines.push(headline.to_string());
    lines.push(format!("  {} synced", summary.synced.to_string().green()));
    if summary.failed > 0 {
        lines.push(format!(
            "  {} failed, will retry",
            summary.failed.to_string().yellow()
        ));
    }
    if summary.dead_lettered > 0 {
        lines.push(format!(
            "  {} dead-lettered",
            summary.dead_lettered.to_string().red()
        ));
    }
    if summary.remaining > 0 {
        lines.push(format!("  {} remaining", summary.remaining));
    }

    lines.join("\n")
}
