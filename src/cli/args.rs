use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

use crate::sync::{EntityRef, OperationKind};

#[derive(Parser)]
#[command(name = "clinic-sync")]
#[command(about = "Local-first operation log and sync engine for clinic records")]
#[command(long_about = "clinic-sync - offline-first record synchronization

Records local mutations (create, update, delete) in a durable operation
log and replays them against the remote store whenever it is reachable.
Operations the remote rejects are kept as dead letters for manual review.

QUICK START:
  clinic-sync enqueue create patients/P1 -p '{\"name\":\"Ada\"}'
  clinic-sync status             Show pending and dead-lettered counts
  clinic-sync run                Push pending operations now
  clinic-sync watch              Keep syncing in the background

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting

ENVIRONMENT:
  CLINIC_SYNC_HOME   Data directory (default ~/.clinic-sync)
  CLINIC_SYNC_LOG    Log filter, e.g. 'info' or 'clinic_sync=debug'

For more information on a specific command, run:
  clinic-sync <command> --help")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Use 'pretty' for human-readable colored output,
    /// or 'json' for machine-readable output suitable for scripting.
    /// Defaults to `general.default_output` from the config file.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Path to the config file (default: <data dir>/config.yaml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show sync status
    ///
    /// Displays connectivity, pending and dead-lettered counts, the age of
    /// the oldest pending operation and the time of the last full sync.
    #[command(alias = "st")]
    Status,

    /// Record a local mutation
    ///
    /// Appends an operation to the log. Nothing is sent until the next sync.
    ///
    /// # Examples
    ///
    ///   clinic-sync enqueue create patients/P1 -p '{"name":"Ada"}'
    ///   clinic-sync enqueue update appointments/A7 -p '{"room":"2B"}'
    ///   clinic-sync enqueue delete inventory/SKU-19
    #[command(alias = "add")]
    Enqueue {
        /// Mutation kind (create, update, delete)
        kind: OperationKind,

        /// Target entity as resource/key
        entity: EntityRef,

        /// JSON payload (defaults to {} for deletes)
        #[arg(long, short = 'p')]
        payload: Option<String>,
    },

    /// List pending operations or dead letters
    #[command(alias = "ls")]
    List {
        /// Show dead letters instead of pending operations
        #[arg(long)]
        dead: bool,

        /// Maximum entries to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Run one sync cycle now
    ///
    /// Pushes pending operations to the remote store, in order. Does
    /// nothing if the remote is unreachable.
    Run {
        /// Treat the remote as unreachable
        #[arg(long)]
        offline: bool,
    },

    /// Keep syncing until interrupted
    ///
    /// Probes the remote for reachability, syncs on every poll interval and
    /// whenever the remote comes back, and prints each status change.
    Watch {
        /// Seconds between reachability probes
        #[arg(long, default_value = "5")]
        probe_interval: u64,
    },

    /// Put dead letters back in line for retry
    Retry {
        /// Retry every dead letter
        #[arg(long, conflicts_with = "id")]
        all: bool,

        /// Dead letter ID to retry
        id: Option<i64>,
    },

    /// Drop a dead letter permanently
    Discard {
        /// Dead letter ID
        id: i64,
    },

    /// Generate shell completions
    ///
    /// Example: clinic-sync completions bash > ~/.bash_completion.d/clinic-sync
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_enqueue() {
        let cli = Cli::try_parse_from([
            "clinic-sync",
            "enqueue",
            "create",
            "patients/P1",
            "-p",
            r#"{"name":"Ada"}"#,
        ])
        .unwrap();

        match cli.command {
            Commands::Enqueue {
                kind,
                entity,
                payload,
            } => {
                assert_eq!(kind, OperationKind::Create);
                assert_eq!(entity, EntityRef::new("patients", "P1"));
                assert_eq!(payload.as_deref(), Some(r#"{"name":"Ada"}"#));
            }
            _ => panic!("expected enqueue"),
        }
    }

    #[test]
    fn test_parse_enqueue_rejects_bad_entity() {
        let result = Cli::try_parse_from(["clinic-sync", "enqueue", "create", "patients"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_enqueue_rejects_bad_kind() {
        let result = Cli::try_parse_from(["clinic-sync", "enqueue", "merge", "patients/P1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_output_after_subcommand() {
        let cli = Cli::try_parse_from(["clinic-sync", "status", "-o", "json"]).unwrap();
        assert_eq!(cli.output, Some(OutputFormat::Json));
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_output_defaults_to_config() {
        let cli = Cli::try_parse_from(["clinic-sync", "status"]).unwrap();
        assert_eq!(cli.output, None);
    }

    #[test]
    fn test_parse_list_dead() {
        let cli = Cli::try_parse_from(["clinic-sync", "list", "--dead", "-n", "5"]).unwrap();
        match cli.command {
            Commands::List { dead, limit } => {
                assert!(dead);
                assert_eq!(limit, 5);
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_retry_all_conflicts_with_id() {
        let result = Cli::try_parse_from(["clinic-sync", "retry", "--all", "3"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_run_offline() {
        let cli = Cli::try_parse_from(["clinic-sync", "run", "--offline"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { offline: true }));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["clinic-sync", "completions", "zsh"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Zsh }
        ));
    }
}
