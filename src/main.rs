use anyhow::{Context as _, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use clinic_sync::cli::args::{Cli, Commands};
use clinic_sync::cli::commands::{self, Context};

const LOG_ENV: &str = "CLINIC_SYNC_LOG";

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Completions need neither config nor data directory
    if let Commands::Completions { shell } = cli.command {
        print!("{}", commands::completions(shell)?);
        return Ok(());
    }

    let ctx = Context::load(cli.config.as_deref(), cli.output)
        .context("failed to load configuration")?;

    let output = match cli.command {
        Commands::Status => commands::status(&ctx).await?,
        Commands::Enqueue {
            kind,
            entity,
            payload,
        } => commands::enqueue(&ctx, kind, entity, payload.as_deref())?,
        Commands::List { dead, limit } => commands::list(&ctx, dead, limit)?,
        Commands::Run { offline } => commands::run_once(&ctx, offline).await?,
        Commands::Watch { probe_interval } => commands::watch(&ctx, probe_interval).await?,
        Commands::Retry { all, id } => commands::retry(&ctx, all, id)?,
        Commands::Discard { id } => commands::discard(&ctx, id)?,
        Commands::Completions { .. } => String::new(),
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
