//! Sync commands: one-shot `run` and long-running `watch`.

use std::sync::Arc;
use std::time::Duration;

use super::Context;
use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::output::{format_status, format_status_line, format_summary};
use crate::remote::RemoteStore;
use crate::sync::probe_loop;

/// Run a single drain cycle.
///
/// The remote counts as online unless `offline` is set or it fails its
/// reachability probe.
///
/// # Errors
///
/// Returns an error if the log or remote cannot be opened, or the log
/// fails during the drain.
pub async fn run_once(ctx: &Context, offline: bool) -> Result<String, SyncError> {
    let remote = ctx.open_remote()?;
    let online = !offline && remote.is_reachable().await;

    let engine = ctx.engine(remote, online)?;
    let summary = engine.sync_now().await?;

    format_summary(&summary, ctx.format)
}

/// Sync in the background until Ctrl-C, printing every status change.
///
/// # Errors
///
/// Returns an error if the engine cannot be built.
pub async fn watch(ctx: &Context, probe_interval: u64) -> Result<String, SyncError> {
    let remote = ctx.open_remote()?;
    let online = remote.is_reachable().await;
    let engine = Arc::new(ctx.engine(remote.clone(), online)?);

    let format = ctx.format;
    engine.subscribe(move |status| match format {
        OutputFormat::Pretty => println!("{}", format_status_line(status)),
        OutputFormat::Json => match serde_json::to_string(status) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to encode status"),
        },
    });

    if format == OutputFormat::Pretty {
        println!("{}", format_status_line(&engine.status()));
    }
    tracing::info!(
        poll_secs = engine.config().poll_interval.as_secs(),
        probe_secs = probe_interval,
        "watching for changes"
    );

    let (stop_probe, probe_stopped) = tokio::sync::oneshot::channel::<()>();
    let remote: Arc<dyn RemoteStore> = remote;
    let probe = tokio::spawn(probe_loop(
        remote,
        engine.connectivity().clone(),
        Duration::from_secs(probe_interval.max(1)),
        async move {
            let _ = probe_stopped.await;
        },
    ));

    Arc::clone(&engine)
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for Ctrl-C");
            }
        })
        .await;

    let _ = stop_probe.send(());
    if let Err(e) = probe.await {
        tracing::warn!(error = %e, "reachability probe ended abnormally");
    }

    let stats = ctx.open_log()?.stats()?;
    format_status(&engine.status(), stats.oldest_pending, format)
}
