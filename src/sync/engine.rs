//! Sync engine: drains the operation log into the remote store.
//!
//! At most one drain cycle runs at a time. A request that arrives while a
//! cycle is in flight is answered immediately with
//! [`SkipReason::AlreadySyncing`] rather than queued.
//!
//! Within a cycle operations are submitted in log order. When an operation
//! fails, later operations for the same entity are held back for the rest
//! of the cycle so a later update never lands before an earlier create.
//! Unrelated entities keep going.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};

use super::connectivity::ConnectivitySignal;
use super::log::{FailureOutcome, OperationLog};
use super::operation::{DeadLetter, DeadLetterReason, EntityRef, NewOperation, PendingOperation};
use super::status::{StatusPublisher, SubscriptionId, SyncStatus};
use crate::error::SyncError;
use crate::remote::{RemoteError, RemoteStore};

/// Runtime configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Failed attempts before an operation is dead-lettered
    pub max_attempts: u32,
    /// Operations read from the log per pass
    pub batch_size: usize,
    /// Period of the automatic drain timer
    pub poll_interval: Duration,
    /// Bound on a single remote submission
    pub submit_timeout: Duration,
}

impl EngineConfig {
    /// Reject settings the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if any limit or period is zero.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.max_attempts == 0 {
            return Err(SyncError::Config("max_attempts must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch_size must be at least 1".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(SyncError::Config("poll_interval must be non-zero".to_string()));
        }
        if self.submit_timeout.is_zero() {
            return Err(SyncError::Config("submit_timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            batch_size: 50,
            poll_interval: Duration::from_secs(30),
            submit_timeout: Duration::from_secs(10),
        }
    }
}

/// Why a sync request did not start a drain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Connectivity signal is offline
    Offline,
    /// Another cycle is in flight
    AlreadySyncing,
}

/// Outcome of a sync request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// The cycle ended with an empty log and nothing was dead-lettered
    pub success: bool,
    /// Operations confirmed during the cycle
    pub synced: u64,
    /// Submissions that failed and will be retried
    pub failed: u64,
    /// Operations moved to dead-letter state during the cycle
    pub dead_lettered: u64,
    /// Active operations left in the log
    pub remaining: u64,
    /// Set when no cycle ran
    pub skipped: Option<SkipReason>,
}

impl SyncSummary {
    fn skipped(reason: SkipReason, remaining: u64) -> Self {
        Self {
            remaining,
            skipped: Some(reason),
            ..Self::default()
        }
    }

    /// Whether a drain cycle actually ran.
    #[must_use]
    pub const fn ran(&self) -> bool {
        self.skipped.is_none()
    }
}

/// Clears the single-flight flag and the syncing indicator, including when
/// the drain future is dropped mid-flight.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
    publisher: &'a StatusPublisher,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool, publisher: &'a StatusPublisher) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, publisher })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.publisher.publish(|s| s.is_syncing = false);
    }
}

/// Reconciles an [`OperationLog`] against a [`RemoteStore`].
pub struct SyncEngine {
    log: OperationLog,
    remote: Arc<dyn RemoteStore>,
    connectivity: ConnectivitySignal,
    publisher: StatusPublisher,
    config: EngineConfig,
    in_flight: AtomicBool,
}

impl SyncEngine {
    /// Build an engine, seeding its status from what the log has persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails [`EngineConfig::validate`] or the
    /// log cannot be read.
    pub fn new(
        log: OperationLog,
        remote: Arc<dyn RemoteStore>,
        connectivity: ConnectivitySignal,
        config: EngineConfig,
    ) -> Result<Self, SyncError> {
        config.validate()?;

        let initial = SyncStatus {
            is_online: connectivity.is_online(),
            is_syncing: false,
            pending_operations: log.pending_count()?,
            dead_letters: log.dead_count()?,
            last_sync: log.last_sync()?,
        };

        Ok(Self {
            log,
            remote,
            connectivity,
            publisher: StatusPublisher::new(initial),
            config,
            in_flight: AtomicBool::new(false),
        })
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Connectivity signal the engine follows.
    #[must_use]
    pub const fn connectivity(&self) -> &ConnectivitySignal {
        &self.connectivity
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.publisher.status()
    }

    /// Observe status changes. See [`StatusPublisher::subscribe`].
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        self.publisher.subscribe(observer)
    }

    /// Stop observing. Returns `false` if already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.publisher.unsubscribe(id)
    }

    /// Record a local mutation. Does not touch the network.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Database`] if the operation could not be
    /// persisted; it is then not queued.
    pub fn enqueue(&self, operation: &NewOperation) -> Result<PendingOperation, SyncError> {
        let appended = self.log.append(operation)?;
        self.refresh_counts()?;
        Ok(appended)
    }

    /// Dead letters awaiting manual action.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>, SyncError> {
        self.log.dead_letters()
    }

    /// Put a dead letter back in line for automatic retry.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if `id` is not a dead letter.
    pub fn retry_dead_letter(&self, id: i64) -> Result<(), SyncError> {
        self.log.retry_dead_letter(id)?;
        self.refresh_counts()
    }

    /// Put every dead letter back in line. Returns how many were reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be updated.
    pub fn retry_all_dead_letters(&self) -> Result<usize, SyncError> {
        let count = self.log.retry_all_dead_letters()?;
        self.refresh_counts()?;
        Ok(count)
    }

    /// Drop a dead letter for good.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if `id` is not a dead letter.
    pub fn discard_dead_letter(&self, id: i64) -> Result<(), SyncError> {
        self.log.discard(id)?;
        self.refresh_counts()
    }

    /// Re-read counts from the log and publish them.
    fn refresh_counts(&self) -> Result<(), SyncError> {
        let pending = self.log.pending_count()?;
        let dead = self.log.dead_count()?;
        let online = self.connectivity.is_online();
        self.publisher.publish(|s| {
            s.is_online = online;
            s.pending_operations = pending;
            s.dead_letters = dead;
        });
        Ok(())
    }

    /// Run one drain cycle now, unless offline or one is already running.
    ///
    /// Expected failure modes (offline, partial failure, conflicts) are
    /// reported in the summary, not as errors.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local log itself fails.
    pub async fn sync_now(&self) -> Result<SyncSummary, SyncError> {
        let online = self.connectivity.is_online();
        self.publisher.publish(|s| s.is_online = online);

        if !online {
            tracing::debug!("sync requested while offline");
            return Ok(SyncSummary::skipped(
                SkipReason::Offline,
                self.status().pending_operations,
            ));
        }

        let Some(guard) = FlightGuard::acquire(&self.in_flight, &self.publisher) else {
            tracing::debug!("sync requested while a cycle is in flight");
            return Ok(SyncSummary::skipped(
                SkipReason::AlreadySyncing,
                self.status().pending_operations,
            ));
        };

        self.publisher.publish(|s| s.is_syncing = true);
        tracing::info!(pending = self.status().pending_operations, "drain cycle started");

        let mut summary = SyncSummary::default();
        let drained = self.drain(&mut summary).await;

        let finished = self.finish_cycle(&mut summary, drained.is_ok());
        drop(guard);

        drained?;
        finished?;

        tracing::info!(
            success = summary.success,
            synced = summary.synced,
            failed = summary.failed,
            dead_lettered = summary.dead_lettered,
            remaining = summary.remaining,
            "drain cycle finished"
        );
        Ok(summary)
    }

    fn finish_cycle(&self, summary: &mut SyncSummary, drained: bool) -> Result<(), SyncError> {
        let pending = self.log.pending_count()?;
        let dead = self.log.dead_count()?;
        summary.remaining = pending;
        summary.success = drained && pending == 0 && summary.dead_lettered == 0;

        let last_sync = if drained && pending == 0 {
            let now = Utc::now();
            self.log.record_last_sync(now)?;
            Some(now)
        } else {
            None
        };

        let online = self.connectivity.is_online();
        self.publisher.publish(|s| {
            s.is_syncing = false;
            s.is_online = online;
            s.pending_operations = pending;
            s.dead_letters = dead;
            if last_sync.is_some() {
                s.last_sync = last_sync;
            }
        });
        Ok(())
    }

    async fn drain(&self, summary: &mut SyncSummary) -> Result<(), SyncError> {
        // Entities that failed this cycle are not retried until the next one.
        let mut blocked: HashSet<EntityRef> = HashSet::new();
        // Walk the log by ID so blocked entities cannot fill every page.
        let mut cursor = 0;

        'pages: loop {
            if !self.connectivity.is_online() {
                tracing::info!("connectivity lost, ending drain cycle");
                break;
            }

            let batch = self.log.peek_ready_after(cursor, self.config.batch_size)?;
            let Some(last_id) = batch.last().map(|entry| match entry {
                Ok(operation) => operation.id,
                Err(corrupt) => corrupt.id,
            }) else {
                break;
            };
            cursor = last_id;

            for entry in batch {
                let operation = match entry {
                    Ok(operation) => operation,
                    Err(corrupt) => {
                        if self
                            .log
                            .dead_letter(corrupt.id, DeadLetterReason::Corrupt, &corrupt.reason)?
                        {
                            summary.dead_lettered += 1;
                        }
                        blocked.insert(corrupt.entity);
                        self.refresh_counts()?;
                        continue;
                    }
                };

                if blocked.contains(&operation.entity) {
                    continue;
                }
                if !self.connectivity.is_online() {
                    tracing::info!("connectivity lost, ending drain cycle");
                    break 'pages;
                }

                match self.submit(&operation).await {
                    Ok(()) => {
                        self.log.confirm(operation.id)?;
                        summary.synced += 1;
                        tracing::debug!(id = operation.id, entity = %operation.entity, "operation confirmed");
                    }
                    Err(err) if err.is_retryable() => {
                        let message = err.to_string();
                        tracing::warn!(id = operation.id, entity = %operation.entity, error = %message, "submit failed");
                        match self
                            .log
                            .mark_failed(operation.id, &message, self.config.max_attempts)?
                        {
                            FailureOutcome::Retrying { .. } => summary.failed += 1,
                            FailureOutcome::DeadLettered { .. } => summary.dead_lettered += 1,
                            FailureOutcome::Missing => {}
                        }
                        blocked.insert(operation.entity);
                    }
                    Err(err) => {
                        if self.log.dead_letter(
                            operation.id,
                            DeadLetterReason::Conflict,
                            &err.to_string(),
                        )? {
                            summary.dead_lettered += 1;
                        }
                        blocked.insert(operation.entity);
                    }
                }

                self.refresh_counts()?;
            }
        }

        Ok(())
    }

    async fn submit(&self, operation: &PendingOperation) -> Result<(), RemoteError> {
        let timeout = self.config.submit_timeout;
        match tokio::time::timeout(timeout, self.remote.submit(operation)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(timeout)),
        }
    }

    async fn sync_in_background(&self, trigger: &'static str) {
        match self.sync_now().await {
            Ok(summary) if summary.ran() => {
                tracing::debug!(trigger, synced = summary.synced, "background sync done");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(trigger, error = %e, "background sync failed"),
        }
    }

    /// Drive automatic syncs until `shutdown` resolves: once at start, on
    /// every timer tick, and on every offline-to-online transition.
    ///
    /// Never returns an error; failed cycles are logged.
    pub async fn run<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let period = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut online_rx = self.connectivity.subscribe();
        let mut was_online = *online_rx.borrow_and_update();

        self.sync_in_background("startup").await;

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => self.sync_in_background("timer").await,
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *online_rx.borrow_and_update();
                    self.publisher.publish(|s| s.is_online = online);
                    if online && !was_online {
                        self.sync_in_background("reconnect").await;
                    }
                    was_online = online;
                }
            }
        }

        tracing::debug!("sync loop stopped");
    }
}
