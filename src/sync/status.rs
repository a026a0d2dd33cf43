//! Sync status snapshot and observer fan-out.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time view of the sync layer, as shown by UI indicators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Connectivity signal says the remote is reachable
    pub is_online: bool,
    /// A drain cycle is in flight
    pub is_syncing: bool,
    /// Active entries in the operation log
    pub pending_operations: u64,
    /// Entries needing manual retry or discard
    pub dead_letters: u64,
    /// Last drain that ended with an empty log
    pub last_sync: Option<DateTime<Utc>>,
}

/// Handle returned by [`StatusPublisher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(&SyncStatus) + Send + Sync>;

struct Inner {
    status: SyncStatus,
    observers: BTreeMap<SubscriptionId, Observer>,
    next_id: u64,
}

/// Holds the current [`SyncStatus`] and notifies observers when it changes.
///
/// Observers are called synchronously, in subscription order, on the thread
/// that published the change. The internal lock is released before they run,
/// so an observer may read the status or unsubscribe itself.
pub struct StatusPublisher {
    inner: Mutex<Inner>,
}

impl StatusPublisher {
    /// Create a publisher seeded with `initial`.
    #[must_use]
    pub fn new(initial: SyncStatus) -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: initial,
                observers: BTreeMap::new(),
                next_id: 0,
            }),
        }
    }

    // A panicking observer never runs under the lock, so a poisoned mutex
    // still holds consistent data.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an observer for every change from now on.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.observers.insert(id, Arc::new(observer));
        id
    }

    /// Remove an observer. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().observers.remove(&id).is_some()
    }

    /// Current snapshot.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.lock().status.clone()
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    /// Apply `update` to the status and notify observers if anything changed.
    ///
    /// Returns the new snapshot.
    pub fn publish<F>(&self, update: F) -> SyncStatus
    where
        F: FnOnce(&mut SyncStatus),
    {
        let (snapshot, observers) = {
            let mut inner = self.lock();
            let mut next = inner.status.clone();
            update(&mut next);
            if next == inner.status {
                return next;
            }
            inner.status = next.clone();
            let observers: Vec<Observer> = inner.observers.values().cloned().collect();
            (next, observers)
        };

        for observer in observers {
            observer(&snapshot);
        }
        snapshot
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new(SyncStatus::default())
    }
}
