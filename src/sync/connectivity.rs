//! Online/offline signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::remote::RemoteStore;

/// Shared boolean connectivity source.
///
/// Cloning shares the same underlying signal.
#[derive(Debug, Clone)]
pub struct ConnectivitySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivitySignal {
    /// Create a signal with an initial state.
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the state. Returns `true` if it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "connectivity changed");
        }
        changed
    }

    /// Receiver notified on every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Poll `remote.is_reachable()` every `every` and feed the result into
/// `signal` until `shutdown` resolves.
pub async fn probe_loop<F>(
    remote: Arc<dyn RemoteStore>,
    signal: ConnectivitySignal,
    every: Duration,
    shutdown: F,
) where
    F: std::future::Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = ticker.tick() => {
                let reachable = remote.is_reachable().await;
                signal.set_online(reachable);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemoteStore;

    #[test]
    fn test_set_online_reports_changes_only() {
        let signal = ConnectivitySignal::new(false);
        assert!(!signal.is_online());

        assert!(signal.set_online(true));
        assert!(!signal.set_online(true));
        assert!(signal.is_online());
    }

    #[test]
    fn test_clones_share_state() {
        let signal = ConnectivitySignal::new(false);
        let other = signal.clone();

        other.set_online(true);
        assert!(signal.is_online());
    }

    #[tokio::test]
    async fn test_subscribers_are_notified() {
        let signal = ConnectivitySignal::new(false);
        let mut rx = signal.subscribe();

        signal.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn test_probe_loop_feeds_signal() {
        let mut remote = MockRemoteStore::new();
        remote.expect_is_reachable().returning(|| true);

        let signal = ConnectivitySignal::new(false);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let task = tokio::spawn(probe_loop(
            Arc::new(remote),
            signal.clone(),
            Duration::from_millis(10),
            async move {
                let _ = stop_rx.await;
            },
        ));

        let mut rx = signal.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|online| *online))
            .await
            .unwrap()
            .unwrap();

        stop_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
