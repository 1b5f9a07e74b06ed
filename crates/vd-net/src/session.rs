//! Session-expiry signaling and connectivity state
//!
//! Both are injected into `ResilientClient` rather than read from globals.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, Notify};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The backend rejected our credentials while we were online
    Expired,
}

/// Receives `session:expired` notifications from the request layer.
pub trait SessionNotifier: Send + Sync {
    fn session_expired(&self);
}

/// Process-wide publish/subscribe channel for session events.
#[derive(Debug, Clone)]
pub struct SessionBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for SessionBus {
    fn default() -> Self {
        Self::new(16)
    }
}

impl SessionNotifier for SessionBus {
    fn session_expired(&self) {
        warn!("session expired: re-authentication required");
        // No subscribers is not an error; the event is simply dropped.
        let _ = self.tx.send(SessionEvent::Expired);
    }
}

/// Host-provided network connectivity state.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;

    /// What the client just learned about the network: `true` after any
    /// response, `false` after a connect failure or timeout.
    fn observe(&self, reachable: bool) {
        let _ = reachable;
    }
}

/// Settable connectivity flag, driven by observed transport outcomes or by
/// whatever else watches the network.
#[derive(Debug)]
pub struct ConnectivityFlag {
    online: AtomicBool,
    restored: Notify,
}

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            restored: Notify::new(),
        }
    }

    /// Set the state; returns whether it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        match (was_online, online) {
            (false, true) => {
                info!("connectivity restored");
                self.restored.notify_one();
            }
            (true, false) => warn!("backend unreachable, now offline"),
            _ => return false,
        }
        true
    }

    /// Resolves on the next offline → online transition, or immediately if
    /// one happened since the last call.
    pub async fn restored(&self) {
        self.restored.notified().await
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn observe(&self, reachable: bool) {
        self.set_online(reachable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_delivers_to_subscribers() {
        let bus = SessionBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.session_expired();

        assert_eq!(rx1.try_recv().unwrap(), SessionEvent::Expired);
        assert_eq!(rx2.try_recv().unwrap(), SessionEvent::Expired);
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_bus_without_subscribers() {
        SessionBus::default().session_expired();
    }

    #[test]
    fn test_connectivity_flag() {
        let flag = ConnectivityFlag::default();
        assert!(flag.is_online());
        assert!(flag.set_online(false));
        assert!(!flag.is_online());
        assert!(!flag.set_online(false), "no change");
    }

    #[tokio::test]
    async fn test_restored_fires_on_reconnect_only() {
        let flag = ConnectivityFlag::new(false);
        flag.observe(true);
        tokio::time::timeout(std::time::Duration::from_secs(1), flag.restored())
            .await
            .expect("reconnect should be signaled");

        // online -> online and online -> offline do not signal
        flag.observe(true);
        flag.observe(false);
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(50), flag.restored()).await;
        assert!(waited.is_err());
    }
}
