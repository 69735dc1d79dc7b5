//! Connectivity monitoring.
//!
//! The host environment owns a [`ConnectivitySignal`] and reports what it
//! knows about network reachability. The buffer only observes it through a
//! [`ConnectivityMonitor`]: a synchronous [`is_online`](ConnectivityMonitor::is_online)
//! check and a stream of "became online" events. Nothing here polls.

use tokio::sync::watch;
use tracing::{info, warn};

/// Network reachability as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    /// The remote API is reachable.
    Online,
    /// The remote API is not reachable.
    Offline,
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
    state: ConnectivityState,
    /// Incremented on every offline -> online transition.
    online_epoch: u64,
}

/// Host-side connectivity signal.
///
/// Cloning yields another handle to the same signal.
#[derive(Debug, Clone)]
pub struct ConnectivitySignal {
    tx: std::sync::Arc<watch::Sender<Snapshot>>,
}

impl ConnectivitySignal {
    /// Create a signal with an initial state.
    #[must_use]
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _rx) = watch::channel(Snapshot {
            state: initial,
            online_epoch: 0,
        });
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    /// Report the current state.
    ///
    /// Subscribers are only woken when the state actually changes. Returns
    /// `true` if this call changed the state.
    pub fn set(&self, state: ConnectivityState) -> bool {
        let changed = self.tx.send_if_modified(|snapshot| {
            if snapshot.state == state {
                return false;
            }
            snapshot.state = state;
            if state == ConnectivityState::Online {
                snapshot.online_epoch += 1;
            }
            true
        });

        if changed {
            match state {
                ConnectivityState::Online => info!("Network: online"),
                ConnectivityState::Offline => warn!("Network: offline"),
            }
        }
        changed
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> ConnectivityState {
        self.tx.borrow().state
    }

    /// Create a monitor observing this signal.
    #[must_use]
    pub fn monitor(&self) -> ConnectivityMonitor {
        ConnectivityMonitor {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only view of a [`ConnectivitySignal`].
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    rx: watch::Receiver<Snapshot>,
}

impl ConnectivityMonitor {
    /// Check whether the host currently reports the network as reachable.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.rx.borrow().state == ConnectivityState::Online
    }

    /// Subscribe to "became online" events.
    ///
    /// Only transitions that happen after this call are reported.
    #[must_use]
    pub fn subscribe(&self) -> OnlineEvents {
        let rx = self.rx.clone();
        let seen_epoch = rx.borrow().online_epoch;
        OnlineEvents { rx, seen_epoch }
    }
}

/// Stream of "became online" events.
///
/// Several transitions that happen before the consumer gets around to
/// waiting again are reported as one event.
#[derive(Debug)]
pub struct OnlineEvents {
    rx: watch::Receiver<Snapshot>,
    seen_epoch: u64,
}

impl OnlineEvents {
    /// Wait for the next offline -> online transition.
    ///
    /// Returns `None` once the signal has been dropped. Cancel safe.
    pub async fn became_online(&mut self) -> Option<()> {
        loop {
            let epoch = self.rx.borrow_and_update().online_epoch;
            if epoch > self.seen_epoch {
                self.seen_epoch = epoch;
                return Some(());
            }
            self.rx.changed().await.ok()?;
        }
    }
}
