//! Sync agent.
//!
//! Delivers everything in the local store to the remote API as one batch,
//! and removes it only once the server has accepted it. A flush runs when
//! the agent starts while online and whenever the network comes back.
//!
//! At most one flush is in flight per agent. A trigger that arrives while a
//! flush is running is dropped: the running flush already carries every
//! record it could have seen, and later records are picked up by the next
//! trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::notify::{Notice, Notifier};
use crate::record::PendingRecord;
use crate::remote::RemoteApi;
use crate::store::LocalStore;

/// What the agent is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Waiting for a trigger.
    Idle,
    /// A flush is in flight.
    Flushing,
}

/// Result of one flush attempt.
///
/// Failures are reported here rather than as errors; the records stay in
/// the store either way and are retried on the next trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Another flush was already running, so nothing was done.
    AlreadyFlushing,
    /// The store was empty and no request was made.
    Empty,
    /// The records were delivered and removed from the store.
    Delivered {
        /// Number of records delivered.
        count: usize,
    },
    /// The server did not accept the batch. Nothing was removed.
    Failed {
        /// Number of records in the batch.
        count: usize,
        /// Why delivery failed.
        reason: String,
    },
    /// The store could not be read. Nothing was sent.
    StoreUnavailable {
        /// Why the store could not be read.
        reason: String,
    },
}

/// Flushes the local store to the remote API.
#[derive(Debug, Clone)]
pub struct SyncAgent {
    store: LocalStore,
    remote: Arc<dyn RemoteApi>,
    notifier: Arc<dyn Notifier>,
    flushing: Arc<AtomicBool>,
}

impl SyncAgent {
    /// Create an agent. Clones share the one-flush-at-a-time guard.
    #[must_use]
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteApi>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            remote,
            notifier,
            flushing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> AgentState {
        if self.flushing.load(Ordering::Acquire) {
            AgentState::Flushing
        } else {
            AgentState::Idle
        }
    }

    /// Run one flush cycle.
    ///
    /// Reads every pending record, sends them as one batch, and removes
    /// exactly the records that were sent once the server accepts them.
    /// Records added while the request is in flight are kept for the next
    /// cycle. There is no timeout: a hung request holds the agent in
    /// [`AgentState::Flushing`] until it resolves.
    pub async fn flush(&self) -> FlushOutcome {
        let Some(_guard) = FlushGuard::acquire(&self.flushing) else {
            debug!("Flush already in progress, ignoring trigger");
            return FlushOutcome::AlreadyFlushing;
        };

        let entries = match self.store.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Could not read pending records");
                return FlushOutcome::StoreUnavailable {
                    reason: e.to_string(),
                };
            }
        };

        let Some(last_key) = entries.last().map(|entry| entry.key) else {
            debug!("No pending records");
            return FlushOutcome::Empty;
        };

        let records: Vec<PendingRecord> = entries.into_iter().map(|entry| entry.record).collect();
        let count = records.len();
        info!(count, endpoint = %self.remote.endpoint(), "Submitting pending records");

        if let Err(e) = self.remote.submit_batch(&records).await {
            warn!(count, error = %e, "Sync failed, records kept for retry");
            return FlushOutcome::Failed {
                count,
                reason: e.to_string(),
            };
        }

        match self.store.clear_through(last_key).await {
            Ok(removed) => debug!(removed, "Cleared delivered records"),
            // Delivered but still stored: the next cycle sends them again.
            Err(e) => error!(count, error = %e, "Could not clear delivered records"),
        }

        info!(count, "Pending records submitted");
        self.notifier.notify(Notice::SyncCompleted { count });
        FlushOutcome::Delivered { count }
    }

    /// Start reacting to connectivity.
    ///
    /// Subscribes to "became online" events, flushes once straight away if
    /// the monitor reports online, then flushes on every transition until
    /// the returned handle is shut down or dropped, or the signal goes
    /// away.
    #[must_use]
    pub fn start(&self, monitor: &ConnectivityMonitor) -> AgentHandle {
        // Subscribe first so a transition during the initial flush is not lost
        let mut events = monitor.subscribe();
        let online_at_start = monitor.is_online();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let agent = self.clone();

        let task = tokio::spawn(async move {
            if online_at_start {
                agent.flush().await;
            }
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    event = events.became_online() => {
                        if event.is_none() {
                            debug!("Connectivity signal closed");
                            break;
                        }
                        agent.flush().await;
                    }
                }
            }
            debug!("Sync agent stopped");
        });

        AgentHandle {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Handle to a started [`SyncAgent`].
///
/// Dropping the handle stops the agent after any flush in flight finishes.
#[derive(Debug)]
pub struct AgentHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl AgentHandle {
    /// Stop listening for connectivity events and wait for the agent task.
    ///
    /// A flush that is already running completes first.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Sync agent task failed");
            }
        }
    }

    /// Check whether the agent task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

struct FlushGuard<'a>(&'a AtomicBool);

impl<'a> FlushGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
