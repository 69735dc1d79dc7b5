//! Wiring for the whole buffer.
//!
//! [`WriteBuffer`] owns one store handle and hands the same handle, remote
//! client and notifier to the interceptor and the agent.

use std::sync::Arc;

use tracing::{error, info};

use crate::agent::SyncAgent;
use crate::config::Config;
use crate::error::Result;
use crate::interceptor::WriteInterceptor;
use crate::notify::Notifier;
use crate::remote::{HttpRemote, RemoteApi};
use crate::store::LocalStore;

/// The assembled offline write buffer.
#[derive(Debug, Clone)]
pub struct WriteBuffer {
    store: LocalStore,
    remote: Arc<dyn RemoteApi>,
    interceptor: WriteInterceptor,
    agent: SyncAgent,
}

impl WriteBuffer {
    /// Assemble a buffer from its parts. The store is not opened yet.
    #[must_use]
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteApi>, notifier: Arc<dyn Notifier>) -> Self {
        let interceptor = WriteInterceptor::new(store.clone(), remote.clone(), notifier.clone());
        let agent = SyncAgent::new(store.clone(), remote.clone(), notifier);
        Self {
            store,
            remote,
            interceptor,
            agent,
        }
    }

    /// Assemble a buffer talking HTTP to the configured server.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured endpoint is invalid.
    pub fn from_config(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let remote = HttpRemote::from_config(&config.remote)?;
        let store = LocalStore::new(config.database_path(), config.store.max_pending);
        Ok(Self::new(store, Arc::new(remote), notifier))
    }

    /// Open the local store.
    ///
    /// A failure only disables buffering: direct writes keep working, and
    /// writes made while unreachable are reported as unsaved. Returns
    /// whether buffering is available.
    pub async fn open(&self) -> bool {
        match self.store.open().await {
            Ok(()) => {
                info!(path = ?self.store.path(), "Local store ready");
                true
            }
            Err(e) => {
                error!(error = %e, "Could not open local store, offline buffering disabled");
                false
            }
        }
    }

    /// The shared store handle.
    #[must_use]
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// The remote API client.
    #[must_use]
    pub fn remote(&self) -> &Arc<dyn RemoteApi> {
        &self.remote
    }

    /// The write interceptor.
    #[must_use]
    pub fn interceptor(&self) -> &WriteInterceptor {
        &self.interceptor
    }

    /// The sync agent.
    #[must_use]
    pub fn agent(&self) -> &SyncAgent {
        &self.agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::FlushOutcome;
    use crate::interceptor::WriteOutcome;
    use crate::notify::{Notice, RecordingNotifier};
    use crate::test_utils::{record, FakeRemote, Reply};

    #[tokio::test]
    async fn test_buffered_write_is_flushed_later() {
        crate::logging::init_test_logging();
        let remote = Arc::new(FakeRemote::new(Reply::Unreachable));
        let notifier = Arc::new(RecordingNotifier::new());
        let buffer = WriteBuffer::new(LocalStore::in_memory(0), remote.clone(), notifier.clone());
        assert!(buffer.open().await);

        let outcome = buffer.interceptor().create(record("A")).await.unwrap();
        assert!(matches!(outcome, WriteOutcome::Buffered { .. }));

        remote.set_reply(Reply::Accept);
        assert_eq!(
            buffer.agent().flush().await,
            FlushOutcome::Delivered { count: 1 }
        );
        assert_eq!(remote.batches(), vec![vec![record("A")]]);
        assert_eq!(notifier.notices().len(), 2);
        assert!(matches!(notifier.notices()[1], Notice::SyncCompleted { count: 1 }));
    }

    #[tokio::test]
    async fn test_open_failure_disables_buffering_only() {
        crate::logging::init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let remote = Arc::new(FakeRemote::new(Reply::Accept));
        let buffer = WriteBuffer::new(
            LocalStore::new(blocker.join("pizza_hunt.db"), 0),
            remote.clone(),
            Arc::new(RecordingNotifier::new()),
        );
        assert!(!buffer.open().await);

        let outcome = buffer.interceptor().create(record("A")).await.unwrap();
        assert!(matches!(outcome, WriteOutcome::Delivered(_)));

        remote.set_reply(Reply::Unreachable);
        let outcome = buffer.interceptor().create(record("B")).await.unwrap();
        assert!(matches!(outcome, WriteOutcome::Unsaved { .. }));
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.store.database_path = Some("/tmp/writebuffer-test/pizza_hunt.db".into());

        let buffer =
            WriteBuffer::from_config(&config, Arc::new(RecordingNotifier::new())).unwrap();
        assert_eq!(buffer.remote().endpoint(), "http://localhost:3001/api/pizzas");
        assert!(!buffer.store().is_open());
    }
}
