//! Write interceptor.
//!
//! Wraps the "create record" call. Only an unreachable server sends a write
//! to the local store; a server that answers, even with an error, is the
//! caller's business.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::notify::{Notice, Notifier};
use crate::record::PendingRecord;
use crate::remote::RemoteApi;
use crate::store::LocalStore;

/// Result of an intercepted write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The server accepted the write directly.
    Delivered(Value),
    /// The server was unreachable and the write was saved locally.
    Buffered {
        /// Store key of the saved record.
        key: i64,
    },
    /// The server was unreachable and the write could not be saved either.
    Unsaved {
        /// Why the local save failed.
        reason: String,
    },
}

/// Sends writes to the remote API, buffering them locally when the server
/// cannot be reached.
#[derive(Debug, Clone)]
pub struct WriteInterceptor {
    store: LocalStore,
    remote: Arc<dyn RemoteApi>,
    notifier: Arc<dyn Notifier>,
}

impl WriteInterceptor {
    /// Create an interceptor.
    #[must_use]
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteApi>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            remote,
            notifier,
        }
    }

    /// Create a record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Remote`] when the server was reached but did
    /// not accept the write. Local store failures never surface here; they
    /// are logged and reported as [`WriteOutcome::Unsaved`].
    pub async fn create(&self, record: PendingRecord) -> Result<WriteOutcome> {
        let err = match self.remote.create(&record).await {
            Ok(response) => {
                debug!("Record created");
                return Ok(WriteOutcome::Delivered(response));
            }
            Err(e) if e.is_unreachable() => e,
            Err(e) => return Err(e.into()),
        };

        info!(error = %err, "Server unreachable, saving record locally");
        match self.store.put(record).await {
            Ok(key) => {
                self.notifier.notify(Notice::SavedLocally { key });
                Ok(WriteOutcome::Buffered { key })
            }
            Err(e) => {
                error!(error = %e, "Could not save record locally");
                Ok(WriteOutcome::Unsaved {
                    reason: e.to_string(),
                })
            }
        }
    }
}
