//! Lazily opened, shareable handle to the local store.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{Error, Result};
use crate::record::{PendingRecord, StoredRecord};

use super::{Database, StoreStats};

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

/// Async handle to the local durable store.
///
/// A handle starts out unopened. [`open`](Self::open) provisions the
/// database once; every clone shares the same connection. Operations issued
/// before `open` has completed fail with [`Error::StoreNotOpen`].
#[derive(Debug, Clone)]
pub struct LocalStore {
    location: Location,
    max_pending: usize,
    db: Arc<OnceCell<Arc<Mutex<Database>>>>,
}

impl LocalStore {
    /// Create an unopened handle for the database at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, max_pending: usize) -> Self {
        Self {
            location: Location::File(path.into()),
            max_pending,
            db: Arc::new(OnceCell::new()),
        }
    }

    /// Create an unopened handle for an in-memory database.
    #[must_use]
    pub fn in_memory(max_pending: usize) -> Self {
        Self {
            location: Location::Memory,
            max_pending,
            db: Arc::new(OnceCell::new()),
        }
    }

    /// Open the store, creating and upgrading it as needed.
    ///
    /// Calling this again after a successful open is a no-op. A failed open
    /// leaves the handle unopened so it can be retried.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or provisioned.
    pub async fn open(&self) -> Result<()> {
        self.db
            .get_or_try_init(|| async {
                let location = self.location.clone();
                let max_pending = self.max_pending;
                let db = tokio::task::spawn_blocking(move || match location {
                    Location::File(path) => Database::open(path, max_pending),
                    Location::Memory => Database::open_in_memory(max_pending),
                })
                .await??;
                debug!("Local store handle ready");
                Ok::<_, Error>(Arc::new(Mutex::new(db)))
            })
            .await?;
        Ok(())
    }

    /// Check whether [`open`](Self::open) has completed successfully.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.db.initialized()
    }

    /// Get the database path, or `None` for an in-memory store.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match &self.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    /// Append a record under a freshly assigned key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreNotOpen`] before the store is opened,
    /// [`Error::QuotaExceeded`] when the store is full, or another error if
    /// the database operation fails.
    pub async fn put(&self, record: PendingRecord) -> Result<i64> {
        self.with_db(move |db| db.put(&record)).await
    }

    /// Get every pending record, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreNotOpen`] before the store is opened, or an
    /// error if the database operation fails.
    pub async fn get_all(&self) -> Result<Vec<PendingRecord>> {
        self.with_db(Database::get_all).await
    }

    /// Get every pending record with its key and queue time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreNotOpen`] before the store is opened, or an
    /// error if the database operation fails.
    pub async fn entries(&self) -> Result<Vec<StoredRecord>> {
        self.with_db(Database::entries).await
    }

    /// Remove every pending record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreNotOpen`] before the store is opened, or an
    /// error if the database operation fails.
    pub async fn clear(&self) -> Result<usize> {
        self.with_db(Database::clear).await
    }

    /// Remove every pending record whose key is at most `last_key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreNotOpen`] before the store is opened, or an
    /// error if the database operation fails.
    pub async fn clear_through(&self, last_key: i64) -> Result<usize> {
        self.with_db(move |db| db.clear_through(last_key)).await
    }

    /// Count pending records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreNotOpen`] before the store is opened, or an
    /// error if the database operation fails.
    pub async fn count(&self) -> Result<i64> {
        self.with_db(Database::count).await
    }

    /// Get store statistics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreNotOpen`] before the store is opened, or an
    /// error if the database operation fails.
    pub async fn stats(&self) -> Result<StoreStats> {
        self.with_db(Database::stats).await
    }

    async fn with_db<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.get().cloned().ok_or(Error::StoreNotOpen)?;
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| Error::StorePoisoned)?;
            op(&guard)
        })
        .await?
    }
}
