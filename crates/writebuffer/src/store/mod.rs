//! Local durable store for writebuffer.
//!
//! [`Database`] is the synchronous `SQLite` engine that holds pending
//! records. [`LocalStore`] wraps it in a lazily opened, cloneable handle
//! whose operations are `async` and run the blocking work off the caller's
//! executor thread.

mod handle;
pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::record::{PendingRecord, StoredRecord};

pub use handle::LocalStore;

/// Storage engine for pending records.
///
/// Records live in a single object store keyed by an auto-incrementing
/// integer. Keys follow insertion order and are never reused.
#[derive(Debug)]
pub struct Database {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
    /// Maximum number of pending records; 0 means unlimited.
    max_pending: usize,
}

impl Database {
    /// Open or create a database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist,
    /// then provisions or upgrades the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema
    /// initialization fails.
    pub fn open(path: impl AsRef<Path>, max_pending: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Local store opened at {}", path.display());
        Ok(Self {
            path,
            conn,
            max_pending,
        })
    }

    /// Create an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory(max_pending: usize) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
            max_pending,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record under a freshly assigned key.
    ///
    /// Returns the assigned key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QuotaExceeded`] if the configured limit is reached or
    /// the disk is full, or another error if the database operation fails.
    pub fn put(&self, record: &PendingRecord) -> Result<i64> {
        if self.max_pending > 0 {
            let pending = usize::try_from(self.count()?).unwrap_or(usize::MAX);
            if pending >= self.max_pending {
                return Err(Error::quota_exceeded(format!(
                    "{pending} records pending, limit is {}",
                    self.max_pending
                )));
            }
        }

        let payload = record.to_json()?;
        let queued_at = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO pending_records (payload, queued_at) VALUES (?1, ?2)",
                params![payload, queued_at],
            )
            .map_err(|err| {
                if err.sqlite_error_code() == Some(ErrorCode::DiskFull) {
                    Error::quota_exceeded(err.to_string())
                } else {
                    err.into()
                }
            })?;

        let key = self.conn.last_insert_rowid();
        debug!(key, "Buffered pending record");
        Ok(key)
    }

    /// Get every pending record, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_all(&self) -> Result<Vec<PendingRecord>> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|entry| entry.record)
            .collect())
    }

    /// Get every pending record with its key and queue time, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn entries(&self) -> Result<Vec<StoredRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, payload, queued_at FROM pending_records ORDER BY key ASC")?;

        let entries = stmt
            .query_map([], Self::row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Remove every pending record.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn clear(&self) -> Result<usize> {
        let affected = self.conn.execute("DELETE FROM pending_records", [])?;
        if affected > 0 {
            info!("Cleared {} pending records", affected);
        }
        Ok(affected)
    }

    /// Remove every pending record whose key is at most `last_key`.
    ///
    /// Records appended after a snapshot was taken keep their place.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn clear_through(&self, last_key: i64) -> Result<usize> {
        let affected = self
            .conn
            .execute("DELETE FROM pending_records WHERE key <= ?1", [last_key])?;
        if affected > 0 {
            info!("Cleared {} delivered records", affected);
        }
        Ok(affected)
    }

    /// Count pending records.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM pending_records", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get store statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StoreStats> {
        let pending_records = self.count()?;

        let oldest: Option<String> = self
            .conn
            .query_row(
                "SELECT queued_at FROM pending_records ORDER BY key ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let newest: Option<String> = self
            .conn
            .query_row(
                "SELECT queued_at FROM pending_records ORDER BY key DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StoreStats {
            pending_records,
            oldest_queued: oldest.as_deref().and_then(parse_timestamp),
            newest_queued: newest.as_deref().and_then(parse_timestamp),
            db_size_bytes,
        })
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<StoredRecord> {
        let key: i64 = row.get(0)?;
        let payload: String = row.get(1)?;
        let queued_at: String = row.get(2)?;

        let record = PendingRecord::from_json(&payload).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let queued_at = parse_timestamp(&queued_at).unwrap_or_else(|| {
            warn!(key, queued_at = %queued_at, "Unreadable queue time on pending record");
            DateTime::<Utc>::default()
        });

        Ok(StoredRecord {
            key,
            queued_at,
            record,
        })
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Statistics about the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Number of records waiting to be delivered.
    pub pending_records: i64,
    /// When the oldest pending record was buffered.
    pub oldest_queued: Option<DateTime<Utc>>,
    /// When the newest pending record was buffered.
    pub newest_queued: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
