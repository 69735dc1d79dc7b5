//! `SQLite` schema definitions for the local store.
//!
//! The metadata table is created unconditionally on every open. The
//! `pending_records` object store is provisioned by migrations, so it only
//! appears when the database is first created or its version increases.

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// SQL statement to create the pending records object store.
///
/// `AUTOINCREMENT` keeps keys monotonic for the lifetime of the database,
/// including after the table has been emptied.
pub const CREATE_PENDING_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS pending_records (
    key INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    queued_at TEXT NOT NULL
)
";

/// Statements run on every open, before migrations.
pub const BASE_STATEMENTS: &[&str] = &[CREATE_METADATA_TABLE];
