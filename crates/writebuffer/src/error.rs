//! Error types for writebuffer.
//!
//! This module defines the crate-level error type. Remote API outcomes are
//! classified separately by [`RemoteError`](crate::remote::RemoteError) and
//! converted into [`Error::Remote`] where they cross a module boundary.

use std::path::PathBuf;
use thiserror::Error;

use crate::remote::RemoteError;

/// The main error type for writebuffer operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Store Errors ===
    /// Failed to open or create the local database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// An operation was attempted before the store finished opening.
    #[error("local store is not open")]
    StoreNotOpen,

    /// The store refused a new record because it is full.
    #[error("local store quota exceeded: {message}")]
    QuotaExceeded {
        /// Description of the limit that was hit.
        message: String,
    },

    /// The store connection lock was poisoned by a panicking task.
    #[error("local store lock poisoned")]
    StorePoisoned,

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Remote Errors ===
    /// The remote API call failed.
    #[error("remote API error: {0}")]
    Remote(#[from] RemoteError),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for writebuffer operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking store task failed: {err}"))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a quota exceeded error.
    #[must_use]
    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::QuotaExceeded {
            message: message.into(),
        }
    }

    /// Check if this error means the store ran out of room.
    #[must_use]
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    /// Check if this error means the store was used before it was opened.
    #[must_use]
    pub fn is_store_not_open(&self) -> bool {
        matches!(self, Self::StoreNotOpen)
    }

    /// Check if this error means the remote API could not be reached at all.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Remote(remote) if remote.is_unreachable())
    }
}
