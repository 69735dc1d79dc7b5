//! Record types for writebuffer.
//!
//! A [`PendingRecord`] is the opaque payload of one deferred write. The
//! buffer never looks inside it; it is stored and sent back out exactly as
//! the application handed it over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One deferred write, as an opaque JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingRecord(Value);

impl PendingRecord {
    /// Wrap a JSON value as a pending record.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse a pending record from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text).map(Self)
    }

    /// Serialize the record to compact JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }

    /// Borrow the underlying JSON value.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Unwrap into the underlying JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for PendingRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// A pending record together with its local bookkeeping.
///
/// The key and timestamp belong to the local store only and are never sent
/// to the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Local auto-assigned key, increasing in insertion order.
    pub key: i64,

    /// When the record was buffered.
    pub queued_at: DateTime<Utc>,

    /// The buffered payload.
    pub record: PendingRecord,
}
