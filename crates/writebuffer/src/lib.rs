//! `writebuffer` - An offline write buffer for a JSON REST API
//!
//! Writes that cannot reach the server are kept in a local SQLite store and
//! delivered as one batch once connectivity returns. Writes the server
//! answers, successfully or not, are never buffered.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod agent;
pub mod buffer;
pub mod cli;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod interceptor;
pub mod logging;
pub mod notify;
pub mod reachability;
pub mod record;
pub mod remote;
pub mod store;

#[cfg(test)]
pub(crate) mod test_utils;

pub use agent::{AgentHandle, AgentState, FlushOutcome, SyncAgent};
pub use buffer::WriteBuffer;
pub use config::Config;
pub use connectivity::{ConnectivityMonitor, ConnectivitySignal, ConnectivityState};
pub use error::{Error, Result};
pub use interceptor::{WriteInterceptor, WriteOutcome};
pub use logging::init_logging;
pub use notify::{ConsoleNotifier, Notice, Notifier, RecordingNotifier};
pub use record::{PendingRecord, StoredRecord};
pub use remote::{HttpRemote, RemoteApi, RemoteError};
pub use store::{LocalStore, StoreStats};
