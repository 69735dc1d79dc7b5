//! User-facing notices.
//!
//! The buffer tells the user when a write was saved locally instead of being
//! submitted, and when saved writes have been delivered. How those notices
//! are shown is up to the host.

use std::fmt;
use std::sync::Mutex;

/// A notice for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A write could not reach the server and was saved locally.
    SavedLocally {
        /// Store key of the saved record.
        key: i64,
    },
    /// Saved writes were delivered and removed from the local store.
    SyncCompleted {
        /// Number of records delivered.
        count: usize,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SavedLocally { .. } => write!(
                f,
                "Saved locally; it will be submitted when you are back online."
            ),
            Self::SyncCompleted { .. } => write!(f, "All saved records have been submitted!"),
        }
    }
}

/// Receives user-facing notices.
pub trait Notifier: Send + Sync + fmt::Debug {
    /// Show a notice to the user.
    fn notify(&self, notice: Notice);
}

/// Prints notices to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        println!("{notice}");
    }
}

/// Keeps every notice in memory, for hosts that render them later.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of every notice received so far.
    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|notices| notices.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_text() {
        assert_eq!(
            Notice::SavedLocally { key: 1 }.to_string(),
            "Saved locally; it will be submitted when you are back online."
        );
        assert_eq!(
            Notice::SyncCompleted { count: 3 }.to_string(),
            "All saved records have been submitted!"
        );
    }

    #[test]
    fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notice::SavedLocally { key: 1 });
        notifier.notify(Notice::SyncCompleted { count: 1 });

        assert_eq!(
            notifier.notices(),
            vec![
                Notice::SavedLocally { key: 1 },
                Notice::SyncCompleted { count: 1 }
            ]
        );
    }

    #[test]
    fn test_console_notifier_does_not_panic() {
        ConsoleNotifier.notify(Notice::SyncCompleted { count: 2 });
    }
}
