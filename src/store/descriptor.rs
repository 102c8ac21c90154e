//! Store descriptor
//!
//! Everything needed to open a store: where it lives and which optional
//! machinery (history tracking, remote-writer polling) the session wants.

use std::path::{Path, PathBuf};

/// Open options for one store directory.
#[derive(Debug, Clone)]
pub struct StoreDescriptor {
    /// Directory holding the store's files.
    pub location: PathBuf,
    /// Whether commits append to the history log. Without it this session
    /// still reads and writes records, but merge cycles see the history as
    /// unavailable.
    pub history_tracking: bool,
    /// Whether to run the fallback poller that detects writers in other
    /// processes.
    pub remote_change_notify: bool,
}

impl StoreDescriptor {
    /// Descriptor with both history tracking and remote-change polling on,
    /// which is what a syncing session wants.
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            history_tracking: true,
            remote_change_notify: true,
        }
    }

    /// Disables history tracking for this session.
    pub fn without_history_tracking(mut self) -> Self {
        self.history_tracking = false;
        self
    }

    /// Disables the remote-writer fallback poller.
    pub fn without_remote_change_notify(mut self) -> Self {
        self.remote_change_notify = false;
        self
    }

    /// Path of the store meta file.
    pub fn meta_path(&self) -> PathBuf {
        self.location.join("meta.json")
    }

    /// Path of the committed-records file.
    pub fn records_path(&self) -> PathBuf {
        self.location.join("records.db")
    }

    /// Path of the history log.
    pub fn history_log_path(&self) -> PathBuf {
        self.location.join("history.log")
    }

    /// Store directory.
    pub fn location(&self) -> &Path {
        &self.location
    }
}
