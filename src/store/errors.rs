//! # Store Errors
//!
//! Error types for the store handle and writer sessions.

use thiserror::Error;

use crate::history::HistoryError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    // ==================
    // Open / Rebuild Errors
    // ==================
    /// On-disk schema version this build cannot read
    #[error("store schema version {found} is not supported (expected {expected})")]
    IncompatibleSchema {
        /// Version found in the meta file
        found: u32,
        /// Version this build writes
        expected: u32,
    },

    /// Meta file exists but cannot be decoded
    #[error("store meta file is corrupt: {0}")]
    CorruptMeta(String),

    /// Rebuild failed after an incompatible or corrupt store; no fallback remains
    #[error("store is unrecoverable: {0}")]
    Fatal(String),

    // ==================
    // Runtime Errors
    // ==================
    /// Operation attempted on a store that is not open
    #[error("store is not open")]
    Closed,

    /// Commit attempted with nothing staged
    #[error("transaction has no staged changes")]
    EmptyTransaction,

    /// Committed-records file failed validation
    #[error("records file is corrupt at byte {offset}: {reason}")]
    CorruptRecords {
        /// Byte offset of the bad frame
        offset: u64,
        /// What failed to validate
        reason: String,
    },

    // ==================
    // Propagated Errors
    // ==================
    /// Underlying filesystem failure, propagated for the caller's retry policy
    #[error("store io failure: {0}")]
    Io(#[from] std::io::Error),

    /// History log failure on the commit path
    #[error("history log failure: {0}")]
    History(#[from] HistoryError),
}

impl StoreError {
    /// Whether `open` should respond with a one-time destructive rebuild.
    pub fn requires_rebuild(&self) -> bool {
        matches!(
            self,
            StoreError::IncompatibleSchema { .. } | StoreError::CorruptMeta(_)
        )
    }

    /// Whether the store is beyond recovery for this process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Fatal(_))
    }
}
