//! Merge cycle errors
//!
//! Every variant aborts the cycle that raised it with the checkpoint
//! untouched, so the aborted range replays in full on the next trigger. The
//! run loop logs these and keeps going; only `drain` callers see them.

use thiserror::Error;

use crate::history::HistoryError;
use crate::projection::ProjectionError;
use crate::store::StoreError;

/// Result type for merge operations
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors that abort one merge cycle.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Reading the history log failed
    #[error("History read failed: {0}")]
    History(#[from] HistoryError),

    /// Refetching or applying to the view failed
    #[error("Projection failed: {0}")]
    Projection(#[from] ProjectionError),

    /// Store access failed
    #[error("Store access failed: {0}")]
    Store(#[from] StoreError),
}
