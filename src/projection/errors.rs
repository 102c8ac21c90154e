//! Projection error types
//!
//! A projection failure aborts the merge cycle that caused it; the
//! checkpoint stays where it was and the same range replays on the next
//! trigger.

use thiserror::Error;

use crate::store::StoreError;

/// Result type for projection operations
pub type ProjectionResult<T> = Result<T, ProjectionError>;

/// Projection errors
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The view task exited; every handle operation will fail from now on
    #[error("View task closed")]
    ViewClosed,

    /// Refetching a record's current value failed
    #[error("Refetch failed: {0}")]
    Store(#[from] StoreError),
}
