//! History merge machinery
//!
//! Connects the pieces: wakes on change signals, reads the history log past
//! the checkpoint, folds transactions into a [`ChangeSet`], projects it
//! through refetch, then advances the checkpoint and prunes. Strictly
//! ascending application and the checkpoint-after-effects ordering both live
//! here; everything below this module is mechanism.

mod changeset;
mod coordinator;
mod errors;

pub use changeset::ChangeSet;
pub use coordinator::{CycleOutcome, CycleStats, DrainStats, MergeCoordinator};
pub use errors::{MergeError, MergeResult};
