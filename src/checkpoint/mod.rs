//! Durable replay checkpoint
//!
//! A per-store slot file remembers the newest sequence token whose effects
//! the read projection has durably absorbed. Merge cycles replay only what
//! lies after it; losing the slot costs a full replay of the retained log,
//! never correctness. The slot is bound to a store generation by id so a
//! rebuilt store never trusts a stale token.

mod errors;
mod slot;

pub use errors::{CheckpointError, CheckpointErrorCode, CheckpointResult};
pub use slot::{slot_path, CheckpointSlot, SLOT_FORMAT_VERSION};
