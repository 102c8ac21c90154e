//! Persistent history log subsystem
//!
//! The history log is the ordering authority of the store. Every committed
//! transaction is appended here durably, with a sequence token that is
//! totally ordered and monotonically increasing across the store's lifetime,
//! independent of which writer session produced it.
//!
//! # Design Principles
//!
//! - Append-only, single file, fsync before acknowledgment
//! - Checksums on every record, validated on every read
//! - Strictly ascending tokens within the retained file
//! - Pruning removes a consumed prefix only, never required for correctness
//!
//! The read side never repairs: a log that fails validation is reported as
//! unavailable and the merge cycle becomes a no-op until the store state
//! improves (typically via rebuild).

mod errors;
mod log;
mod reader;
mod record;

pub use errors::{HistoryError, HistoryErrorCode, HistoryResult, Severity};
pub use log::HistoryLog;
pub use reader::HistoryLogReader;
pub use record::{RecordId, SequenceToken, Transaction};
