//! Observable events in the synchronization engine
//!
//! Events are explicit and typed. Every log line names exactly one of these,
//! so the full observable vocabulary of the engine is enumerable here.

use std::fmt;

/// Observable events emitted by mirrordb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Store lifecycle
    /// Store directory opened and validated
    StoreOpen,
    /// Store closed
    StoreClose,
    /// Incompatible schema detected, destructive rebuild starting
    StoreRebuildStart,
    /// Destructive rebuild finished, store reopened empty
    StoreRebuildComplete,

    // Writer path
    /// A writer session committed a transaction
    TransactionCommit,

    // Merge cycle
    /// A merge cycle applied one or more transactions
    MergeCycleComplete,
    /// A merge cycle found nothing newer than the checkpoint
    MergeCycleNoop,
    /// A merge cycle aborted; checkpoint untouched, range retried later
    MergeCycleAborted,
    /// History log unavailable (tracking disabled or corrupted); cycle no-op
    HistoryUnavailable,

    // Checkpoint slot
    /// Checkpoint token persisted
    CheckpointPersist,
    /// Checkpoint persist failed; in-memory token stays authoritative
    CheckpointPersistFailed,
    /// Checkpoint slot unreadable or foreign; treated as absent
    CheckpointDiscarded,

    // Log maintenance
    /// Consumed log entries pruned
    HistoryPruned,
    /// Prune attempt failed (best-effort, ignored)
    HistoryPruneFailed,

    // Change notification
    /// Fallback poller observed log growth without an explicit signal
    FallbackPollTriggered,
}

impl Event {
    /// Returns the stable event name used in log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StoreOpen => "STORE_OPEN",
            Event::StoreClose => "STORE_CLOSE",
            Event::StoreRebuildStart => "STORE_REBUILD_START",
            Event::StoreRebuildComplete => "STORE_REBUILD_COMPLETE",
            Event::TransactionCommit => "TRANSACTION_COMMIT",
            Event::MergeCycleComplete => "MERGE_CYCLE_COMPLETE",
            Event::MergeCycleNoop => "MERGE_CYCLE_NOOP",
            Event::MergeCycleAborted => "MERGE_CYCLE_ABORTED",
            Event::HistoryUnavailable => "HISTORY_UNAVAILABLE",
            Event::CheckpointPersist => "CHECKPOINT_PERSIST",
            Event::CheckpointPersistFailed => "CHECKPOINT_PERSIST_FAILED",
            Event::CheckpointDiscarded => "CHECKPOINT_DISCARDED",
            Event::HistoryPruned => "HISTORY_PRUNED",
            Event::HistoryPruneFailed => "HISTORY_PRUNE_FAILED",
            Event::FallbackPollTriggered => "FALLBACK_POLL_TRIGGERED",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
