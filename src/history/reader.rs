//! History log reader
//!
//! Scans the framed binary log sequentially, validating checksums and the
//! ascending-token invariant. An incomplete final frame is a crash artifact
//! of a torn append and is ignored; anything else that fails validation is
//! corruption, reported with its byte offset.

use std::path::{Path, PathBuf};

use crate::history::errors::{HistoryError, HistoryResult};
use crate::history::record::{SequenceToken, Transaction, MIN_RECORD_SIZE};

/// Result of one full scan of a log file.
pub(crate) struct LogScan {
    /// Every valid transaction, in ascending token order.
    pub transactions: Vec<Transaction>,
    /// Byte length of the valid prefix (excludes a torn final frame).
    pub valid_len: u64,
    /// Total byte length of the file on disk.
    pub file_len: u64,
}

impl LogScan {
    fn empty() -> Self {
        Self {
            transactions: Vec::new(),
            valid_len: 0,
            file_len: 0,
        }
    }
}

/// Scans the log at `path`, tolerating a torn final frame.
///
/// A missing file is an empty log: stores may never have committed, and
/// pruning may have removed everything.
pub(crate) fn scan_log(path: &Path) -> HistoryResult<LogScan> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LogScan::empty()),
        Err(e) => {
            return Err(HistoryError::unavailable(format!(
                "cannot read history log at {}: {}",
                path.display(),
                e
            )))
        }
    };

    let file_len = data.len() as u64;
    let mut transactions = Vec::new();
    let mut offset: usize = 0;
    let mut last_token: Option<SequenceToken> = None;

    while offset < data.len() {
        let remaining = data.len() - offset;
        if remaining < 4 {
            // Not even a length prefix: a torn append, ignore it
            break;
        }

        let declared = u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;

        if (declared as u64) < MIN_RECORD_SIZE {
            return Err(HistoryError::corruption_at_offset(
                offset as u64,
                format!("impossible record length {}", declared),
            ));
        }
        if declared > remaining {
            // Length prefix survived but the body did not: torn append
            break;
        }

        let (txn, consumed) = Transaction::deserialize(&data[offset..offset + declared])
            .map_err(|e| HistoryError::corruption_at_offset(offset as u64, e.to_string()))?;

        if let Some(prev) = last_token {
            if txn.token <= prev {
                return Err(HistoryError::corruption_at_token(
                    txn.token.value(),
                    format!("token order violated, previous was {}", prev),
                ));
            }
        }
        last_token = Some(txn.token);
        transactions.push(txn);
        offset += consumed;
    }

    Ok(LogScan {
        transactions,
        valid_len: offset as u64,
        file_len,
    })
}

/// Read-only view of a store's history log.
///
/// Cheap to construct and to clone; every read re-scans the file so that
/// appends from other writer sessions are always visible.
#[derive(Clone)]
pub struct HistoryLogReader {
    path: PathBuf,
    enabled: bool,
}

impl HistoryLogReader {
    /// Creates a reader over the log at `path`. When `enabled` is false the
    /// owning store was opened without history tracking and every read
    /// reports the log as unavailable.
    pub fn new(path: PathBuf, enabled: bool) -> Self {
        Self { path, enabled }
    }

    /// Whether the owning store tracks history at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns every retained transaction with token strictly greater than
    /// `after`, in ascending token order. `None` returns the whole retained
    /// log, which after pruning may start at any token.
    pub fn transactions_after(
        &self,
        after: Option<SequenceToken>,
    ) -> HistoryResult<Vec<Transaction>> {
        if !self.enabled {
            return Err(HistoryError::tracking_disabled());
        }

        let mut transactions = scan_log(&self.path)?.transactions;
        if let Some(after) = after {
            transactions.retain(|txn| txn.token > after);
        }
        Ok(transactions)
    }

    /// Token of the newest retained transaction, if any.
    pub fn latest_token(&self) -> HistoryResult<Option<SequenceToken>> {
        if !self.enabled {
            return Err(HistoryError::tracking_disabled());
        }
        Ok(scan_log(&self.path)?.transactions.last().map(|txn| txn.token))
    }
}
