//! Append-only history log writer
//!
//! One log file per store. Appends are acknowledged only after fsync, which
//! makes the log entry the commit point of a transaction: record payloads
//! are made durable first, then the log entry. A crash between the two
//! leaves orphaned payload versions that no logged transaction names, which
//! is benign.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::history::errors::{HistoryError, HistoryResult};
use crate::history::reader::scan_log;
use crate::history::record::{RecordId, SequenceToken, Transaction};

/// Appender for a store's history log.
///
/// Holds the log open in append mode. Tokens are assigned here, at append
/// time, strictly monotonically. Other sessions, including sessions in
/// other processes, may append to the same file; before assigning a token
/// this handle compares the on-disk length against the length it last saw
/// and rescans when they differ, so numbering stays ascending across
/// sessions as long as their commits do not overlap in time.
///
/// Pruning can leave nothing behind to scan. The counter never moves
/// backwards on a live handle, and callers that prune supply a floor to
/// freshly opened handles through [`HistoryLog::raise_token_floor`] so
/// numbering never restarts below a consumed token.
pub struct HistoryLog {
    path: PathBuf,
    file: File,
    known_len: u64,
    next_token: SequenceToken,
}

impl HistoryLog {
    /// Opens (creating if absent) the log at `path`.
    ///
    /// Scans existing content to determine the next token; a caller that
    /// prunes consumed entries raises it afterwards with
    /// [`HistoryLog::raise_token_floor`]. A torn final record from a
    /// crashed append is truncated away so later appends start on a clean
    /// frame boundary; mid-file corruption is an error.
    pub fn open(path: &Path) -> HistoryResult<Self> {
        let scan = scan_log(path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                HistoryError::append_failed(
                    format!("cannot open history log at {}", path.display()),
                    e,
                )
            })?;

        if scan.valid_len < scan.file_len {
            file.set_len(scan.valid_len).map_err(|e| {
                HistoryError::append_failed(
                    format!(
                        "cannot truncate torn history record at byte {}",
                        scan.valid_len
                    ),
                    e,
                )
            })?;
            file.sync_all()
                .map_err(|e| HistoryError::fsync_failed("fsync after torn-tail repair", e))?;
        }

        let next_token = scan
            .transactions
            .last()
            .map(|txn| txn.token.next())
            .unwrap_or_else(|| SequenceToken::new(1));

        Ok(Self {
            path: path.to_path_buf(),
            file,
            known_len: scan.valid_len,
            next_token,
        })
    }

    /// Absorbs appends other sessions made since this handle last looked.
    ///
    /// A changed file length means foreign commits landed (or a foreign
    /// prune replaced the file), so the append handle is reopened and the
    /// token counter raised from a fresh scan. A rescan that comes back
    /// lower than the cached counter means entries were pruned, never that
    /// a lower token became safe to assign, so the counter only moves
    /// forward. A torn final record is truncated the same way `open`
    /// truncates one.
    fn sync_with_disk(&mut self) -> HistoryResult<()> {
        let disk_len = std::fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| HistoryError::append_failed("cannot stat history log", e))?;
        if disk_len == self.known_len {
            return Ok(());
        }

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                HistoryError::append_failed("cannot reopen history log after foreign append", e)
            })?;

        let scan = scan_log(&self.path)?;
        if scan.valid_len < scan.file_len {
            self.file.set_len(scan.valid_len).map_err(|e| {
                HistoryError::append_failed(
                    format!(
                        "cannot truncate torn history record at byte {}",
                        scan.valid_len
                    ),
                    e,
                )
            })?;
            self.file
                .sync_all()
                .map_err(|e| HistoryError::fsync_failed("fsync after torn-tail repair", e))?;
        }

        self.known_len = scan.valid_len;
        let rescanned = scan
            .transactions
            .last()
            .map(|txn| txn.token.next())
            .unwrap_or_else(|| SequenceToken::new(1));
        self.next_token = self.next_token.max(rescanned);
        Ok(())
    }

    /// Appends one committed transaction and fsyncs before returning.
    ///
    /// The returned transaction carries the token assigned to this commit.
    pub fn append(
        &mut self,
        author: &str,
        affected: Vec<RecordId>,
    ) -> HistoryResult<Transaction> {
        use std::io::Write;

        let token = self.next_token()?;
        let txn = Transaction::new(token, Utc::now(), author, affected);
        let bytes = txn.serialize();

        self.file.write_all(&bytes).map_err(|e| {
            HistoryError::append_failed(
                format!("cannot append transaction {}", txn.token),
                e,
            )
        })?;
        self.file.sync_all().map_err(|e| {
            HistoryError::fsync_failed(format!("fsync of transaction {}", txn.token), e)
        })?;

        self.known_len += bytes.len() as u64;
        self.next_token = txn.token.next();
        Ok(txn)
    }

    /// Token the next append will receive, after absorbing any appends
    /// other sessions made in the meantime.
    pub fn next_token(&mut self) -> HistoryResult<SequenceToken> {
        self.sync_with_disk()?;
        Ok(self.next_token)
    }

    /// Raises the next token to at least `floor`. A floor at or below the
    /// current counter changes nothing.
    ///
    /// The log file alone cannot carry numbering across pruning: once the
    /// consumed prefix is dropped, a handle opened later has nothing left
    /// to scan. The store re-floors every fresh handle, and every commit,
    /// from the records file, which is never pruned.
    pub fn raise_token_floor(&mut self, floor: SequenceToken) {
        self.next_token = self.next_token.max(floor);
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drops every transaction with token `<= through` by rewriting the
    /// retained tail atomically (tmp file, fsync, rename, directory fsync).
    ///
    /// Returns the number of transactions dropped. Token assignment is
    /// unaffected: pruning removes old entries, it never resets numbering.
    pub fn prune_through(&mut self, through: SequenceToken) -> HistoryResult<u64> {
        use std::io::Write;

        let scan = scan_log(&self.path)?;
        if let Some(last) = scan.transactions.last() {
            self.next_token = self.next_token.max(last.token.next());
        }
        let (dropped, retained): (Vec<_>, Vec<_>) = scan
            .transactions
            .into_iter()
            .partition(|txn| txn.token <= through);
        if dropped.is_empty() {
            return Ok(0);
        }

        let tmp_path = self.path.with_extension("log.tmp");
        let mut retained_len = 0u64;
        {
            let mut tmp = File::create(&tmp_path).map_err(|e| {
                HistoryError::append_failed(
                    format!("cannot create prune buffer at {}", tmp_path.display()),
                    e,
                )
            })?;
            for txn in &retained {
                let bytes = txn.serialize();
                retained_len += bytes.len() as u64;
                tmp.write_all(&bytes).map_err(|e| {
                    HistoryError::append_failed(
                        format!("cannot rewrite retained transaction {}", txn.token),
                        e,
                    )
                })?;
            }
            tmp.sync_all()
                .map_err(|e| HistoryError::fsync_failed("fsync of pruned log", e))?;
        }

        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            HistoryError::append_failed("cannot replace history log with pruned copy", e)
        })?;
        if let Some(dir) = self.path.parent() {
            if let Ok(dir_handle) = File::open(dir) {
                let _ = dir_handle.sync_all();
            }
        }

        // The rename orphaned the old inode; reopen the append handle.
        self.file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                HistoryError::append_failed("cannot reopen history log after prune", e)
            })?;
        self.known_len = retained_len;

        Ok(dropped.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::reader::HistoryLogReader;
    use tempfile::TempDir;

    fn log_path(dir: &TempDir) -> PathBuf {
        dir.path().join("history.log")
    }

    #[test]
    fn test_tokens_start_at_one_and_ascend() {
        let dir = TempDir::new().unwrap();
        let mut log = HistoryLog::open(&log_path(&dir)).unwrap();

        let a = log.append("w1", vec![RecordId::new("x")]).unwrap();
        let b = log.append("w2", vec![RecordId::new("y")]).unwrap();

        assert_eq!(a.token, SequenceToken::new(1));
        assert_eq!(b.token, SequenceToken::new(2));
        assert_eq!(log.next_token().unwrap(), SequenceToken::new(3));
    }

    #[test]
    fn test_reopen_resumes_numbering() {
        let dir = TempDir::new().unwrap();
        let path = log_path(&dir);

        {
            let mut log = HistoryLog::open(&path).unwrap();
            log.append("w", vec![RecordId::new("a")]).unwrap();
            log.append("w", vec![RecordId::new("b")]).unwrap();
        }

        let mut log = HistoryLog::open(&path).unwrap();
        assert_eq!(log.next_token().unwrap(), SequenceToken::new(3));
    }

    #[test]
    fn test_second_session_resumes_numbering() {
        let dir = TempDir::new().unwrap();
        let path = log_path(&dir);

        // Both handles open while the log is empty, as two writer
        // processes sharing the directory would
        let mut first = HistoryLog::open(&path).unwrap();
        let mut second = HistoryLog::open(&path).unwrap();

        let a = first.append("first", vec![RecordId::new("x")]).unwrap();
        let b = second.append("second", vec![RecordId::new("x")]).unwrap();
        let c = first.append("first", vec![RecordId::new("y")]).unwrap();

        assert_eq!(a.token, SequenceToken::new(1));
        assert_eq!(b.token, SequenceToken::new(2));
        assert_eq!(c.token, SequenceToken::new(3));

        let reader = HistoryLogReader::new(path, true);
        let all = reader.transactions_after(None).unwrap();
        let tokens: Vec<u64> = all.iter().map(|t| t.token.value()).collect();
        assert_eq!(tokens, vec![1, 2, 3]);
    }

    #[test]
    fn test_foreign_prune_does_not_reset_live_numbering() {
        let dir = TempDir::new().unwrap();
        let path = log_path(&dir);
        let mut ours = HistoryLog::open(&path).unwrap();
        ours.append("w", vec![RecordId::new("a")]).unwrap();
        ours.append("w", vec![RecordId::new("b")]).unwrap();

        // Another session prunes everything we wrote
        let mut theirs = HistoryLog::open(&path).unwrap();
        theirs.prune_through(SequenceToken::new(2)).unwrap();

        // Our handle rescans the emptied file and keeps counting
        let c = ours.append("w", vec![RecordId::new("c")]).unwrap();
        assert_eq!(c.token, SequenceToken::new(3));

        let reader = HistoryLogReader::new(path, true);
        let tokens: Vec<u64> = reader
            .transactions_after(None)
            .unwrap()
            .iter()
            .map(|t| t.token.value())
            .collect();
        assert_eq!(tokens, vec![3]);
    }

    #[test]
    fn test_torn_tail_truncated_on_open() {
        let dir = TempDir::new().unwrap();
        let path = log_path(&dir);

        {
            let mut log = HistoryLog::open(&path).unwrap();
            log.append("w", vec![RecordId::new("a")]).unwrap();
            let txn = log.append("w", vec![RecordId::new("b")]).unwrap();
            // Simulate a crash mid-append: half of a third record on disk
            let partial = Transaction::new(
                txn.token.next(),
                Utc::now(),
                "w",
                vec![RecordId::new("c")],
            )
            .serialize();
            use std::io::Write;
            let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
            raw.write_all(&partial[..partial.len() / 2]).unwrap();
        }

        let mut log = HistoryLog::open(&path).unwrap();
        // The torn third record is gone and its token is reused
        assert_eq!(log.next_token().unwrap(), SequenceToken::new(3));
        let c = log.append("w", vec![RecordId::new("c")]).unwrap();
        assert_eq!(c.token, SequenceToken::new(3));

        let reader = HistoryLogReader::new(log_path(&dir), true);
        let all = reader.transactions_after(None).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_prune_keeps_tail_and_numbering() {
        let dir = TempDir::new().unwrap();
        let path = log_path(&dir);
        let mut log = HistoryLog::open(&path).unwrap();
        for name in ["a", "b", "c", "d"] {
            log.append("w", vec![RecordId::new(name)]).unwrap();
        }

        let dropped = log.prune_through(SequenceToken::new(2)).unwrap();
        assert_eq!(dropped, 2);

        let reader = HistoryLogReader::new(path.clone(), true);
        let remaining = reader.transactions_after(None).unwrap();
        let tokens: Vec<u64> = remaining.iter().map(|t| t.token.value()).collect();
        assert_eq!(tokens, vec![3, 4]);

        // Appends continue past the pruned prefix on the reopened handle
        let e = log.append("w", vec![RecordId::new("e")]).unwrap();
        assert_eq!(e.token, SequenceToken::new(5));
        assert_eq!(reader.transactions_after(None).unwrap().len(), 3);
    }

    #[test]
    fn test_prune_past_everything_empties_log() {
        let dir = TempDir::new().unwrap();
        let path = log_path(&dir);
        let mut log = HistoryLog::open(&path).unwrap();
        log.append("w", vec![RecordId::new("a")]).unwrap();
        log.append("w", vec![RecordId::new("b")]).unwrap();

        let dropped = log.prune_through(SequenceToken::new(100)).unwrap();
        assert_eq!(dropped, 2);

        let reader = HistoryLogReader::new(path, true);
        assert!(reader.transactions_after(None).unwrap().is_empty());
        assert_eq!(log.next_token().unwrap(), SequenceToken::new(3));
    }

    #[test]
    fn test_token_floor_survives_reopen_after_prune() {
        let dir = TempDir::new().unwrap();
        let path = log_path(&dir);

        {
            let mut log = HistoryLog::open(&path).unwrap();
            log.append("w", vec![RecordId::new("a")]).unwrap();
            log.append("w", vec![RecordId::new("b")]).unwrap();
            log.prune_through(SequenceToken::new(2)).unwrap();
        }

        // A bare reopen scans an empty file; the store re-floors the
        // counter from the records file, which outlives pruning
        let mut log = HistoryLog::open(&path).unwrap();
        log.raise_token_floor(SequenceToken::new(3));
        let c = log.append("w", vec![RecordId::new("c")]).unwrap();
        assert_eq!(c.token, SequenceToken::new(3));

        // A floor at or below the counter changes nothing
        log.raise_token_floor(SequenceToken::new(2));
        assert_eq!(log.next_token().unwrap(), SequenceToken::new(4));
    }

    #[test]
    fn test_prune_nothing_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = log_path(&dir);
        let mut log = HistoryLog::open(&path).unwrap();
        log.append("w", vec![RecordId::new("a")]).unwrap();

        let dropped = log.prune_through(SequenceToken::new(0)).unwrap();
        assert_eq!(dropped, 0);
        let reader = HistoryLogReader::new(path, true);
        assert_eq!(reader.transactions_after(None).unwrap().len(), 1);
    }
}
