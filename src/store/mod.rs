//! Store handle
//!
//! A store is one directory holding four files: `meta.json` (schema version
//! and generation id), `records.db` (committed record versions), `history.log`
//! (the transaction log), and `checkpoint.json` (the replay checkpoint).
//! Multiple sessions, including sessions in other processes, may share the
//! directory; this module adds no cross-process lock and serializes only its
//! own commits.
//!
//! Commit ordering invariant: record versions are fsynced before the history
//! log entry, and the log fsync is the commit point. A crash in between
//! leaves orphaned record versions no transaction names, which later commits
//! supersede.
//!
//! Lifecycle: `open` returns a serving store or an error, with at most one
//! destructive rebuild in between when the schema is incompatible or the
//! meta file is undecodable; the attempt itself is narrated by log events,
//! not by handle states. An open handle stays `Open` until `close`, and
//! only `Open` serves readers, writers, and the change hub.

mod descriptor;
mod errors;
mod meta;
mod records;
mod session;

pub use descriptor::StoreDescriptor;
pub use errors::{StoreError, StoreResult};
pub use meta::{StoreMeta, SCHEMA_VERSION};
pub use session::WriteSession;

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::checkpoint::{slot_path, CheckpointSlot};
use crate::history::{HistoryLog, HistoryLogReader, RecordId, SequenceToken, Transaction};
use crate::notify::ChangeHub;
use crate::observability::{Event, Logger};
use records::RecordStore;

/// Observable lifecycle states of a store handle.
///
/// Opening and rebuilding never show up here: `open` hands back a store
/// that is already serving, or an error, so a handle only ever moves
/// `Open -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Closed by the owner; every operation returns [`StoreError::Closed`]
    Closed,
    /// Serving readers and writers
    Open,
}

impl StoreState {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreState::Closed => "CLOSED",
            StoreState::Open => "OPEN",
        }
    }
}

struct StoreInner {
    records: RecordStore,
    /// `None` when tracking is disabled or the log was unusable at open.
    history: Option<HistoryLog>,
}

/// An open store directory.
///
/// Explicitly constructed and passed by handle; there is no ambient global
/// instance. Cheap accessors hand out the pieces the sync machinery needs:
/// a log reader, the change hub, and the checkpoint slot bound to this
/// generation.
pub struct Store {
    descriptor: StoreDescriptor,
    meta: StoreMeta,
    state: Mutex<StoreState>,
    inner: Mutex<StoreInner>,
    hub: ChangeHub,
}

impl Store {
    /// Opens the store at the descriptor's location, initializing an empty
    /// one if the directory was never used.
    ///
    /// An incompatible schema version or an undecodable meta file triggers
    /// exactly one destructive rebuild; if that also fails the error is
    /// [`StoreError::Fatal`]. Plain IO failures propagate unchanged for the
    /// caller's own retry policy.
    pub fn open(descriptor: StoreDescriptor) -> StoreResult<Self> {
        match Self::try_open(descriptor.clone()) {
            Ok(store) => Ok(store),
            Err(e) if e.requires_rebuild() => {
                Logger::warn(
                    Event::StoreRebuildStart,
                    &[
                        ("location", &descriptor.location.display().to_string()),
                        ("reason", &e.to_string()),
                    ],
                );
                destroy_dir(&descriptor.location)
                    .map_err(|e| StoreError::Fatal(format!("cannot destroy store: {}", e)))?;
                let store = Self::try_open(descriptor)
                    .map_err(|e| StoreError::Fatal(format!("rebuild failed: {}", e)))?;
                Logger::info(
                    Event::StoreRebuildComplete,
                    &[("store_id", &store.meta.store_id.to_string())],
                );
                Ok(store)
            }
            Err(e) => Err(e),
        }
    }

    /// Forcibly destroys and recreates the store, regardless of its current
    /// schema state. Operator entry point; any failure is fatal.
    pub fn rebuild(descriptor: StoreDescriptor) -> StoreResult<Self> {
        Logger::warn(
            Event::StoreRebuildStart,
            &[
                ("location", &descriptor.location.display().to_string()),
                ("reason", "operator requested"),
            ],
        );
        destroy_dir(&descriptor.location)
            .map_err(|e| StoreError::Fatal(format!("cannot destroy store: {}", e)))?;
        let store = Self::try_open(descriptor)
            .map_err(|e| StoreError::Fatal(format!("rebuild failed: {}", e)))?;
        Logger::info(
            Event::StoreRebuildComplete,
            &[("store_id", &store.meta.store_id.to_string())],
        );
        Ok(store)
    }

    fn try_open(descriptor: StoreDescriptor) -> StoreResult<Self> {
        fs::create_dir_all(&descriptor.location)?;

        let meta = StoreMeta::load_or_init(&descriptor.meta_path())?;
        let mut records = RecordStore::open(&descriptor.records_path())?;

        let history = if descriptor.history_tracking {
            match HistoryLog::open(&descriptor.history_log_path()) {
                Ok(mut log) => {
                    // Pruning may have emptied the log; the records file
                    // survives pruning and floors the counter
                    log.raise_token_floor(records.next_token()?);
                    Some(log)
                }
                // A corrupt log degrades history to unavailable; the store
                // itself stays usable and a rebuild heals the log
                Err(e) if e.is_unavailable() => {
                    Logger::warn(Event::HistoryUnavailable, &[("reason", &e.to_string())]);
                    None
                }
                Err(e) => return Err(StoreError::History(e)),
            }
        } else {
            None
        };

        let store = Self {
            descriptor,
            meta,
            state: Mutex::new(StoreState::Open),
            inner: Mutex::new(StoreInner { records, history }),
            hub: ChangeHub::new(),
        };
        Logger::info(
            Event::StoreOpen,
            &[
                ("history_tracking", bool_str(store.descriptor.history_tracking)),
                ("location", &store.descriptor.location.display().to_string()),
                ("store_id", &store.meta.store_id.to_string()),
            ],
        );
        Ok(store)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StoreState {
        *self.state.lock().unwrap()
    }

    /// Closes the store. Further operations return [`StoreError::Closed`].
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if *state != StoreState::Closed {
            *state = StoreState::Closed;
            Logger::info(
                Event::StoreClose,
                &[("store_id", &self.meta.store_id.to_string())],
            );
        }
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.state() == StoreState::Open {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    /// Identity of this store generation.
    pub fn store_id(&self) -> Uuid {
        self.meta.store_id
    }

    /// Descriptor this store was opened from.
    pub fn descriptor(&self) -> &StoreDescriptor {
        &self.descriptor
    }

    /// Starts a writer session tagged with `author`.
    pub fn begin(&self, author: impl Into<String>) -> StoreResult<WriteSession<'_>> {
        self.ensure_open()?;
        Ok(WriteSession::new(self, author.into()))
    }

    /// Read-only view of the history log.
    pub fn log_reader(&self) -> StoreResult<HistoryLogReader> {
        self.ensure_open()?;
        Ok(HistoryLogReader::new(
            self.descriptor.history_log_path(),
            self.descriptor.history_tracking,
        ))
    }

    /// The change hub writers signal and merge loops subscribe to.
    pub fn change_hub(&self) -> StoreResult<ChangeHub> {
        self.ensure_open()?;
        Ok(self.hub.clone())
    }

    /// Checkpoint slot bound to this store generation.
    pub fn checkpoint_slot(&self) -> StoreResult<CheckpointSlot> {
        self.ensure_open()?;
        Ok(CheckpointSlot::new(
            slot_path(&self.descriptor.location),
            self.meta.store_id,
        ))
    }

    /// Current committed value of `id`, observing commits from every
    /// session sharing the directory.
    pub fn fetch_current(&self, id: &RecordId) -> StoreResult<Option<Value>> {
        self.ensure_open()?;
        self.inner.lock().unwrap().records.fetch_current(id)
    }

    /// Number of live (non-deleted) records.
    pub fn live_record_count(&self) -> StoreResult<usize> {
        self.ensure_open()?;
        self.inner.lock().unwrap().records.live_count()
    }

    /// Prunes history log entries with token `<= through`. Best-effort;
    /// callers log and ignore failures.
    pub fn prune_history_through(&self, through: SequenceToken) -> StoreResult<u64> {
        self.ensure_open()?;
        let mut guard = self.inner.lock().unwrap();
        match guard.history.as_mut() {
            Some(log) => Ok(log.prune_through(through)?),
            None => Ok(0),
        }
    }

    pub(crate) fn commit_staged(
        &self,
        author: &str,
        staged: Vec<(RecordId, Option<Value>)>,
    ) -> StoreResult<Transaction> {
        self.ensure_open()?;
        if staged.is_empty() {
            return Err(StoreError::EmptyTransaction);
        }

        let txn = {
            let mut guard = self.inner.lock().unwrap();
            let inner = &mut *guard;

            let token = match inner.history.as_mut() {
                Some(log) => {
                    // A prune can return the log to a length this handle
                    // has already seen; the records file still carries the
                    // consumed tokens
                    log.raise_token_floor(inner.records.next_token()?);
                    log.next_token()?
                }
                None => inner.records.next_token()?,
            };

            for (id, value) in &staged {
                inner.records.append_version(token, id, value.as_ref())?;
            }
            // Record versions must be durable before the log names them
            inner.records.sync()?;

            let affected: Vec<RecordId> = staged.into_iter().map(|(id, _)| id).collect();
            match inner.history.as_mut() {
                Some(log) => {
                    let txn = log.append(author, affected)?;
                    debug_assert_eq!(txn.token, token);
                    txn
                }
                None => Transaction::new(token, Utc::now(), author, affected),
            }
        };

        Logger::info(
            Event::TransactionCommit,
            &[
                ("affected", &txn.affected.len().to_string()),
                ("author", author),
                ("token", &txn.token.to_string()),
            ],
        );
        self.hub.signal();
        Ok(txn)
    }
}

fn destroy_dir(location: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(location) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
