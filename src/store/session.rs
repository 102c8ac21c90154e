//! Writer sessions
//!
//! A session stages puts and deletes, then commits them as one atomic,
//! durably-logged transaction. Sessions are independent; any number may
//! stage concurrently, and commits serialize on the store's internal lock.

use serde_json::Value;

use super::errors::StoreResult;
use super::Store;
use crate::history::{RecordId, Transaction};

/// One writer's staged transaction against an open store.
pub struct WriteSession<'a> {
    store: &'a Store,
    author: String,
    staged: Vec<(RecordId, Option<Value>)>,
}

impl<'a> WriteSession<'a> {
    pub(crate) fn new(store: &'a Store, author: String) -> Self {
        Self {
            store,
            author,
            staged: Vec::new(),
        }
    }

    /// Stages a full-value write of `id`.
    pub fn put(&mut self, id: impl Into<RecordId>, value: Value) -> &mut Self {
        self.staged.push((id.into(), Some(value)));
        self
    }

    /// Stages a delete of `id`.
    pub fn delete(&mut self, id: impl Into<RecordId>) -> &mut Self {
        self.staged.push((id.into(), None));
        self
    }

    /// Number of staged operations.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Commits the staged operations atomically.
    ///
    /// Record versions are made durable first, the history log entry second
    /// (the log fsync is the commit point), and the change hub is signalled
    /// last. Returns the committed transaction with its assigned token.
    pub fn commit(self) -> StoreResult<Transaction> {
        self.store
            .commit_staged(&self.author, self.staged)
    }
}
