//! Refetch projector
//!
//! Projection never replays logged payloads. For every identity a consumed
//! transaction touched it refetches the record's *current* committed value
//! from the store and ships the finished batch to the view task. Stale
//! intermediate values are skipped by construction and replaying an
//! already-projected range converges on the same state.

use serde_json::Value;

use crate::history::RecordId;
use crate::store::Store;

use super::errors::ProjectionResult;
use super::view::ViewHandle;

/// Builds refetch batches against a store and applies them to one view.
pub struct ViewProjector {
    view: ViewHandle,
}

impl ViewProjector {
    /// Creates a projector feeding `view`.
    pub fn new(view: ViewHandle) -> Self {
        Self { view }
    }

    /// The view this projector applies batches to.
    pub fn view(&self) -> &ViewHandle {
        &self.view
    }

    /// Refetches `ids` in order and applies them as a single batch, waiting
    /// until the view has absorbed it. Returns the number of identities
    /// projected.
    ///
    /// The refetch runs on the caller's task; the view task only ever sees
    /// finished batches.
    pub async fn project(&self, store: &Store, ids: &[RecordId]) -> ProjectionResult<usize> {
        let mut batch: Vec<(RecordId, Option<Value>)> = Vec::with_capacity(ids.len());
        for id in ids {
            let value = store.fetch_current(id)?;
            batch.push((id.clone(), value));
        }
        let projected = batch.len();
        self.view.apply(batch).await?;
        Ok(projected)
    }
}
