//! View projection task
//!
//! The in-memory read view is confined to one spawned task; every mutation
//! and every read arrives over its command channel, so the view needs no
//! lock and observers see changes in exactly the order they were applied.
//! A [`ViewHandle`] is a cheap clone of the channel sender. The task exits
//! when the last handle is dropped.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::history::RecordId;

use super::errors::{ProjectionError, ProjectionResult};

/// Observer channel carrying one [`ViewDiff`] per visible change.
pub type DiffReceiver = mpsc::UnboundedReceiver<ViewDiff>;

/// Ordered identities touched by one applied batch.
///
/// Both lists preserve batch order and an identity appears in at most one
/// of them. Applies that change nothing produce no diff at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewDiff {
    /// Identities whose value appeared or changed
    pub updated: Vec<RecordId>,
    /// Identities removed from the view
    pub removed: Vec<RecordId>,
}

impl ViewDiff {
    /// True when the batch changed nothing.
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty()
    }
}

enum ViewCommand {
    Apply {
        batch: Vec<(RecordId, Option<Value>)>,
        ack: oneshot::Sender<()>,
    },
    Get {
        id: RecordId,
        reply: oneshot::Sender<Option<Value>>,
    },
    Snapshot {
        reply: oneshot::Sender<HashMap<RecordId, Value>>,
    },
    Len {
        reply: oneshot::Sender<usize>,
    },
    Observe {
        sender: mpsc::UnboundedSender<ViewDiff>,
    },
}

/// The materialized view plus its observers. Lives inside the task spawned
/// by [`ViewProjection::spawn`]; nothing outside that task ever touches it.
pub struct ViewProjection {
    records: HashMap<RecordId, Value>,
    observers: Vec<mpsc::UnboundedSender<ViewDiff>>,
}

impl ViewProjection {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            observers: Vec::new(),
        }
    }

    /// Spawns the view task and returns the first handle to it.
    pub fn spawn() -> ViewHandle {
        let (commands, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut view = ViewProjection::new();
            while let Some(command) = rx.recv().await {
                view.handle(command);
            }
        });
        ViewHandle { commands }
    }

    fn handle(&mut self, command: ViewCommand) {
        match command {
            ViewCommand::Apply { batch, ack } => {
                let diff = self.apply_batch(batch);
                if !diff.is_empty() {
                    self.observers.retain(|tx| tx.send(diff.clone()).is_ok());
                }
                // Fan out before acking so callers never race their own diff
                let _ = ack.send(());
            }
            ViewCommand::Get { id, reply } => {
                let _ = reply.send(self.records.get(&id).cloned());
            }
            ViewCommand::Snapshot { reply } => {
                let _ = reply.send(self.records.clone());
            }
            ViewCommand::Len { reply } => {
                let _ = reply.send(self.records.len());
            }
            ViewCommand::Observe { sender } => {
                self.observers.push(sender);
            }
        }
    }

    /// Applies one refetched batch. `Some` upserts, `None` removes.
    /// Re-applying a value the view already holds changes nothing, which is
    /// what makes replaying an old range harmless.
    fn apply_batch(&mut self, batch: Vec<(RecordId, Option<Value>)>) -> ViewDiff {
        let mut diff = ViewDiff::default();
        for (id, value) in batch {
            match value {
                Some(value) => {
                    if self.records.get(&id) != Some(&value) {
                        self.records.insert(id.clone(), value);
                        diff.updated.push(id);
                    }
                }
                None => {
                    if self.records.remove(&id).is_some() {
                        diff.removed.push(id);
                    }
                }
            }
        }
        diff
    }
}

/// Clonable handle to a spawned [`ViewProjection`].
#[derive(Clone)]
pub struct ViewHandle {
    commands: mpsc::UnboundedSender<ViewCommand>,
}

impl ViewHandle {
    /// Applies a refetched batch and waits until its effects are visible.
    ///
    /// When this returns `Ok`, every observer channel already carries the
    /// batch's diff (if it had one) and reads see the new state.
    pub async fn apply(&self, batch: Vec<(RecordId, Option<Value>)>) -> ProjectionResult<()> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(ViewCommand::Apply { batch, ack })
            .map_err(|_| ProjectionError::ViewClosed)?;
        done.await.map_err(|_| ProjectionError::ViewClosed)
    }

    /// Current value of `id`, if the view holds one.
    pub async fn get(&self, id: impl Into<RecordId>) -> ProjectionResult<Option<Value>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ViewCommand::Get {
                id: id.into(),
                reply,
            })
            .map_err(|_| ProjectionError::ViewClosed)?;
        response.await.map_err(|_| ProjectionError::ViewClosed)
    }

    /// Point-in-time copy of the whole view.
    pub async fn snapshot(&self) -> ProjectionResult<HashMap<RecordId, Value>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ViewCommand::Snapshot { reply })
            .map_err(|_| ProjectionError::ViewClosed)?;
        response.await.map_err(|_| ProjectionError::ViewClosed)
    }

    /// Number of records currently in the view.
    pub async fn len(&self) -> ProjectionResult<usize> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ViewCommand::Len { reply })
            .map_err(|_| ProjectionError::ViewClosed)?;
        response.await.map_err(|_| ProjectionError::ViewClosed)
    }

    /// Registers an observer. Each visible change arrives as one diff; the
    /// registration lasts until the receiver is dropped.
    pub fn observe(&self) -> ProjectionResult<DiffReceiver> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.commands
            .send(ViewCommand::Observe { sender })
            .map_err(|_| ProjectionError::ViewClosed)?;
        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(name: &str) -> RecordId {
        RecordId::new(name)
    }

    #[tokio::test]
    async fn test_apply_then_read() {
        let view = ViewProjection::spawn();
        view.apply(vec![(id("a"), Some(json!({"n": 1})))])
            .await
            .unwrap();

        assert_eq!(view.get("a").await.unwrap(), Some(json!({"n": 1})));
        assert_eq!(view.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_none_removes_the_record() {
        let view = ViewProjection::spawn();
        view.apply(vec![(id("a"), Some(json!(1)))]).await.unwrap();
        view.apply(vec![(id("a"), None)]).await.unwrap();

        assert_eq!(view.get("a").await.unwrap(), None);
        assert_eq!(view.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_handles_share_one_view() {
        let view = ViewProjection::spawn();
        let other = view.clone();
        view.apply(vec![(id("shared"), Some(json!(true)))])
            .await
            .unwrap();

        assert_eq!(other.get("shared").await.unwrap(), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_observer_receives_ordered_diff() {
        let view = ViewProjection::spawn();
        view.apply(vec![(id("gone"), Some(json!(0)))]).await.unwrap();
        let mut diffs = view.observe().unwrap();

        view.apply(vec![
            (id("a"), Some(json!(1))),
            (id("b"), Some(json!(2))),
            (id("gone"), None),
        ])
        .await
        .unwrap();

        let diff = diffs.recv().await.unwrap();
        assert_eq!(diff.updated, vec![id("a"), id("b")]);
        assert_eq!(diff.removed, vec![id("gone")]);
    }

    #[tokio::test]
    async fn test_no_effect_apply_emits_no_diff() {
        let view = ViewProjection::spawn();
        view.apply(vec![(id("a"), Some(json!(1)))]).await.unwrap();
        let mut diffs = view.observe().unwrap();

        // Same value again and a removal of something never present
        view.apply(vec![(id("a"), Some(json!(1))), (id("ghost"), None)])
            .await
            .unwrap();
        assert!(diffs.try_recv().is_err());

        // A real change still comes through
        view.apply(vec![(id("a"), Some(json!(2)))]).await.unwrap();
        let diff = diffs.recv().await.unwrap();
        assert_eq!(diff.updated, vec![id("a")]);
        assert!(diff.removed.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_is_a_point_in_time_copy() {
        let view = ViewProjection::spawn();
        view.apply(vec![(id("a"), Some(json!(1)))]).await.unwrap();

        let snapshot = view.snapshot().await.unwrap();
        view.apply(vec![(id("b"), Some(json!(2)))]).await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&id("a")), Some(&json!(1)));
        assert_eq!(view.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dropped_observer_is_pruned() {
        let view = ViewProjection::spawn();
        let diffs = view.observe().unwrap();
        drop(diffs);

        // Applying after the drop must not fail or wedge the task
        view.apply(vec![(id("a"), Some(json!(1)))]).await.unwrap();
        assert_eq!(view.len().await.unwrap(), 1);
    }
}
