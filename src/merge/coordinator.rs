//! Merge coordinator
//!
//! One coordinator keeps one view consistent with a store's history. A
//! cycle reads everything past the checkpoint, folds it into a change set,
//! refetches and applies the batch, and only then advances and persists the
//! checkpoint. A failure anywhere before the advance leaves the checkpoint
//! untouched so the whole range replays on the next trigger; refetch makes
//! that replay idempotent.
//!
//! At most one cycle runs at a time because cycles run on the coordinator's
//! own task through `&mut self`. Signals arriving mid-cycle are stored as a
//! single wakeup permit, so any burst collapses into one follow-up cycle.

use std::sync::Arc;

use crate::checkpoint::CheckpointSlot;
use crate::config::SyncConfig;
use crate::history::{HistoryLogReader, SequenceToken};
use crate::notify::{ChangeListener, FallbackPoller};
use crate::observability::{Event, Logger};
use crate::projection::{ViewHandle, ViewProjector};
use crate::store::{Store, StoreResult};

use super::changeset::ChangeSet;
use super::errors::MergeResult;

/// What one merge cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Transactions were projected and the checkpoint advanced
    Applied(CycleStats),
    /// Nothing newer than the checkpoint
    Noop,
    /// History is unavailable (tracking disabled or log corrupt); no-op
    Unavailable,
}

/// Counters for one applied cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    /// Transactions consumed
    pub transactions: usize,
    /// Identities refetched and applied to the view
    pub records: usize,
    /// Checkpoint after the cycle
    pub checkpoint: SequenceToken,
}

/// Totals across one `drain` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Cycles that applied at least one transaction
    pub cycles: u64,
    /// Transactions consumed in total
    pub transactions: u64,
    /// Identities projected in total
    pub records: u64,
    /// Checkpoint when the drain stopped
    pub checkpoint: Option<SequenceToken>,
}

/// Drives merge cycles for one store/view pair.
pub struct MergeCoordinator {
    store: Arc<Store>,
    reader: HistoryLogReader,
    slot: CheckpointSlot,
    projector: ViewProjector,
    listener: ChangeListener,
    poller: Option<FallbackPoller>,
    config: SyncConfig,
    /// Authoritative between persists; the slot is only its durable copy.
    checkpoint: Option<SequenceToken>,
    checkpoint_dirty: bool,
}

impl MergeCoordinator {
    /// Attaches a view to `store` and loads the checkpoint slot once.
    ///
    /// An unreadable, foreign, or unknown-version slot is discarded with a
    /// warning and the retained log replays from its start. When the store
    /// was opened with remote change notification and the config carries a
    /// poll interval, the fallback poller starts here and stops on
    /// [`shutdown`](Self::shutdown) or drop.
    pub fn attach(store: Arc<Store>, view: ViewHandle, config: SyncConfig) -> StoreResult<Self> {
        let reader = store.log_reader()?;
        let slot = store.checkpoint_slot()?;
        let hub = store.change_hub()?;
        let listener = hub.subscribe();

        let poller = match (
            store.descriptor().remote_change_notify,
            config.fallback_poll_interval,
        ) {
            (true, Some(interval)) => Some(FallbackPoller::spawn(
                store.descriptor().history_log_path(),
                hub,
                interval,
            )),
            _ => None,
        };

        let checkpoint = match slot.load() {
            Ok(token) => token,
            Err(e) => {
                Logger::warn(
                    Event::CheckpointDiscarded,
                    &[("code", e.code().as_str()), ("reason", &e.to_string())],
                );
                None
            }
        };

        Ok(Self {
            store,
            reader,
            slot,
            projector: ViewProjector::new(view),
            listener,
            poller,
            config,
            checkpoint,
            checkpoint_dirty: false,
        })
    }

    /// The in-memory checkpoint.
    pub fn checkpoint(&self) -> Option<SequenceToken> {
        self.checkpoint
    }

    /// The view this coordinator feeds.
    pub fn view(&self) -> &ViewHandle {
        self.projector.view()
    }

    /// Waits for the next change signal. A signal that arrived while no one
    /// was waiting is stored and returns immediately; a burst of signals
    /// stores exactly one.
    pub async fn changed(&self) {
        self.listener.changed().await;
    }

    /// Runs one merge cycle.
    pub async fn run_cycle(&mut self) -> MergeResult<CycleOutcome> {
        let transactions = match self.reader.transactions_after(self.checkpoint) {
            Ok(transactions) => transactions,
            Err(e) if e.is_unavailable() => {
                Logger::warn(Event::HistoryUnavailable, &[("reason", &e.to_string())]);
                return Ok(CycleOutcome::Unavailable);
            }
            Err(e) => return Err(e.into()),
        };

        let Some(changes) = ChangeSet::from_transactions(&transactions) else {
            self.flush_dirty_checkpoint();
            Logger::info(
                Event::MergeCycleNoop,
                &[("checkpoint", &token_str(self.checkpoint))],
            );
            return Ok(CycleOutcome::Noop);
        };

        let records = self
            .projector
            .project(self.store.as_ref(), changes.identities())
            .await?;

        // The batch is in the view; only now may the checkpoint move
        self.checkpoint = Some(changes.last_token());
        self.persist_checkpoint(changes.last_token());
        self.prune_consumed();

        let stats = CycleStats {
            transactions: changes.transaction_count(),
            records,
            checkpoint: changes.last_token(),
        };
        Logger::info(
            Event::MergeCycleComplete,
            &[
                ("checkpoint", &stats.checkpoint.to_string()),
                ("from", &changes.first_token().to_string()),
                ("records", &stats.records.to_string()),
                ("transactions", &stats.transactions.to_string()),
            ],
        );
        Ok(CycleOutcome::Applied(stats))
    }

    /// Runs cycles until one finds nothing to do. Entry point for tests and
    /// the CLI; long-running embeddings use [`run`](Self::run).
    pub async fn drain(&mut self) -> MergeResult<DrainStats> {
        let mut stats = DrainStats::default();
        loop {
            match self.run_cycle().await? {
                CycleOutcome::Applied(cycle) => {
                    stats.cycles += 1;
                    stats.transactions += cycle.transactions as u64;
                    stats.records += cycle.records as u64;
                    stats.checkpoint = Some(cycle.checkpoint);
                }
                CycleOutcome::Noop | CycleOutcome::Unavailable => {
                    stats.checkpoint = self.checkpoint;
                    return Ok(stats);
                }
            }
        }
    }

    /// Catch-up cycle, then one cycle per change signal, forever.
    ///
    /// Cycle errors are absorbed here: the checkpoint was left untouched,
    /// so the aborted range simply replays on the next signal. Stop the
    /// loop by aborting the task that runs it.
    pub async fn run(&mut self) {
        self.cycle_absorbing_errors().await;
        loop {
            self.listener.changed().await;
            self.cycle_absorbing_errors().await;
        }
    }

    /// Stops the fallback poller, if one is running.
    pub async fn shutdown(mut self) {
        if let Some(poller) = self.poller.take() {
            poller.shutdown().await;
        }
    }

    async fn cycle_absorbing_errors(&mut self) {
        if let Err(e) = self.run_cycle().await {
            Logger::error(Event::MergeCycleAborted, &[("reason", &e.to_string())]);
        }
    }

    fn persist_checkpoint(&mut self, token: SequenceToken) {
        match self.slot.persist(token) {
            Ok(()) => {
                self.checkpoint_dirty = false;
                Logger::info(Event::CheckpointPersist, &[("token", &token.to_string())]);
            }
            // In-memory token stays authoritative; persist retries next cycle
            Err(e) => {
                self.checkpoint_dirty = true;
                Logger::error(
                    Event::CheckpointPersistFailed,
                    &[("reason", &e.to_string()), ("token", &token.to_string())],
                );
            }
        }
    }

    fn flush_dirty_checkpoint(&mut self) {
        if !self.checkpoint_dirty {
            return;
        }
        if let Some(token) = self.checkpoint {
            self.persist_checkpoint(token);
        }
    }

    fn prune_consumed(&mut self) {
        // Pruning is bounded by the durable checkpoint, never the in-memory
        // one, and skipped entirely when disabled
        if !self.config.prune_on_checkpoint || self.checkpoint_dirty {
            return;
        }
        let Some(token) = self.checkpoint else {
            return;
        };
        match self.store.prune_history_through(token) {
            Ok(0) => {}
            Ok(dropped) => Logger::info(
                Event::HistoryPruned,
                &[
                    ("dropped", &dropped.to_string()),
                    ("through", &token.to_string()),
                ],
            ),
            Err(e) => Logger::warn(
                Event::HistoryPruneFailed,
                &[("reason", &e.to_string()), ("through", &token.to_string())],
            ),
        }
    }
}

fn token_str(token: Option<SequenceToken>) -> String {
    match token {
        Some(token) => token.to_string(),
        None => "none".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::MergeError;
    use crate::projection::ViewProjection;
    use crate::store::StoreDescriptor;
    use serde_json::json;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn commit(store: &Store, author: &str, id: &str, value: serde_json::Value) {
        let mut session = store.begin(author).unwrap();
        session.put(id, value);
        session.commit().unwrap();
    }

    fn attach(store: &Arc<Store>, config: SyncConfig) -> MergeCoordinator {
        MergeCoordinator::attach(Arc::clone(store), ViewProjection::spawn(), config).unwrap()
    }

    #[tokio::test]
    async fn test_fresh_store_has_no_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(StoreDescriptor::new(dir.path())).unwrap());
        let coordinator = attach(&store, SyncConfig::without_fallback_poll());
        assert_eq!(coordinator.checkpoint(), None);
    }

    #[tokio::test]
    async fn test_cycle_projects_and_advances_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(StoreDescriptor::new(dir.path())).unwrap());
        commit(&store, "first", "user", json!({"name": "alice"}));
        commit(&store, "second", "user", json!({"name": "alice2"}));

        let mut coordinator = attach(&store, SyncConfig::without_fallback_poll());
        let outcome = coordinator.run_cycle().await.unwrap();

        // Two transactions, one identity, latest value wins
        match outcome {
            CycleOutcome::Applied(stats) => {
                assert_eq!(stats.transactions, 2);
                assert_eq!(stats.records, 1);
                assert_eq!(stats.checkpoint, SequenceToken::new(2));
            }
            other => panic!("expected applied cycle, got {:?}", other),
        }
        assert_eq!(coordinator.checkpoint(), Some(SequenceToken::new(2)));
        assert_eq!(
            coordinator.view().get("user").await.unwrap(),
            Some(json!({"name": "alice2"}))
        );
        assert!(dir.path().join("checkpoint.json").exists());
    }

    #[tokio::test]
    async fn test_second_cycle_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(StoreDescriptor::new(dir.path())).unwrap());
        commit(&store, "w", "x", json!(1));

        let mut coordinator = attach(&store, SyncConfig::without_fallback_poll());
        assert!(matches!(
            coordinator.run_cycle().await.unwrap(),
            CycleOutcome::Applied(_)
        ));
        assert!(matches!(
            coordinator.run_cycle().await.unwrap(),
            CycleOutcome::Noop
        ));
        assert_eq!(coordinator.checkpoint(), Some(SequenceToken::new(1)));
    }

    #[tokio::test]
    async fn test_tracking_disabled_cycles_are_unavailable() {
        let dir = TempDir::new().unwrap();
        let descriptor = StoreDescriptor::new(dir.path()).without_history_tracking();
        let store = Arc::new(Store::open(descriptor).unwrap());
        commit(&store, "w", "x", json!(1));

        let mut coordinator = attach(&store, SyncConfig::without_fallback_poll());
        assert!(matches!(
            coordinator.run_cycle().await.unwrap(),
            CycleOutcome::Unavailable
        ));
        assert_eq!(coordinator.checkpoint(), None);
        assert_eq!(coordinator.view().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drain_consumes_everything() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(StoreDescriptor::new(dir.path())).unwrap());
        for i in 0..4 {
            commit(&store, "w", &format!("r{}", i), json!(i));
        }

        let mut coordinator = attach(&store, SyncConfig::without_fallback_poll());
        let stats = coordinator.drain().await.unwrap();

        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.transactions, 4);
        assert_eq!(stats.records, 4);
        assert_eq!(stats.checkpoint, Some(SequenceToken::new(4)));
        assert_eq!(coordinator.view().len().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_prune_follows_the_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(StoreDescriptor::new(dir.path())).unwrap());
        commit(&store, "w", "x", json!(1));
        commit(&store, "w", "y", json!(2));

        let mut coordinator = attach(&store, SyncConfig::without_fallback_poll());
        coordinator.drain().await.unwrap();

        // Consumed entries are gone but newer ones keep flowing
        assert!(store
            .log_reader()
            .unwrap()
            .transactions_after(None)
            .unwrap()
            .is_empty());
        commit(&store, "w", "z", json!(3));
        let stats = coordinator.drain().await.unwrap();
        assert_eq!(stats.transactions, 1);
        assert_eq!(coordinator.view().len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_pruning_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(StoreDescriptor::new(dir.path())).unwrap());
        commit(&store, "w", "x", json!(1));

        let mut coordinator = attach(
            &store,
            SyncConfig {
                fallback_poll_interval: None,
                ..SyncConfig::without_pruning()
            },
        );
        coordinator.drain().await.unwrap();

        let retained = store.log_reader().unwrap().transactions_after(None).unwrap();
        assert_eq!(retained.len(), 1);
    }

    #[tokio::test]
    async fn test_attach_resumes_from_persisted_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(StoreDescriptor::new(dir.path())).unwrap());
        commit(&store, "w", "old", json!(1));

        let config = SyncConfig {
            fallback_poll_interval: None,
            ..SyncConfig::without_pruning()
        };
        let mut coordinator = attach(&store, config.clone());
        coordinator.drain().await.unwrap();
        drop(coordinator);

        commit(&store, "w", "new", json!(2));

        // A fresh attach replays only past the stored checkpoint, so the
        // entry consumed before never reaches the new view
        let mut coordinator = attach(&store, config);
        assert_eq!(coordinator.checkpoint(), Some(SequenceToken::new(1)));
        let stats = coordinator.drain().await.unwrap();
        assert_eq!(stats.transactions, 1);
        assert_eq!(coordinator.view().get("new").await.unwrap(), Some(json!(2)));
        assert_eq!(coordinator.view().get("old").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_foreign_slot_discarded_at_attach() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(StoreDescriptor::new(dir.path())).unwrap());
        commit(&store, "w", "x", json!(1));

        // Slot written by some other store generation
        CheckpointSlot::new(dir.path().join("checkpoint.json"), Uuid::new_v4())
            .persist(SequenceToken::new(1))
            .unwrap();

        let mut coordinator = attach(&store, SyncConfig::without_fallback_poll());
        assert_eq!(coordinator.checkpoint(), None);

        // Full replay of the retained log
        let stats = coordinator.drain().await.unwrap();
        assert_eq!(stats.transactions, 1);
        assert_eq!(coordinator.view().get("x").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_aborted_cycle_leaves_checkpoint_untouched() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(StoreDescriptor::new(dir.path())).unwrap());
        commit(&store, "w", "x", json!(1));

        let mut coordinator = attach(&store, SyncConfig::without_fallback_poll());

        // Closing the store makes the refetch fail mid-cycle
        store.close();
        let err = coordinator.run_cycle().await.unwrap_err();
        assert!(matches!(err, MergeError::Projection(_)));
        assert_eq!(coordinator.checkpoint(), None);
        assert!(!dir.path().join("checkpoint.json").exists());
        assert_eq!(coordinator.view().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_burst_of_signals_stores_one_wakeup() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(StoreDescriptor::new(dir.path())).unwrap());
        let mut coordinator = attach(&store, SyncConfig::without_fallback_poll());

        for i in 0..3 {
            commit(&store, "w", &format!("r{}", i), json!(i));
        }

        // Three signals collapse into one stored permit
        tokio::time::timeout(std::time::Duration::from_millis(100), coordinator.changed())
            .await
            .expect("stored permit should wake immediately");
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(50), coordinator.changed())
                .await;
        assert!(waited.is_err());

        // And the one follow-up cycle covers everything pending
        let stats = coordinator.drain().await.unwrap();
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.transactions, 3);
    }
}
