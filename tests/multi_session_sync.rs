//! Multi-Session Sync Tests
//!
//! Tests for cross-session convergence invariants:
//! - Commits from other sessions on the same directory are merged
//! - The fallback poller surfaces foreign commits without any signal
//! - Tokens keep ascending when sessions interleave commits
//! - Numbering and replay survive a restart after the consumed log
//!   prefix was pruned
//! - A session without history tracking still commits; merging degrades
//!   to a no-op instead of failing
//! - Corrupt history degrades merging and a rebuild recovers the
//!   directory at the cost of its contents

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use mirrordb::config::SyncConfig;
use mirrordb::history::RecordId;
use mirrordb::merge::MergeCoordinator;
use mirrordb::projection::{ViewHandle, ViewProjection};
use mirrordb::store::{Store, StoreDescriptor};

// =============================================================================
// Helper Functions
// =============================================================================

fn open_store(location: &Path) -> Arc<Store> {
    Arc::new(Store::open(StoreDescriptor::new(location)).unwrap())
}

fn commit_put(store: &Store, author: &str, id: &str, value: Value) -> u64 {
    let mut session = store.begin(author).unwrap();
    session.put(id, value);
    session.commit().unwrap().token.value()
}

fn attach(store: &Arc<Store>, view: &ViewHandle, config: SyncConfig) -> MergeCoordinator {
    MergeCoordinator::attach(Arc::clone(store), view.clone(), config).unwrap()
}

/// Polls the view until `id` appears or two seconds pass.
async fn wait_for(view: &ViewHandle, id: &str) -> Option<Value> {
    for _ in 0..200 {
        if let Some(value) = view.get(id).await.unwrap() {
            return Some(value);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}

// =============================================================================
// Foreign Session Tests
// =============================================================================

/// A drain picks up commits made through another session's handle on the
/// same directory.
#[tokio::test]
async fn test_foreign_session_commits_are_merged() {
    let dir = TempDir::new().unwrap();
    let local = open_store(dir.path());
    let foreign = open_store(dir.path());

    commit_put(&foreign, "other-process", "user:1", json!({"from": "foreign"}));

    let view = ViewProjection::spawn();
    let mut coordinator = attach(&local, &view, SyncConfig::without_fallback_poll());
    let stats = coordinator.drain().await.unwrap();

    assert_eq!(stats.transactions, 1);
    assert_eq!(
        view.get("user:1").await.unwrap(),
        Some(json!({"from": "foreign"})),
        "CONVERGENCE VIOLATION: foreign commit missing from the projection"
    );
}

/// Tokens keep ascending when a second session commits between a first
/// session's commits.
#[test]
fn test_interleaved_sessions_keep_tokens_ascending() {
    let dir = TempDir::new().unwrap();
    let first = open_store(dir.path());
    let second = open_store(dir.path());

    let t1 = commit_put(&first, "first", "a", json!(1));
    let t2 = commit_put(&second, "second", "b", json!(2));
    let t3 = commit_put(&first, "first", "c", json!(3));
    assert_eq!((t1, t2, t3), (1, 2, 3));

    let tokens: Vec<u64> = first
        .log_reader()
        .unwrap()
        .transactions_after(None)
        .unwrap()
        .iter()
        .map(|txn| txn.token.value())
        .collect();
    assert_eq!(
        tokens,
        vec![1, 2, 3],
        "TOKEN VIOLATION: history tokens not strictly ascending across sessions"
    );
}

/// The fallback poller notices foreign appends with no signal at all.
#[tokio::test]
async fn test_fallback_poller_surfaces_foreign_commits() {
    let dir = TempDir::new().unwrap();
    let local = open_store(dir.path());

    let view = ViewProjection::spawn();
    let config = SyncConfig {
        prune_on_checkpoint: true,
        fallback_poll_interval: Some(Duration::from_millis(25)),
    };
    let mut coordinator = attach(&local, &view, config);
    let run_task = tokio::spawn(async move { coordinator.run().await });

    // A writer in another process: separate handle, separate change hub
    let foreign = open_store(dir.path());
    commit_put(&foreign, "other-process", "user:9", json!({"seen": true}));

    let merged = wait_for(&view, "user:9").await;
    run_task.abort();
    assert_eq!(
        merged,
        Some(json!({"seen": true})),
        "LIVENESS VIOLATION: foreign commit never reached the projection"
    );
}

/// Commits through the merging session itself reach the view through its
/// own change signals, without the poller.
#[tokio::test]
async fn test_local_commits_reach_view_through_signals() {
    let dir = TempDir::new().unwrap();
    let store = open_store(dir.path());

    let view = ViewProjection::spawn();
    let mut coordinator = attach(&store, &view, SyncConfig::without_fallback_poll());
    let run_task = tokio::spawn(async move { coordinator.run().await });

    commit_put(&store, "local", "user:5", json!({"local": true}));

    let merged = wait_for(&view, "user:5").await;
    run_task.abort();
    assert_eq!(
        merged,
        Some(json!({"local": true})),
        "LIVENESS VIOLATION: signalled commit never reached the projection"
    );
}

// =============================================================================
// Restart Tests
// =============================================================================

/// Numbering keeps ascending when a process restarts after its consumed
/// log was pruned, so later commits still reach a fresh projection.
#[tokio::test]
async fn test_commits_after_restart_reach_the_projection() {
    let dir = TempDir::new().unwrap();

    let first_token = {
        let store = open_store(dir.path());
        let token = commit_put(&store, "restarter", "job:1", json!({"phase": "first"}));

        let view = ViewProjection::spawn();
        let mut coordinator = attach(&store, &view, SyncConfig::without_fallback_poll());
        let stats = coordinator.drain().await.unwrap();
        assert_eq!(stats.checkpoint.map(|t| t.value()), Some(token));
        // Default pruning dropped the consumed entry behind the checkpoint
        assert!(store
            .log_reader()
            .unwrap()
            .transactions_after(None)
            .unwrap()
            .is_empty());
        coordinator.shutdown().await;
        token
    };

    // The next process generation opens the same directory
    let store = open_store(dir.path());
    let second_token = commit_put(&store, "restarter", "job:1", json!({"phase": "second"}));
    assert!(
        second_token > first_token,
        "TOKEN VIOLATION: commit after restart reused a consumed token"
    );

    let view = ViewProjection::spawn();
    let mut coordinator = attach(&store, &view, SyncConfig::without_fallback_poll());
    coordinator.drain().await.unwrap();
    assert_eq!(
        view.get("job:1").await.unwrap(),
        Some(json!({"phase": "second"})),
        "DURABILITY VIOLATION: commit after restart never reached the projection"
    );
}

// =============================================================================
// Degraded History Tests
// =============================================================================

/// A session without history tracking commits durably; merging degrades
/// to a no-op and never writes a checkpoint.
#[tokio::test]
async fn test_untracked_store_merges_as_noop() {
    let dir = TempDir::new().unwrap();
    let descriptor = StoreDescriptor::new(dir.path()).without_history_tracking();
    let store = Arc::new(Store::open(descriptor).unwrap());

    commit_put(&store, "w", "user:1", json!({"kept": true}));
    assert_eq!(
        store.fetch_current(&RecordId::new("user:1")).unwrap(),
        Some(json!({"kept": true}))
    );

    let view = ViewProjection::spawn();
    let mut coordinator = attach(&store, &view, SyncConfig::without_fallback_poll());
    let stats = coordinator.drain().await.unwrap();

    assert_eq!(stats.cycles, 0);
    assert_eq!(stats.checkpoint, None);
    assert_eq!(view.len().await.unwrap(), 0);
    assert!(
        !dir.path().join("checkpoint.json").exists(),
        "DEGRADE VIOLATION: checkpoint written without history tracking"
    );
}

/// Corrupt history degrades merging to a no-op while reads and writes on
/// the store keep working; an operator rebuild recovers the directory.
#[tokio::test]
async fn test_corrupt_history_degrades_then_rebuild_recovers() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_store(dir.path());
        commit_put(&store, "w", "user:1", json!({"a": 1}));
        commit_put(&store, "w", "user:2", json!({"b": 2}));
        store.close();
    }

    // Flip a byte inside the first record's body
    let log_path = dir.path().join("history.log");
    let mut bytes = fs::read(&log_path).unwrap();
    bytes[10] ^= 0xFF;
    fs::write(&log_path, &bytes).unwrap();

    // The store opens and serves reads and writes regardless
    let store = open_store(dir.path());
    commit_put(&store, "w", "user:3", json!({"c": 3}));
    assert_eq!(
        store.fetch_current(&RecordId::new("user:3")).unwrap(),
        Some(json!({"c": 3}))
    );

    let view = ViewProjection::spawn();
    let mut coordinator = attach(&store, &view, SyncConfig::without_fallback_poll());
    let stats = coordinator.drain().await.unwrap();
    assert_eq!(
        stats.cycles, 0,
        "DEGRADE VIOLATION: merge cycles ran against corrupt history"
    );
    store.close();

    // Rebuild trades the contents for a healthy directory
    let store = Arc::new(Store::rebuild(StoreDescriptor::new(dir.path())).unwrap());
    assert_eq!(store.live_record_count().unwrap(), 0);
    commit_put(&store, "w", "user:1", json!({"fresh": true}));

    let view = ViewProjection::spawn();
    let mut coordinator = attach(&store, &view, SyncConfig::without_fallback_poll());
    let stats = coordinator.drain().await.unwrap();
    assert_eq!(stats.transactions, 1);
    assert_eq!(view.get("user:1").await.unwrap(), Some(json!({"fresh": true})));
}

/// Rebuild hands out a new store identity and an empty directory.
#[test]
fn test_rebuild_resets_identity() {
    let dir = TempDir::new().unwrap();
    let store = open_store(dir.path());
    let old_id = store.store_id();
    commit_put(&store, "w", "user:1", json!({"a": 1}));
    store.close();

    let rebuilt = Store::rebuild(StoreDescriptor::new(dir.path())).unwrap();
    assert_ne!(
        rebuilt.store_id(),
        old_id,
        "GENERATION VIOLATION: rebuild kept the old store identity"
    );
    assert_eq!(rebuilt.live_record_count().unwrap(), 0);
    assert!(!dir.path().join("checkpoint.json").exists());
}
