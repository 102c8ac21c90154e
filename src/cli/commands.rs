//! CLI command implementations
//!
//! Thin operator tooling over the library API. Each command opens the store
//! the same way an embedding process would, does one thing, prints one JSON
//! response, and exits; nothing here holds state across invocations.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::SyncConfig;
use crate::merge::MergeCoordinator;
use crate::projection::ViewProjection;
use crate::store::{Store, StoreDescriptor};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command. This is the
/// only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { store, no_history } => init(&store, no_history),
        Command::Status { store } => status(&store),
        Command::History { store } => history(&store),
        Command::Drain { store } => drain(&store),
        Command::Rebuild { store } => rebuild(&store),
    }
}

/// Initialize an empty store directory
pub fn init(store_dir: &Path, no_history: bool) -> CliResult<()> {
    if is_initialized(store_dir) {
        return Err(CliError::already_initialized());
    }

    let mut descriptor = StoreDescriptor::new(store_dir);
    if no_history {
        descriptor = descriptor.without_history_tracking();
    }
    let store = Store::open(descriptor)?;

    write_response(json!({
        "history_tracking": !no_history,
        "initialized": true,
        "location": store_dir.display().to_string(),
        "store_id": store.store_id().to_string(),
    }))?;

    Ok(())
}

/// Print store metadata, checkpoint, and retained-log summary
pub fn status(store_dir: &Path) -> CliResult<()> {
    if !is_initialized(store_dir) {
        return Err(CliError::not_initialized());
    }

    let store = Store::open(StoreDescriptor::new(store_dir))?;
    let checkpoint = store.checkpoint_slot()?.load().ok().flatten();

    let history = match store.log_reader()?.transactions_after(None) {
        Ok(transactions) => json!({
            "available": true,
            "latest_token": transactions.last().map(|t| t.token.value()),
            "retained": transactions.len(),
        }),
        Err(e) => json!({
            "available": false,
            "reason": e.to_string(),
        }),
    };

    write_response(json!({
        "checkpoint": checkpoint.map(|t| t.value()),
        "history": history,
        "live_records": store.live_record_count()?,
        "location": store_dir.display().to_string(),
        "state": store.state().as_str(),
        "store_id": store.store_id().to_string(),
    }))?;

    Ok(())
}

/// Dump the retained transaction history
pub fn history(store_dir: &Path) -> CliResult<()> {
    if !is_initialized(store_dir) {
        return Err(CliError::not_initialized());
    }

    let store = Store::open(StoreDescriptor::new(store_dir))?;
    let transactions = store.log_reader()?.transactions_after(None)?;

    let entries: Vec<Value> = transactions
        .iter()
        .map(|txn| {
            json!({
                "affected": txn.affected.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
                "author": txn.author,
                "timestamp": txn.timestamp.to_rfc3339(),
                "token": txn.token.value(),
            })
        })
        .collect();

    write_response(json!({
        "retained": entries.len(),
        "transactions": entries,
    }))?;

    Ok(())
}

/// Run merge cycles to completion against a throwaway projection
///
/// Replays the retained log into a fresh in-process view, advancing (and by
/// default pruning behind) the on-disk checkpoint exactly as an embedding
/// process would. The view is discarded; the checkpoint movement is the
/// point.
pub fn drain(store_dir: &Path) -> CliResult<()> {
    if !is_initialized(store_dir) {
        return Err(CliError::not_initialized());
    }

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::io_error(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        let store = Arc::new(Store::open(StoreDescriptor::new(store_dir))?);
        let view = ViewProjection::spawn();
        let mut coordinator = MergeCoordinator::attach(
            Arc::clone(&store),
            view.clone(),
            SyncConfig::without_fallback_poll(),
        )?;

        let stats = coordinator.drain().await?;
        let view_records = view
            .len()
            .await
            .map_err(|e| CliError::merge_failed(e.to_string()))?;
        coordinator.shutdown().await;

        write_response(json!({
            "checkpoint": stats.checkpoint.map(|t| t.value()),
            "cycles": stats.cycles,
            "projected_records": stats.records,
            "transactions": stats.transactions,
            "view_records": view_records,
        }))?;

        Ok(())
    })
}

/// Destroy the store and recreate it with a fresh identity
pub fn rebuild(store_dir: &Path) -> CliResult<()> {
    let store = Store::rebuild(StoreDescriptor::new(store_dir))?;

    write_response(json!({
        "location": store_dir.display().to_string(),
        "rebuilt": true,
        "store_id": store.store_id().to_string(),
    }))?;

    Ok(())
}

fn is_initialized(store_dir: &Path) -> bool {
    StoreDescriptor::new(store_dir).meta_path().exists()
}
