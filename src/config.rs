//! Engine configuration
//!
//! Tuning knobs for the merge coordinator and change notification. All
//! defaults are conservative: pruning on, fallback polling on at a low
//! frequency. Disabling either changes liveness, never correctness.

use std::time::Duration;

/// Configuration for the synchronization engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Prune consumed log entries after each successful checkpoint advance.
    /// Pruning is best-effort; disabling it only lets the log grow.
    pub prune_on_checkpoint: bool,

    /// Interval for the fallback poll of the history log. The poller covers
    /// writers in other processes and lost change signals. `None` disables
    /// it, leaving delivery entirely to explicit signals.
    pub fallback_poll_interval: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            prune_on_checkpoint: true,
            fallback_poll_interval: Some(Duration::from_secs(2)),
        }
    }
}

impl SyncConfig {
    /// Config with the fallback poller disabled (signal-driven only).
    pub fn without_fallback_poll() -> Self {
        Self {
            fallback_poll_interval: None,
            ..Self::default()
        }
    }

    /// Config that never prunes the log.
    pub fn without_pruning() -> Self {
        Self {
            prune_on_checkpoint: false,
            ..Self::default()
        }
    }
}
