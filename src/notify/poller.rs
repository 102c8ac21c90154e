//! Fallback polling for out-of-process writers
//!
//! In-process writer sessions signal the hub directly. A writer in another
//! process cannot, so this task stats the history log on an interval and
//! signals the hub whenever the observed length changes. False wakeups are
//! harmless: the merge cycle re-reads the log and no-ops when nothing new
//! is there.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::notify::hub::ChangeHub;
use crate::observability::{Event, Logger};

/// Periodic safety net behind hub signalling.
pub struct FallbackPoller {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl FallbackPoller {
    /// Spawns the polling task watching `log_path` every `interval`.
    ///
    /// The length baseline is taken here, before the task is spawned, so
    /// an append landing between `spawn` and the first poll tick is still
    /// a visible change rather than part of the baseline.
    pub fn spawn(log_path: PathBuf, hub: ChangeHub, interval: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let shutdown_signal = shutdown.clone();
        let mut last_len = observed_len(&log_path);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_signal.notified() => break,
                    _ = tokio::time::sleep(interval) => {
                        let len = observed_len(&log_path);
                        if len != last_len {
                            last_len = len;
                            Logger::info(
                                Event::FallbackPollTriggered,
                                &[("log_path", &log_path.display().to_string())],
                            );
                            hub.signal();
                        }
                    }
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Stops the polling task and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        let _ = (&mut self.handle).await;
    }
}

impl Drop for FallbackPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn observed_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path).map(|m| m.len()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_poller_signals_on_append() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("history.log");
        std::fs::write(&log_path, b"").unwrap();

        let hub = ChangeHub::new();
        let listener = hub.subscribe();
        let poller = FallbackPoller::spawn(
            log_path.clone(),
            hub.clone(),
            Duration::from_millis(10),
        );

        // Grow the file the way a foreign writer would
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&log_path)
            .unwrap();
        file.write_all(b"some appended bytes").unwrap();

        timeout(Duration::from_secs(2), listener.changed())
            .await
            .expect("poller should notice the length change");

        poller.shutdown().await;
    }

    #[tokio::test]
    async fn test_poller_is_quiet_without_changes() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("history.log");
        std::fs::write(&log_path, b"stable").unwrap();

        let hub = ChangeHub::new();
        let listener = hub.subscribe();
        let poller = FallbackPoller::spawn(
            log_path,
            hub.clone(),
            Duration::from_millis(10),
        );

        let woke = timeout(Duration::from_millis(100), listener.changed()).await;
        assert!(woke.is_err());

        poller.shutdown().await;
    }

    #[tokio::test]
    async fn test_poller_notices_file_creation() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("history.log");

        let hub = ChangeHub::new();
        let listener = hub.subscribe();
        let poller = FallbackPoller::spawn(
            log_path.clone(),
            hub.clone(),
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        std::fs::write(&log_path, b"first transaction").unwrap();

        timeout(Duration::from_secs(2), listener.changed())
            .await
            .expect("poller should notice the file appearing");

        poller.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_task() {
        let dir = TempDir::new().unwrap();
        let hub = ChangeHub::new();
        let poller = FallbackPoller::spawn(
            dir.path().join("history.log"),
            hub,
            Duration::from_millis(10),
        );

        timeout(Duration::from_secs(1), poller.shutdown())
            .await
            .expect("shutdown should not hang");
    }
}
