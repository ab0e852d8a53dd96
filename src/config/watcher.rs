//! Configuration file watcher for hot reload.
//!
//! Editors tend to touch a file several times per save (truncate, write,
//! rename), so filesystem events are coalesced: the file is re-read once
//! the events stop for [`DEBOUNCE`]. A reload that fails to parse keeps the
//! running configuration; one that parses is validated, its problems are
//! logged, and it is pushed only if it differs from the last one pushed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::TelemetryConfig;
use crate::config::validation::validate_config;

/// Quiet period after the last file event before the file is re-read.
pub const DEBOUNCE: Duration = Duration::from_millis(200);

/// Watches the configuration file and publishes reloaded configs.
pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    update_tx: mpsc::UnboundedSender<TelemetryConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<TelemetryConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                debounce: DEBOUNCE,
                update_tx,
            },
            update_rx,
        )
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching the file. Must be called inside a Tokio runtime.
    ///
    /// The returned watcher must be kept alive; dropping it stops the reload task.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let _ = tick_tx.send(());
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        let ConfigWatcher {
            path,
            debounce,
            update_tx,
        } = self;
        tracing::info!(path = ?path, debounce_ms = debounce.as_millis() as u64, "Config watcher started");

        tokio::spawn(async move {
            let mut last_pushed: Option<Value> = None;
            coalesce(tick_rx, debounce, || reload(&path, &update_tx, &mut last_pushed)).await;
        });

        Ok(watcher)
    }
}

/// Calls `on_settled` once per burst of ticks, after `window` without a new one.
/// Returns when the tick sender is gone.
async fn coalesce<F>(mut ticks: mpsc::UnboundedReceiver<()>, window: Duration, mut on_settled: F)
where
    F: FnMut(),
{
    while ticks.recv().await.is_some() {
        loop {
            match tokio::time::timeout(window, ticks.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => {
                    on_settled();
                    return;
                }
                Err(_) => break,
            }
        }
        on_settled();
    }
}

fn reload(
    path: &Path,
    update_tx: &mpsc::UnboundedSender<TelemetryConfig>,
    last_pushed: &mut Option<Value>,
) {
    tracing::info!(path = ?path, "Config file change detected, reloading");
    let config = match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
            return;
        }
    };

    for problem in validate_config(&config) {
        tracing::warn!(problem = %problem, "Reloaded configuration problem");
    }

    let snapshot = serde_json::to_value(&config).ok();
    if snapshot.is_some() && snapshot == *last_pushed {
        tracing::debug!(path = ?path, "Config unchanged, nothing to apply");
        return;
    }
    *last_pushed = snapshot;
    let _ = update_tx.send(config);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reload_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.toml");
        fs::write(&path, "[http_logging]\nslow_request_threshold_ms = 100\n").unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(&path);
        let _guard = watcher.with_debounce(Duration::from_millis(50)).run().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&path, "[http_logging]\nslow_request_threshold_ms = 900\n").unwrap();

        let config = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match rx.recv().await {
                    Some(c) if c.http_logging.slow_request_threshold_ms == 900 => break Some(c),
                    Some(_) => continue,
                    None => break None,
                }
            }
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(config.http_logging.slow_request_threshold_ms, 900);
    }

    #[tokio::test]
    async fn test_burst_of_events_settles_once() {
        let (tx, rx) = mpsc::unbounded_channel();
        let settled = Arc::new(AtomicUsize::new(0));
        let count = settled.clone();
        let task = tokio::spawn(coalesce(rx, Duration::from_millis(100), move || {
            count.fetch_add(1, Ordering::SeqCst);
        }));

        for _ in 0..5 {
            tx.send(()).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(settled.load(Ordering::SeqCst), 1);

        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(settled.load(Ordering::SeqCst), 2);

        drop(tx);
        task.await.unwrap();
        assert_eq!(settled.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unchanged_or_broken_reload_is_not_pushed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.toml");
        fs::write(&path, "[http_logging]\nslow_request_threshold_ms = 300\n").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut last = None;

        reload(&path, &tx, &mut last);
        reload(&path, &tx, &mut last);
        fs::write(&path, "[http_logging\n").unwrap();
        reload(&path, &tx, &mut last);
        fs::write(&path, "[http_logging]\nslow_request_threshold_ms = 400\n").unwrap();
        reload(&path, &tx, &mut last);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.http_logging.slow_request_threshold_ms, 300);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.http_logging.slow_request_threshold_ms, 400);
        assert!(rx.try_recv().is_err());
    }
}
