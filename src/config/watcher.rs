//! Configuration file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Debounce window so an editor's write-then-rename settles before reloading
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Watches the config file and yields one reload request per burst of changes
///
/// The parent directory is watched rather than the file itself because saves
/// replace the file by rename, which would orphan a watch on the old inode.
/// Events arriving while a request is pending are folded into it.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<PathBuf>,
}

impl ConfigWatcher {
    pub fn new(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let (tx, rx) = mpsc::channel(1);

        let file_name = config_path
            .file_name()
            .map(|n| n.to_os_string())
            .context("Config path has no file name")?;
        let dir = match config_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // notify callbacks run on their own OS thread, not in Tokio context
        let runtime_handle = tokio::runtime::Handle::current();
        let watched = config_path.clone();
        let pending = Arc::new(AtomicBool::new(false));

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                    if !ours {
                        return;
                    }
                    if pending.swap(true, Ordering::AcqRel) {
                        return;
                    }
                    debug!("Config file changed: {:?}", event.paths);

                    let tx = tx.clone();
                    let path = watched.clone();
                    let pending = Arc::clone(&pending);
                    runtime_handle.spawn(async move {
                        tokio::time::sleep(DEBOUNCE).await;
                        pending.store(false, Ordering::Release);
                        // A full channel already holds a reload that has not run yet
                        let _ = tx.try_send(path);
                    });
                }
                Err(e) => {
                    error!("Watch error: {}", e);
                }
            }
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", dir.display()))?;

        info!("Config file watcher started for: {}", config_path.display());

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Wait for the next change notification
    /// Returns None if the watcher has been closed
    pub async fn next_change(&mut self) -> Option<PathBuf> {
        self.rx.recv().await
    }
}
