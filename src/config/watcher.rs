//! Nodes file watcher for hot reload.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::lifecycle::reload::ReloadSignal;

/// Fires the reload signal whenever the nodes file changes. The file is
/// not parsed here; the runner re-reads it through the node source.
pub struct NodesWatcher {
    path: PathBuf,
    reload: ReloadSignal,
}

impl NodesWatcher {
    pub fn new(path: &Path, reload: ReloadSignal) -> Self {
        Self {
            path: path.to_path_buf(),
            reload,
        }
    }

    /// Start watching. Keep the returned watcher alive for as long as
    /// events should be delivered.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let reload = self.reload.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Nodes file change detected, requesting reload");
                        reload.trigger();
                    }
                }
                Err(e) => tracing::error!(error = %e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Nodes watcher started");
        Ok(watcher)
    }
}
