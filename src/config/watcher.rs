//! File change notifications for hot reload.
//!
//! [`FileWatcher`] watches the directory holding a file so that editors which
//! replace the file by rename are seen as well as in-place writes. Events for
//! other files in that directory are ignored.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{AccessKind, AccessMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{GatewayError, Result};

/// Events arriving within this window after the first one are folded into a
/// single change.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

pub struct FileWatcher {
    path: PathBuf,
    events: mpsc::UnboundedReceiver<()>,
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher").field("path", &self.path).finish()
    }
}

impl FileWatcher {
    /// Start watching `path`. `poll_interval` applies only on platforms where
    /// notify falls back to polling.
    pub fn new(path: &Path, poll_interval: Duration) -> Result<Self> {
        let file_name = path.file_name().map(|n| n.to_os_string()).ok_or_else(|| {
            GatewayError::validation_field(
                format!("Cannot watch '{}': not a file path", path.display()),
                "path",
            )
        })?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, events) = mpsc::unbounded_channel();
        let watched = path.to_path_buf();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_change(&event, &file_name) {
                        let _ = tx.send(());
                    }
                }
                Err(e) => warn!(path = %watched.display(), error = %e, "File watch error"),
            },
            Config::default().with_poll_interval(poll_interval),
        )
        .map_err(|e| watch_error(path, e))?;

        watcher.watch(&dir, RecursiveMode::NonRecursive).map_err(|e| watch_error(path, e))?;
        debug!(path = %path.display(), "Watching file for changes");

        Ok(Self { path: path.to_path_buf(), events, _watcher: watcher })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next change to the file. Returns `false` once `ctx` is
    /// cancelled or the watcher has stopped.
    pub async fn changed(&mut self, ctx: &CancellationToken) -> bool {
        let received = tokio::select! {
            biased;
            _ = ctx.cancelled() => return false,
            event = self.events.recv() => event.is_some(),
        };
        if !received {
            return false;
        }

        // a single save usually produces several events
        tokio::select! {
            biased;
            _ = ctx.cancelled() => return false,
            _ = tokio::time::sleep(SETTLE_DELAY) => {}
        }
        while self.events.try_recv().is_ok() {}
        true
    }
}

fn is_change(event: &Event, file_name: &OsString) -> bool {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Modify(_)
            | EventKind::Remove(_)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    );
    relevant && event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str()))
}

fn watch_error(path: &Path, e: notify::Error) -> GatewayError {
    GatewayError::config_with_source(format!("Failed to watch '{}'", path.display()), Box::new(e))
}
