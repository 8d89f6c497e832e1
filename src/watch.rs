//! # Filesystem Watcher
//!
//! [`FileWatcher`] registers change notifications for the served tree once at startup and then
//! runs a loop that pushes `reload` to every open browser channel whenever a watched file is
//! written.
//!
//! ## Watch set
//!
//! The set of watched paths is built by a single recursive walk in [`FileWatcher::watch_tree`]
//! and is never updated afterwards: files or directories created after startup are not picked
//! up until the process restarts.
//!
//! - [`WatchGranularity::Files`] registers every `.html`, `.css` and `.js` file.
//! - [`WatchGranularity::Directories`] registers every directory, and any write inside one
//!   triggers a reload.
//!
//! ## Threading Model
//!
//! `notify` delivers events on its own thread. The callback only forwards them into an
//! unbounded tokio channel; [`FileWatcher::run`] consumes that channel on a tokio task and
//! stops when the shared [`CancellationToken`] fires.
//!
//! Every qualifying write produces its own broadcast. There is no debouncing.
//!
//! ## Error Handling
//!
//! - Failing to create the OS watcher, or to read the served root itself, is fatal and returned
//!   to the caller.
//! - Errors on individual entries during the walk, failures to register a single path, and
//!   errors delivered by `notify` while running are logged and skipped.

use crate::{
    config::WatchGranularity,
    error::LivedirError,
    registry::{ConnectionRegistry, RELOAD_MESSAGE},
};
use axum::extract::ws::Message;
use futures::Sink;
use notify::{event::ModifyKind, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::{
    fmt,
    path::{Path, PathBuf},
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// File extensions that trigger a reload in [`WatchGranularity::Files`] mode.
pub const WATCHED_EXTENSIONS: [&str; 3] = ["html", "css", "js"];

pub struct FileWatcher {
    watcher: RecommendedWatcher,
    events: UnboundedReceiver<notify::Result<Event>>,
    granularity: WatchGranularity,
    watch_set: Vec<PathBuf>,
}

impl FileWatcher {
    pub fn new(granularity: WatchGranularity) -> Result<Self, LivedirError> {
        let (tx, events) = unbounded_channel();
        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            // The receiver only goes away once the run loop has exited.
            let _ = tx.send(result);
        })?;
        Ok(FileWatcher {
            watcher,
            events,
            granularity,
            watch_set: Vec::new(),
        })
    }

    pub fn granularity(&self) -> WatchGranularity {
        self.granularity
    }

    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watch_set
    }

    /// Walk `root` and register every qualifying entry. Returns the number of paths added.
    #[tracing::instrument(skip(self), fields(granularity = %self.granularity))]
    pub fn watch_tree(&mut self, root: &Path) -> Result<usize, LivedirError> {
        let root_meta = std::fs::metadata(root)?;
        if !root_meta.is_dir() {
            return Err(LivedirError::NotFound(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let mut added = 0;
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if e.depth() == 0 {
                        return Err(e.into());
                    }
                    tracing::warn!("Walker error: {}", e);
                    continue;
                }
            };

            let qualifies = match self.granularity {
                WatchGranularity::Files => {
                    entry.file_type().is_file() && has_watched_extension(entry.path())
                }
                WatchGranularity::Directories => entry.file_type().is_dir(),
            };
            if !qualifies {
                continue;
            }

            match self.watcher.watch(entry.path(), RecursiveMode::NonRecursive) {
                Ok(()) => {
                    tracing::debug!("Watching {}", entry.path().display());
                    self.watch_set.push(entry.path().to_path_buf());
                    added += 1;
                }
                Err(e) => {
                    tracing::warn!("Watcher error: {}", LivedirError::from(e));
                }
            }
        }

        tracing::info!("Watching {} path(s) under {}", added, root.display());
        Ok(added)
    }

    /// Whether `event` is a content write on a path this watcher cares about.
    pub fn is_reload_trigger(&self, event: &Event) -> bool {
        is_reload_trigger(self.granularity, event)
    }

    /// Handle one item from the notify channel, broadcasting `reload` if it qualifies.
    /// Returns whether a broadcast was sent.
    pub async fn handle_event<S>(
        &self,
        result: notify::Result<Event>,
        registry: &ConnectionRegistry<S>,
    ) -> bool
    where
        S: Sink<Message> + Unpin + Send,
        S::Error: fmt::Display,
    {
        dispatch(self.granularity, result, registry).await
    }

    /// Run the watch loop until `cancel` fires or the event source closes.
    pub async fn run<S>(self, registry: ConnectionRegistry<S>, cancel: CancellationToken)
    where
        S: Sink<Message> + Unpin + Send,
        S::Error: fmt::Display,
    {
        // The OS watcher must outlive the loop or the event source closes.
        let FileWatcher {
            watcher: _watcher,
            mut events,
            granularity,
            watch_set,
        } = self;

        tracing::info!(
            "[FileWatcher] Watch loop started ({} paths)",
            watch_set.len()
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("[FileWatcher] Cancelled");
                    break;
                }
                maybe_event = events.recv() => match maybe_event {
                    Some(result) => {
                        dispatch(granularity, result, &registry).await;
                    }
                    None => {
                        tracing::warn!("[FileWatcher] Event source closed");
                        break;
                    }
                },
            }
        }
        tracing::info!("[FileWatcher] Watch loop stopped");
    }
}

fn is_reload_trigger(granularity: WatchGranularity, event: &Event) -> bool {
    let is_write = matches!(
        event.kind,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
    );
    if !is_write {
        return false;
    }
    match granularity {
        WatchGranularity::Files => event.paths.iter().any(|p| has_watched_extension(p)),
        WatchGranularity::Directories => true,
    }
}

async fn dispatch<S>(
    granularity: WatchGranularity,
    result: notify::Result<Event>,
    registry: &ConnectionRegistry<S>,
) -> bool
where
    S: Sink<Message> + Unpin + Send,
    S::Error: fmt::Display,
{
    match result {
        Ok(event) => {
            if !is_reload_trigger(granularity, &event) {
                tracing::trace!("Ignoring {:?}", event);
                return false;
            }
            for path in event.paths.iter() {
                tracing::info!("Modified file: {}", path.display());
            }
            registry.broadcast(RELOAD_MESSAGE).await;
            true
        }
        Err(e) => {
            tracing::warn!("Watcher error: {}", LivedirError::from(e));
            false
        }
    }
}

fn has_watched_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| WATCHED_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}
