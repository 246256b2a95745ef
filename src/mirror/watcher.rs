use super::error::{MirrorError, MirrorResult};
use super::ChangeEvent;
use notify::event::{AccessKind, AccessMode, MetadataKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Stopped,
    Watching,
}

/// Receiving ends handed out by [`ChangeWatcher::start`].
///
/// Both channels close once the watcher is stopped.
pub struct WatchStreams {
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
    pub errors: mpsc::UnboundedReceiver<notify::Error>,
}

/// Recursive OS-level watch on the source root.
pub struct ChangeWatcher {
    source_root: PathBuf,
    watcher: Option<RecommendedWatcher>,
}

impl ChangeWatcher {
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            watcher: None,
        }
    }

    pub fn state(&self) -> WatcherState {
        if self.watcher.is_some() {
            WatcherState::Watching
        } else {
            WatcherState::Stopped
        }
    }

    pub fn start(&mut self) -> MirrorResult<WatchStreams> {
        if self.watcher.is_some() {
            return Err(MirrorError::AlreadyWatching);
        }

        let (event_tx, events) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Send failures only mean the engine is gone; nothing left to notify
            match res {
                Ok(event) => {
                    if event.need_rescan() {
                        let _ = error_tx.send(notify::Error::generic(
                            "event queue overflowed, some changes were dropped",
                        ));
                    }
                    for change in qualifying_events(&event) {
                        let _ = event_tx.send(change);
                    }
                }
                Err(e) => {
                    let _ = error_tx.send(e);
                }
            }
        })?;

        watcher.watch(&self.source_root, RecursiveMode::Recursive)?;
        info!(path = %self.source_root.display(), "watcher started");

        self.watcher = Some(watcher);
        Ok(WatchStreams { events, errors })
    }

    /// Release the OS watch. Safe to call repeatedly or before `start`.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.source_root) {
                debug!(error = %e, "unwatch failed while stopping");
            }
            info!(path = %self.source_root.display(), "watcher stopped");
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Map a raw notification onto change events, ignoring the filesystem state.
pub fn translate(event: &Event) -> Vec<ChangeEvent> {
    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .map(|path| ChangeEvent::created(path.clone()))
            .collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => translate_rename(*mode, &event.paths),
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Other)
        | EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime))
        | EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))
        | EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            event
                .paths
                .iter()
                .map(|path| ChangeEvent::modified(path.clone()))
                .collect()
        }
        _ => Vec::new(),
    }
}

fn translate_rename(mode: RenameMode, paths: &[PathBuf]) -> Vec<ChangeEvent> {
    match (mode, paths) {
        (RenameMode::Both, [old, new, ..]) => {
            vec![ChangeEvent::renamed(Some(old.clone()), new.clone())]
        }
        (RenameMode::To, [new, ..]) => vec![ChangeEvent::renamed(None, new.clone())],
        _ => Vec::new(),
    }
}

/// Directories never propagate on their own; only regular-file changes do.
fn qualifying_events(event: &Event) -> Vec<ChangeEvent> {
    translate(event)
        .into_iter()
        .filter(|change| !change.path.is_dir())
        .collect()
}
