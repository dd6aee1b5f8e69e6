//! Adapter on top of the platform's native notifications (via `notify`)
//!
//! The `notify` back-end delivers raw events on its own thread; they are
//! forwarded over a channel to one worker that maps each of them to a
//! dispatcher invalidation.

use super::{Adapter, AdapterKind};
use crate::change::Change;
use crate::error::Result;
use crate::event::{ChangeKind, ChangeOptions, Cookie, EntryType};
use crate::thread;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use lookout_core::RelPath;
use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, trace, warn};

type RawEvent = notify::Result<Event>;

/// Native adapter for one of the optimized variants
pub struct NativeAdapter {
    kind: AdapterKind,
    changes: Vec<Arc<Change>>,
    watcher: Option<RecommendedWatcher>,
    raw_rx: Receiver<RawEvent>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl NativeAdapter {
    /// Create the native watcher; fails when the platform API is unavailable
    pub fn new(kind: AdapterKind, changes: Vec<Arc<Change>>) -> Result<Self> {
        let (raw_tx, raw_rx) = unbounded();
        let watcher = notify::recommended_watcher(move |event: RawEvent| {
            // The receiver only goes away once the adapter is dropped
            let _ = raw_tx.send(event);
        })?;

        Ok(Self {
            kind,
            changes,
            watcher: Some(watcher),
            raw_rx,
            stop_tx: None,
            worker: None,
        })
    }
}

impl Adapter for NativeAdapter {
    fn kind(&self) -> AdapterKind {
        self.kind
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let Some(watcher) = self.watcher.as_mut() else {
            return Ok(());
        };

        // Watch before building so nothing slips between scan and subscription
        for change in &self.changes {
            watcher.watch(change.root(), RecursiveMode::Recursive)?;
        }
        for change in &self.changes {
            change.rebuild();
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let raw_rx = self.raw_rx.clone();
        let changes = self.changes.clone();
        let kind = self.kind;

        let worker = thread::spawn("native", move || {
            debug!("Watching {} root(s) with the {} adapter", changes.len(), kind);
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(raw_rx) -> message => match message {
                        Ok(Ok(event)) => dispatch(&changes, event),
                        Ok(Err(err)) => warn!("File watcher error: {}", err),
                        Err(_) => break,
                    },
                }
            }
            Ok(())
        })?;

        self.stop_tx = Some(stop_tx);
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        // Unsubscribe first so no new raw events arrive while the worker exits
        self.watcher.take();
        self.stop_tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                debug!("Native worker exited abnormally");
            }
        }
    }
}

impl Drop for NativeAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Route one raw event to the dispatchers
fn dispatch(changes: &[Arc<Change>], event: Event) {
    trace!("Raw event: {:?}", event);

    if event.need_rescan() {
        debug!("Back-end lost events, rescanning every root");
        for change in changes {
            change.invalidate(EntryType::Dir, &RelPath::root(), ChangeOptions::default());
        }
        return;
    }

    let cookie = event.tracker();
    for path in &event.paths {
        let Some((change, rel_path)) = locate(changes, path) else {
            trace!("Event outside watched roots: {}", path.display());
            continue;
        };
        if rel_path.is_root() {
            continue;
        }
        handle(change, &event.kind, path, &rel_path, cookie);
    }
}

fn handle(
    change: &Change,
    kind: &EventKind,
    path: &Path,
    rel_path: &RelPath,
    cookie: Option<Cookie>,
) {
    let entry_type = entry_type(change, kind, path, rel_path);

    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write))
        | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Metadata(_)) => {
            // Content and attribute changes inside a directory show up on its files
            if entry_type == EntryType::File {
                change.invalidate(EntryType::File, rel_path, ChangeOptions::default());
            }
        }
        EventKind::Access(_) => {}
        EventKind::Modify(ModifyKind::Name(mode)) => {
            let moved = match mode {
                RenameMode::From => Some(ChangeKind::MovedFrom),
                RenameMode::To => Some(ChangeKind::MovedTo),
                // inotify follows a tracked From/To pair with a Both summary
                RenameMode::Both if cookie.is_some() => return,
                RenameMode::Both | RenameMode::Any | RenameMode::Other => None,
            };
            match (entry_type, moved, cookie) {
                // A moved directory takes its whole subtree along
                (EntryType::Dir, ..) => {
                    change.invalidate(EntryType::Dir, rel_path, ChangeOptions::default())
                }
                (EntryType::File, Some(moved), Some(cookie)) => change.invalidate(
                    EntryType::File,
                    rel_path,
                    ChangeOptions::known(moved).with_cookie(Some(cookie)),
                ),
                (EntryType::File, ..) => {
                    change.invalidate(EntryType::File, rel_path, ChangeOptions::default())
                }
            }
        }
        EventKind::Create(_)
        | EventKind::Remove(_)
        | EventKind::Modify(_)
        | EventKind::Any
        | EventKind::Other => change.invalidate(entry_type, rel_path, ChangeOptions::default()),
    }
}

/// Best guess at the type of the entry an event is about
///
/// The event kind is trusted when it says; otherwise the live entry is
/// inspected, and for vanished entries the record is consulted.
fn entry_type(change: &Change, kind: &EventKind, path: &Path, rel_path: &RelPath) -> EntryType {
    match kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {
            return EntryType::Dir
        }
        EventKind::Create(CreateKind::File) | EventKind::Remove(RemoveKind::File) => {
            return EntryType::File
        }
        _ => {}
    }

    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => EntryType::Dir,
        Ok(_) => EntryType::File,
        Err(_) => change.known_type(rel_path).unwrap_or(EntryType::File),
    }
}

/// Dispatcher owning `path`; the deepest root wins when roots are nested
fn locate<'a>(changes: &'a [Arc<Change>], path: &Path) -> Option<(&'a Change, RelPath)> {
    changes
        .iter()
        .filter_map(|change| {
            RelPath::strip_root(change.root(), path).map(|rel_path| (change.as_ref(), rel_path))
        })
        .max_by_key(|(change, _)| change.root().components().count())
}
