//! Change dispatcher
//!
//! Adapters report candidate paths here. The dispatcher filters them through
//! the silencer, brings the record up to date and pushes classified events
//! onto the outbound queue. Each watched root has its own dispatcher, which
//! owns that root's [`Record`] behind a mutex so at most one invalidation
//! mutates it at a time.

use crate::config::HashPolicy;
use crate::directory::{self, Walk};
use crate::event::{ChangeKind, ChangeOptions, Cookie, EntryType, EventSender, QueuedEvent};
use crate::file::classify;
use crate::record::{stat_file, Record};
use crate::silencer::SharedSilencer;
use lookout_core::{MonotonicTime, RelPath};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, trace};

/// Dispatcher for one watched root
#[derive(Debug)]
pub struct Change {
    root: Arc<Path>,
    record: Mutex<Record>,
    silencer: SharedSilencer,
    queue: EventSender,
    hash_policy: HashPolicy,
}

impl Change {
    pub fn new(
        record: Record,
        silencer: SharedSilencer,
        queue: EventSender,
        hash_policy: HashPolicy,
    ) -> Self {
        Self {
            root: Arc::clone(record.root()),
            record: Mutex::new(record),
            silencer,
            queue,
            hash_policy,
        }
    }

    /// Watched root
    pub fn root(&self) -> &Arc<Path> {
        &self.root
    }

    /// Rebuild the record from scratch
    pub fn rebuild(&self) {
        let started = MonotonicTime::now();
        let mut record = self.record.lock();
        record.build(&self.silencer);
        info!(
            "Record for {} built in {:.3}s ({} files)",
            self.root.display(),
            started.elapsed().as_secs_f64(),
            record.tree().file_count()
        );
    }

    /// Recorded type of `rel_path`
    pub fn known_type(&self, rel_path: &RelPath) -> Option<EntryType> {
        self.record.lock().entry_type(rel_path)
    }

    /// Number of files currently recorded
    pub fn file_count(&self) -> usize {
        self.record.lock().tree().file_count()
    }

    /// Bring `rel_path` up to date and queue whatever changed
    ///
    /// Directory invalidations rescan the directory and then every child
    /// found on disk or in the record, breadth-first, while holding the
    /// record lock.
    pub fn invalidate(&self, entry_type: EntryType, rel_path: &RelPath, options: ChangeOptions) {
        let mut record = self.record.lock();
        let mut walk = Walk::new(&self.root);
        walk.push(entry_type, rel_path.clone(), options);

        while let Some(item) = walk.pop() {
            self.invalidate_one(
                &mut record,
                item.entry_type,
                &item.rel_path,
                item.options,
                &mut walk,
            );
        }
    }

    fn invalidate_one(
        &self,
        record: &mut Record,
        entry_type: EntryType,
        rel_path: &RelPath,
        options: ChangeOptions,
        walk: &mut Walk,
    ) {
        // Rename halves must reach the optimizer to be paired up
        if options.cookie.is_none() && self.silencer.read().is_silenced(rel_path, entry_type) {
            trace!("(silenced) {} {}", entry_type, rel_path);
            return;
        }

        if let Some(change) = options.change {
            self.sync_known(record, entry_type, rel_path, change);
            if !options.silence {
                self.enqueue(entry_type, change, rel_path, options.cookie);
            }
            return;
        }

        match entry_type {
            EntryType::Dir => directory::scan(record, rel_path, options, walk),
            EntryType::File => {
                if record.entry_type(rel_path) == Some(EntryType::Dir) {
                    directory::forget(record, rel_path, options, walk);
                }
                let verdict = classify(record, rel_path, &self.hash_policy);
                trace!("{} {} => {:?}", entry_type, rel_path, verdict);
                if let Some(change) = verdict.change() {
                    if !options.silence {
                        self.enqueue(entry_type, change, rel_path, None);
                    }
                }
            }
        }
    }

    /// Apply a classification the adapter already knows to the record
    fn sync_known(
        &self,
        record: &mut Record,
        entry_type: EntryType,
        rel_path: &RelPath,
        change: ChangeKind,
    ) {
        match (change, entry_type) {
            (ChangeKind::Removed | ChangeKind::MovedFrom, _) => record.unset_path(rel_path),
            (_, EntryType::Dir) => record.add_dir(rel_path),
            (_, EntryType::File) => match stat_file(&rel_path.to_path(&self.root)) {
                Ok(data) => record.update_file(rel_path, data),
                Err(_) => record.unset_path(rel_path),
            },
        }
    }

    fn enqueue(
        &self,
        entry_type: EntryType,
        change: ChangeKind,
        rel_path: &RelPath,
        cookie: Option<Cookie>,
    ) {
        let event = QueuedEvent {
            entry_type,
            change,
            root: Arc::clone(&self.root),
            rel_path: rel_path.clone(),
            cookie,
        };
        if self.queue.send(event).is_err() {
            trace!("Event queue closed, dropping {} {}", change, rel_path);
        }
    }
}
