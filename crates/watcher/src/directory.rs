//! Bounded directory rescans
//!
//! A directory invalidation never recurses on the call stack. Instead the
//! scan pushes one invalidation per child onto the dispatcher's [`Walk`],
//! which drains them in order. Children that are on disk are pushed with
//! their live type, children only the record remembers are pushed with
//! their recorded type so the classifier can report them removed.

use crate::event::{ChangeKind, ChangeOptions, EntryType};
use crate::record::{read_children, Record};
use crate::symlink::SymlinkDetector;
use lookout_core::RelPath;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use tracing::{debug, trace, warn};

/// One queued call to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Invalidation {
    pub entry_type: EntryType,
    pub rel_path: RelPath,
    pub options: ChangeOptions,
}

/// Work queue for one top-level invalidation
#[derive(Debug)]
pub(crate) struct Walk {
    pending: VecDeque<Invalidation>,
    symlinks: SymlinkDetector,
}

impl Walk {
    pub(crate) fn new(root: &Path) -> Self {
        Self {
            pending: VecDeque::new(),
            symlinks: SymlinkDetector::new(root),
        }
    }

    pub(crate) fn push(
        &mut self,
        entry_type: EntryType,
        rel_path: RelPath,
        options: ChangeOptions,
    ) {
        self.pending.push_back(Invalidation {
            entry_type,
            rel_path,
            options,
        });
    }

    pub(crate) fn pop(&mut self) -> Option<Invalidation> {
        self.pending.pop_front()
    }
}

/// Rescan one directory level, queueing its children on `walk`
pub(crate) fn scan(
    record: &mut Record,
    rel_path: &RelPath,
    options: ChangeOptions,
    walk: &mut Walk,
) {
    let full_path = rel_path.to_path(record.root());
    let child_options = options.for_children();

    let meta = match fs::metadata(&full_path) {
        Ok(meta) => meta,
        Err(err) => {
            trace!("Directory {} vanished: {}", rel_path, err);
            if record.entry_type(rel_path) == Some(EntryType::File) {
                walk.push(EntryType::File, rel_path.clone(), child_options);
            } else {
                forget(record, rel_path, options, walk);
            }
            return;
        }
    };

    if !meta.is_dir() {
        trace!("{} is no longer a directory", rel_path);
        if record.entry_type(rel_path) == Some(EntryType::Dir) {
            forget(record, rel_path, options, walk);
        }
        walk.push(EntryType::File, rel_path.clone(), child_options);
        return;
    }

    if let Err(err) = walk.symlinks.verify_unwatched(rel_path, &meta) {
        warn!("{}", err);
        forget(record, rel_path, options, walk);
        return;
    }

    let current = match read_children(&full_path) {
        Ok(current) => current,
        Err(err) => {
            debug!("Cannot read directory {}: {}", full_path.display(), err);
            return;
        }
    };

    let previous = record.dir_entries(rel_path);
    record.add_dir(rel_path);

    for (name, entry_type) in &current {
        walk.push(*entry_type, rel_path.join(name), child_options);
    }
    for (name, entry_type) in previous {
        if !current.iter().any(|(current_name, _)| *current_name == name) {
            walk.push(entry_type, rel_path.join(&name), child_options);
        }
    }
}

/// Drop a recorded directory, queueing a removal for every file under it
///
/// Queued removals carry a known classification because the record no
/// longer remembers them by the time they are processed.
pub(crate) fn forget(
    record: &mut Record,
    rel_path: &RelPath,
    options: ChangeOptions,
    walk: &mut Walk,
) {
    let removed = ChangeOptions {
        change: Some(ChangeKind::Removed),
        ..options.for_children()
    };
    for file in record.files_under(rel_path) {
        walk.push(EntryType::File, file, removed);
    }
    record.unset_path(rel_path);
}
