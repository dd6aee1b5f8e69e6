//! Events flowing from adapters to the user callback

use lookout_core::RelPath;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Kind of filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryType {
    File,
    Dir,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::File => f.write_str("file"),
            EntryType::Dir => f.write_str("dir"),
        }
    }
}

/// What happened to an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
    /// First half of a rename, reported by native adapters
    MovedFrom,
    /// Second half of a rename, reported by native adapters
    MovedTo,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
            ChangeKind::MovedFrom => "moved_from",
            ChangeKind::MovedTo => "moved_to",
        };
        f.write_str(name)
    }
}

/// Rename correlation id (the native back-end's tracker)
pub type Cookie = usize;

/// Hints an adapter passes along with an invalidation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeOptions {
    /// Classification already known to the adapter; skips the classifier
    pub change: Option<ChangeKind>,
    /// Rename correlation; cookie'd events are never silenced
    pub cookie: Option<Cookie>,
    /// Update the record without emitting events
    pub silence: bool,
}

impl ChangeOptions {
    /// Options carrying a known classification
    pub fn known(change: ChangeKind) -> Self {
        Self {
            change: Some(change),
            ..Self::default()
        }
    }

    /// Options that only refresh the record
    pub fn silent() -> Self {
        Self {
            silence: true,
            ..Self::default()
        }
    }

    /// Attach a rename cookie
    pub fn with_cookie(mut self, cookie: Option<Cookie>) -> Self {
        self.cookie = cookie;
        self
    }

    /// Options handed down to the children of a rescanned directory
    pub(crate) fn for_children(&self) -> Self {
        Self {
            silence: self.silence,
            ..Self::default()
        }
    }
}

/// One classified change, waiting for the processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEvent {
    pub entry_type: EntryType,
    pub change: ChangeKind,
    /// Watched root the path belongs to
    pub root: Arc<Path>,
    pub rel_path: RelPath,
    pub cookie: Option<Cookie>,
}

impl QueuedEvent {
    /// Absolute path of the changed entry
    pub fn full_path(&self) -> PathBuf {
        self.rel_path.to_path(&self.root)
    }
}

/// Outbound queue
pub type EventSender = crossbeam_channel::Sender<QueuedEvent>;

/// Batch handed to the user callback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    pub modified: Vec<PathBuf>,
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl Changes {
    /// Whether nothing changed
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }

    /// Total number of reported paths
    pub fn len(&self) -> usize {
        self.modified.len() + self.added.len() + self.removed.len()
    }
}
