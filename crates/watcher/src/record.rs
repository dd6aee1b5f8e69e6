//! In-memory snapshot of one watched root
//!
//! A `Record` remembers the metadata of every file and directory under its
//! root as of the last scan. It is built once when watching starts and then
//! mutated incrementally by the change dispatcher, which owns it behind a
//! mutex.

use crate::event::EntryType;
use crate::silencer::SharedSilencer;
use crate::symlink::SymlinkDetector;
use lookout_core::{FileMeta, Node, RelPath, Tree};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Snapshot of a watched root
#[derive(Debug)]
pub struct Record {
    root: Arc<Path>,
    tree: Tree,
}

impl Record {
    /// Empty record for `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        Self {
            root: Arc::from(root),
            tree: Tree::new(),
        }
    }

    /// Watched root (immutable)
    pub fn root(&self) -> &Arc<Path> {
        &self.root
    }

    /// Underlying snapshot tree
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Replace the tree with a fresh breadth-first scan of the root
    ///
    /// Silenced entries are skipped without descending. Entries that vanish
    /// or cannot be read are pruned; a symlink leading back to one of its
    /// own ancestors is pruned with a warning.
    pub fn build(&mut self, silencer: &SharedSilencer) {
        self.tree.clear();
        let mut detector = SymlinkDetector::new(&self.root);
        let mut remaining = VecDeque::from([RelPath::root()]);

        while let Some(rel_path) = remaining.pop_front() {
            self.build_entry(rel_path, silencer, &mut detector, &mut remaining);
        }
    }

    fn build_entry(
        &mut self,
        rel_path: RelPath,
        silencer: &SharedSilencer,
        detector: &mut SymlinkDetector,
        remaining: &mut VecDeque<RelPath>,
    ) {
        let full_path = rel_path.to_path(&self.root);

        // Follow symlinks to learn what the entry points at
        let meta = match fs::metadata(&full_path) {
            Ok(meta) => meta,
            Err(err) => {
                trace!("Pruning {}: {}", rel_path, err);
                self.tree.unset(&rel_path);
                return;
            }
        };
        let entry_type = if meta.is_dir() { EntryType::Dir } else { EntryType::File };

        if !rel_path.is_root() && silencer.read().is_silenced(&rel_path, entry_type) {
            trace!("(silenced) {}: {}", entry_type, rel_path);
            return;
        }

        match entry_type {
            EntryType::File => match stat_file(&full_path) {
                Ok(data) => {
                    self.tree.update_file(&rel_path, data);
                }
                Err(err) => {
                    trace!("Pruning {}: {}", rel_path, err);
                    self.tree.unset(&rel_path);
                }
            },
            EntryType::Dir => {
                if let Err(err) = detector.verify_unwatched(&rel_path, &meta) {
                    warn!("{}", err);
                    self.tree.unset(&rel_path);
                    return;
                }
                match read_children(&full_path) {
                    Ok(children) => {
                        self.tree.add_dir(&rel_path);
                        remaining.extend(children.iter().map(|(name, _)| rel_path.join(name)));
                    }
                    Err(err) => {
                        debug!("Cannot read directory {}: {}", full_path.display(), err);
                        self.tree.unset(&rel_path);
                    }
                }
            }
        }
    }

    /// Record a directory (and its parents); no-op for the root
    pub fn add_dir(&mut self, rel_path: &RelPath) {
        self.tree.add_dir(rel_path);
    }

    /// Record file metadata
    pub fn update_file(&mut self, rel_path: &RelPath, data: FileMeta) {
        if !self.tree.update_file(rel_path, data) {
            debug!("Ignoring file metadata for the watched root itself");
        }
    }

    /// Forget an entry (and its subtree); the root forgets everything
    pub fn unset_path(&mut self, rel_path: &RelPath) {
        self.tree.unset(rel_path);
    }

    /// Recorded metadata of a file
    pub fn file_data(&self, rel_path: &RelPath) -> Option<&FileMeta> {
        self.tree.file(rel_path)
    }

    /// Names and types of the recorded children of a directory
    pub fn dir_entries(&self, rel_path: &RelPath) -> Vec<(String, EntryType)> {
        let Some(dir) = self.tree.dir(rel_path) else {
            return Vec::new();
        };
        dir.entries()
            .map(|(name, node)| (name.to_string(), node_type(node)))
            .collect()
    }

    /// Type of a recorded entry; the root is a directory
    pub fn entry_type(&self, rel_path: &RelPath) -> Option<EntryType> {
        if rel_path.is_root() {
            return Some(EntryType::Dir);
        }
        self.tree.get(rel_path).map(node_type)
    }

    /// Every recorded file at or below `rel_path`
    pub fn files_under(&self, rel_path: &RelPath) -> Vec<RelPath> {
        self.tree.files_under(rel_path)
    }
}

fn node_type(node: &Node) -> EntryType {
    if node.is_dir() {
        EntryType::Dir
    } else {
        EntryType::File
    }
}

/// `lstat` a file into record metadata
pub(crate) fn stat_file(path: &Path) -> io::Result<FileMeta> {
    FileMeta::from_metadata(&fs::symlink_metadata(path)?)
}

/// List a directory's children with their (symlink-followed) types
///
/// A child that cannot be stat'ed (dangling symlink, vanished) is listed as
/// a file; the classifier sorts it out.
pub(crate) fn read_children(dir: &Path) -> io::Result<Vec<(String, EntryType)>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_dir = fs::metadata(entry.path())
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        let entry_type = if is_dir { EntryType::Dir } else { EntryType::File };
        children.push((entry.file_name().to_string_lossy().into_owned(), entry_type));
    }
    Ok(children)
}
