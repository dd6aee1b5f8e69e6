//! Detects symlinks that lead back into their own ancestry
//!
//! Two paths to the same directory are fine (`docs -> src` records both);
//! only a directory that is also one of its own ancestors would make a
//! traversal endless.

use crate::error::{Error, Result};
use lookout_core::RelPath;
use std::collections::HashMap;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};

#[cfg(unix)]
type DirId = (u64, u64);

#[cfg(not(unix))]
type DirId = PathBuf;

/// Directory identities seen during one traversal, by relative path
#[derive(Debug)]
pub(crate) struct SymlinkDetector {
    root: PathBuf,
    ids: HashMap<RelPath, DirId>,
}

impl SymlinkDetector {
    pub(crate) fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ids: HashMap::new(),
        }
    }

    /// Register directory `rel_path`; fails if it is the same directory as
    /// one of its ancestors
    pub(crate) fn verify_unwatched(&mut self, rel_path: &RelPath, meta: &Metadata) -> Result<()> {
        let path = rel_path.to_path(&self.root);
        let id = dir_id(&path, meta)?;

        let mut ancestor = rel_path.parent();
        while let Some(parent) = ancestor {
            if self.id_of(&parent).as_ref() == Some(&id) {
                return Err(Error::SymlinkLoop {
                    path,
                    watched_as: parent.to_path(&self.root),
                });
            }
            ancestor = parent.parent();
        }

        self.ids.insert(rel_path.clone(), id);
        Ok(())
    }

    /// Identity of an ancestor, stat'ed on first use when the traversal
    /// started below it
    fn id_of(&mut self, rel_path: &RelPath) -> Option<DirId> {
        if !self.ids.contains_key(rel_path) {
            let path = rel_path.to_path(&self.root);
            let id = dir_id(&path, &fs::metadata(&path).ok()?).ok()?;
            self.ids.insert(rel_path.clone(), id);
        }
        self.ids.get(rel_path).cloned()
    }
}

#[cfg(unix)]
fn dir_id(_path: &Path, meta: &Metadata) -> Result<DirId> {
    use std::os::unix::fs::MetadataExt;
    Ok((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn dir_id(path: &Path, _meta: &Metadata) -> Result<DirId> {
    Ok(fs::canonicalize(path)?)
}
