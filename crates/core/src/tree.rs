//! Snapshot tree for a watched root
//!
//! Directories are nested nodes keyed by path segment; files are leaves
//! carrying the metadata observed at the last scan. The root is addressed by
//! an empty segment list.

use crate::hash::ContentHash;
use ahash::AHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// Path relative to a watched root, as a list of segments
///
/// `""`, `"."` and `"/"` all parse to the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelPath {
    segments: SmallVec<[String; 4]>,
}

impl RelPath {
    /// The root of the watched directory
    pub fn root() -> Self {
        Self::default()
    }

    /// Whether this addresses the root itself
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Path segments, outermost first
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Final segment, `None` for the root
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Parent path, `None` for the root
    pub fn parent(&self) -> Option<RelPath> {
        let (_, parent) = self.segments.split_last()?;
        Some(Self {
            segments: parent.iter().cloned().collect(),
        })
    }

    /// Child path
    pub fn join(&self, name: &str) -> RelPath {
        let mut segments = self.segments.clone();
        segments.extend(Self::parse(name).segments);
        Self { segments }
    }

    /// Absolute path under `root`
    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(self.segments.iter());
        path
    }

    /// Parse a `/`-separated relative path
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .filter(|segment| !segment.is_empty() && *segment != ".")
                .map(str::to_owned)
                .collect(),
        }
    }

    /// Build from a filesystem path, keeping only normal components
    pub fn from_path(path: &Path) -> Self {
        Self {
            segments: path
                .components()
                .filter_map(|component| match component {
                    Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Path of `full` relative to `root`, if it lies underneath it
    pub fn strip_root(root: &Path, full: &Path) -> Option<Self> {
        full.strip_prefix(root).ok().map(Self::from_path)
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        f.write_str(&self.segments.join("/"))
    }
}

impl From<&str> for RelPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

/// Metadata remembered for a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Modification time
    pub mtime: SystemTime,
    /// Permission and file type bits
    pub mode: u32,
    /// Size in bytes
    pub size: u64,
    /// Content digest, only recorded once hashing was needed
    pub hash: Option<ContentHash>,
}

impl FileMeta {
    /// Capture metadata from an `lstat`/`stat` result (without a digest)
    pub fn from_metadata(meta: &Metadata) -> io::Result<Self> {
        Ok(Self {
            mtime: meta.modified()?,
            mode: mode_bits(meta),
            size: meta.len(),
            hash: None,
        })
    }

    /// Attach a content digest
    pub fn with_hash(mut self, hash: ContentHash) -> Self {
        self.hash = Some(hash);
        self
    }
}

/// Mode bits of a stat result
#[cfg(unix)]
pub fn mode_bits(meta: &Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

/// Mode bits of a stat result (synthesized: file type plus write permission)
#[cfg(not(unix))]
pub fn mode_bits(meta: &Metadata) -> u32 {
    let kind = if meta.is_dir() {
        0o040000
    } else if meta.file_type().is_symlink() {
        0o120000
    } else {
        0o100000
    };
    let perms = if meta.permissions().readonly() { 0o444 } else { 0o644 };
    kind | perms
}

/// A node of the snapshot tree
#[derive(Debug, Clone)]
pub enum Node {
    /// Directory with its children
    Dir(DirNode),
    /// File leaf
    File(FileMeta),
}

impl Node {
    /// Whether this node is a directory
    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }

    fn dir_or_replace(&mut self) -> &mut DirNode {
        if let Node::File(_) = self {
            *self = Node::Dir(DirNode::default());
        }
        match self {
            Node::Dir(dir) => dir,
            Node::File(_) => unreachable!("file node was just replaced by a directory"),
        }
    }
}

/// Directory node: children keyed by segment
#[derive(Debug, Clone, Default)]
pub struct DirNode {
    children: AHashMap<String, Node>,
}

impl DirNode {
    /// Iterate over `(name, node)` pairs (unordered)
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }
}

/// In-memory snapshot of one watched root
#[derive(Debug, Clone, Default)]
pub struct Tree {
    root: DirNode,
}

impl Tree {
    /// Create a new empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.root.children.clear();
    }

    /// Make sure a directory node exists at `path` (and all its parents)
    pub fn add_dir(&mut self, path: &RelPath) {
        self.dir_mut_creating(path.segments());
    }

    /// Record file metadata at `path`
    ///
    /// Returns false for the root, which cannot be a file.
    pub fn update_file(&mut self, path: &RelPath, meta: FileMeta) -> bool {
        let Some((name, parent)) = path.segments().split_last() else {
            return false;
        };
        self.dir_mut_creating(parent)
            .children
            .insert(name.clone(), Node::File(meta));
        true
    }

    /// Remove whatever is recorded at `path`; the root clears the tree
    pub fn unset(&mut self, path: &RelPath) -> Option<Node> {
        let Some((name, parent)) = path.segments().split_last() else {
            let root = std::mem::take(&mut self.root);
            return Some(Node::Dir(root));
        };
        self.dir_mut(parent)?.children.remove(name)
    }

    /// Node at `path` (`None` for the root)
    pub fn get(&self, path: &RelPath) -> Option<&Node> {
        let (name, parent) = path.segments().split_last()?;
        self.dir_at(parent)?.children.get(name)
    }

    /// File metadata at `path`
    pub fn file(&self, path: &RelPath) -> Option<&FileMeta> {
        match self.get(path)? {
            Node::File(meta) => Some(meta),
            Node::Dir(_) => None,
        }
    }

    /// Directory node at `path`; the root always exists
    pub fn dir(&self, path: &RelPath) -> Option<&DirNode> {
        self.dir_at(path.segments())
    }

    /// Every file recorded at or below `path`
    pub fn files_under(&self, path: &RelPath) -> Vec<RelPath> {
        let mut files = Vec::new();
        let start = if path.is_root() {
            &self.root
        } else {
            match self.get(path) {
                Some(Node::Dir(dir)) => dir,
                Some(Node::File(_)) => return vec![path.clone()],
                None => return files,
            }
        };

        let mut pending = vec![(path.clone(), start)];

        while let Some((dir_path, dir)) = pending.pop() {
            for (name, node) in dir.entries() {
                let child = dir_path.join(name);
                match node {
                    Node::File(_) => files.push(child),
                    Node::Dir(sub) => pending.push((child, sub)),
                }
            }
        }
        files
    }

    /// Number of files in the whole tree
    pub fn file_count(&self) -> usize {
        self.files_under(&RelPath::root()).len()
    }

    fn dir_at(&self, segments: &[String]) -> Option<&DirNode> {
        let mut dir = &self.root;
        for segment in segments {
            match dir.children.get(segment)? {
                Node::Dir(next) => dir = next,
                Node::File(_) => return None,
            }
        }
        Some(dir)
    }

    fn dir_mut(&mut self, segments: &[String]) -> Option<&mut DirNode> {
        let mut dir = &mut self.root;
        for segment in segments {
            match dir.children.get_mut(segment)? {
                Node::Dir(next) => dir = next,
                Node::File(_) => return None,
            }
        }
        Some(dir)
    }

    // A file standing where a directory is needed gets replaced
    fn dir_mut_creating(&mut self, segments: &[String]) -> &mut DirNode {
        let mut dir = &mut self.root;
        for segment in segments {
            dir = dir
                .children
                .entry(segment.clone())
                .or_insert_with(|| Node::Dir(DirNode::default()))
                .dir_or_replace();
        }
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn meta(size: u64) -> FileMeta {
        FileMeta {
            mtime: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            mode: 0o100644,
            size,
            hash: None,
        }
    }

    #[test]
    fn test_rel_path_root_aliases() {
        assert!(RelPath::parse("").is_root());
        assert!(RelPath::parse(".").is_root());
        assert!(RelPath::parse("/").is_root());
        assert_eq!(RelPath::root().to_string(), ".");
        assert_eq!(RelPath::parse("./a//b/").to_string(), "a/b");
    }

    #[test]
    fn test_rel_path_navigation() {
        let path = RelPath::parse("src/lib/foo.rs");
        assert_eq!(path.name(), Some("foo.rs"));
        assert_eq!(path.parent().unwrap(), RelPath::parse("src/lib"));
        assert_eq!(RelPath::parse("src").join("lib/foo.rs"), path);
        assert_eq!(path.to_path(Path::new("/w")), PathBuf::from("/w/src/lib/foo.rs"));
        assert_eq!(
            RelPath::strip_root(Path::new("/w"), Path::new("/w/src/lib/foo.rs")).unwrap(),
            path
        );
        assert!(RelPath::strip_root(Path::new("/w"), Path::new("/other/x")).is_none());
        assert!(RelPath::root().parent().is_none());
    }

    #[test]
    fn test_update_file_creates_parents() {
        let mut tree = Tree::new();
        assert!(tree.update_file(&RelPath::parse("a/b/c.txt"), meta(3)));

        assert!(tree.dir(&RelPath::parse("a")).is_some());
        assert!(tree.dir(&RelPath::parse("a/b")).is_some());
        assert_eq!(tree.file(&RelPath::parse("a/b/c.txt")).unwrap().size, 3);
        assert!(tree.file(&RelPath::parse("a/b")).is_none());
    }

    #[test]
    fn test_root_cannot_be_a_file() {
        let mut tree = Tree::new();
        assert!(!tree.update_file(&RelPath::root(), meta(1)));
        assert!(tree.get(&RelPath::root()).is_none());
        assert!(tree.dir(&RelPath::root()).unwrap().entries().next().is_none());
    }

    #[test]
    fn test_unset_path_and_root() {
        let mut tree = Tree::new();
        tree.update_file(&RelPath::parse("a.txt"), meta(1));
        tree.update_file(&RelPath::parse("d/b.txt"), meta(2));

        assert!(tree.unset(&RelPath::parse("a.txt")).is_some());
        assert!(tree.file(&RelPath::parse("a.txt")).is_none());
        assert!(tree.unset(&RelPath::parse("missing/x")).is_none());

        tree.unset(&RelPath::root());
        assert_eq!(tree.file_count(), 0);
    }

    #[test]
    fn test_file_replaced_by_directory() {
        let mut tree = Tree::new();
        tree.update_file(&RelPath::parse("thing"), meta(1));
        tree.add_dir(&RelPath::parse("thing/inner"));

        assert!(tree.get(&RelPath::parse("thing")).unwrap().is_dir());
        assert!(tree.dir(&RelPath::parse("thing/inner")).is_some());
    }

    #[test]
    fn test_files_under() {
        let mut tree = Tree::new();
        tree.update_file(&RelPath::parse("top.txt"), meta(1));
        tree.update_file(&RelPath::parse("d/one.txt"), meta(1));
        tree.update_file(&RelPath::parse("d/e/two.txt"), meta(1));
        tree.add_dir(&RelPath::parse("d/empty"));

        let mut under_d = tree.files_under(&RelPath::parse("d"));
        under_d.sort();
        assert_eq!(under_d, vec![RelPath::parse("d/e/two.txt"), RelPath::parse("d/one.txt")]);
        assert_eq!(tree.files_under(&RelPath::parse("top.txt")), vec![RelPath::parse("top.txt")]);
        assert!(tree.files_under(&RelPath::parse("nope")).is_empty());
        assert_eq!(tree.file_count(), 3);
    }
}
