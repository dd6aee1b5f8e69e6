//! Queue optimizer
//!
//! Squashes a batch of queued events into the `{modified, added, removed}`
//! lists handed to the user callback:
//! - rename halves sharing a cookie are reinterpreted; a silenced
//!   `moved_from` paired with an unsilenced `moved_to` is an editor's atomic
//!   save and becomes one `modified`
//! - remaining `moved_to`/`moved_from` count as `added`/`removed`
//! - per path, the net action follows from the add/remove balance and
//!   whether the path still exists

use crate::event::{ChangeKind, Changes, Cookie, EntryType, QueuedEvent};
use crate::silencer::Silencer;
use ahash::AHashMap;
use std::path::PathBuf;
use tracing::trace;

/// Squash `events` (in queue order) into one callback payload
pub fn smoosh(events: Vec<QueuedEvent>, silencer: &Silencer) -> Changes {
    let actions = reinterpret(group_by_cookie(events), silencer);
    squash(actions)
}

fn group_by_cookie(events: Vec<QueuedEvent>) -> Vec<Vec<QueuedEvent>> {
    let mut index: AHashMap<Option<Cookie>, usize> = AHashMap::new();
    let mut groups: Vec<Vec<QueuedEvent>> = Vec::new();
    for event in events {
        let slot = *index.entry(event.cookie).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        // A back-end may report the same rename half more than once
        let group = &mut groups[slot];
        if event.cookie.is_some() && group.contains(&event) {
            continue;
        }
        group.push(event);
    }
    groups
}

fn reinterpret(groups: Vec<Vec<QueuedEvent>>, silencer: &Silencer) -> Vec<(ChangeKind, PathBuf)> {
    let mut actions = Vec::new();
    for group in groups {
        if let Some(saved) = editor_save(&group, silencer) {
            actions.push((ChangeKind::Modified, saved));
            continue;
        }
        for event in group {
            if event.entry_type == EntryType::Dir
                || silencer.is_silenced(&event.rel_path, event.entry_type)
            {
                continue;
            }
            let change = match event.change {
                ChangeKind::MovedTo => ChangeKind::Added,
                ChangeKind::MovedFrom => ChangeKind::Removed,
                other => other,
            };
            actions.push((change, event.full_path()));
        }
    }
    actions
}

/// Destination of an editor's write-to-temp-then-rename save, if `group`
/// is one
fn editor_save(group: &[QueuedEvent], silencer: &Silencer) -> Option<PathBuf> {
    let [first, second] = group else {
        return None;
    };
    first.cookie?;

    let (from, to) = match (first.change, second.change) {
        (ChangeKind::MovedFrom, ChangeKind::MovedTo) => (first, second),
        (ChangeKind::MovedTo, ChangeKind::MovedFrom) => (second, first),
        _ => return None,
    };
    if from.entry_type != EntryType::File || to.entry_type != EntryType::File {
        return None;
    }

    let temp_silenced = silencer.is_silenced(&from.rel_path, from.entry_type);
    let target_silenced = silencer.is_silenced(&to.rel_path, to.entry_type);
    (temp_silenced && !target_silenced).then(|| to.full_path())
}

fn squash(actions: Vec<(ChangeKind, PathBuf)>) -> Changes {
    let mut order: Vec<PathBuf> = Vec::new();
    let mut per_path: AHashMap<PathBuf, Vec<ChangeKind>> = AHashMap::new();
    for (change, path) in actions {
        per_path
            .entry(path.clone())
            .or_insert_with(|| {
                order.push(path);
                Vec::new()
            })
            .push(change);
    }

    let mut changes = Changes::default();
    for path in order {
        let Some(kinds) = per_path.remove(&path) else {
            continue;
        };
        let action = logical_action(&kinds, path.exists());
        trace!("{} {:?} => {:?}", path.display(), kinds, action);
        match action {
            Some(ChangeKind::Added) => changes.added.push(path),
            Some(ChangeKind::Removed) => changes.removed.push(path),
            Some(ChangeKind::Modified) => changes.modified.push(path),
            _ => {}
        }
    }
    changes
}

/// Net effect of everything that happened to one path
fn logical_action(kinds: &[ChangeKind], exists: bool) -> Option<ChangeKind> {
    let added = kinds.iter().filter(|kind| **kind == ChangeKind::Added).count();
    let removed = kinds.iter().filter(|kind| **kind == ChangeKind::Removed).count();
    let modified = kinds.contains(&ChangeKind::Modified);

    if exists {
        if added > removed {
            Some(ChangeKind::Added)
        } else if added == removed && added > 0 {
            Some(ChangeKind::Modified)
        } else {
            modified.then_some(ChangeKind::Modified)
        }
    } else {
        (removed > added).then_some(ChangeKind::Removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_core::RelPath;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn queued(
        root: &Path,
        change: ChangeKind,
        rel_path: &str,
        cookie: Option<Cookie>,
    ) -> QueuedEvent {
        QueuedEvent {
            entry_type: EntryType::File,
            change,
            root: Arc::from(root),
            rel_path: RelPath::parse(rel_path),
            cookie,
        }
    }

    #[test]
    fn test_logical_action() {
        use ChangeKind::*;

        assert_eq!(logical_action(&[Added], true), Some(Added));
        assert_eq!(logical_action(&[Removed, Added], true), Some(Modified));
        assert_eq!(logical_action(&[Modified, Modified], true), Some(Modified));
        assert_eq!(logical_action(&[Added, Removed], false), None);
        assert_eq!(logical_action(&[Modified, Removed], false), Some(Removed));
        assert_eq!(logical_action(&[Added], false), None);
        assert_eq!(logical_action(&[Removed], true), None);
    }

    #[test]
    fn test_squashes_per_path() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("kept.txt"), b"").unwrap();
        fs::write(root.join("edited.txt"), b"").unwrap();

        let events = vec![
            queued(root, ChangeKind::Added, "kept.txt", None),
            queued(root, ChangeKind::Modified, "kept.txt", None),
            queued(root, ChangeKind::Modified, "edited.txt", None),
            queued(root, ChangeKind::Added, "flash.txt", None),
            queued(root, ChangeKind::Removed, "flash.txt", None),
            queued(root, ChangeKind::Removed, "old.txt", None),
        ];
        let changes = smoosh(events, &Silencer::new());

        assert_eq!(changes.added, vec![root.join("kept.txt")]);
        assert_eq!(changes.modified, vec![root.join("edited.txt")]);
        assert_eq!(changes.removed, vec![root.join("old.txt")]);
    }

    #[test]
    fn test_editor_atomic_save_is_modified() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("main.rs"), b"saved").unwrap();

        let events = vec![
            queued(root, ChangeKind::MovedFrom, "main.rs.swp", Some(5)),
            queued(root, ChangeKind::MovedTo, "main.rs", Some(5)),
        ];
        let changes = smoosh(events, &Silencer::new());

        assert_eq!(changes.modified, vec![root.join("main.rs")]);
        assert!(changes.added.is_empty());
        assert!(changes.removed.is_empty());
    }

    #[test]
    fn test_repeated_rename_halves_still_save() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("main.rs"), b"saved").unwrap();

        let events = vec![
            queued(root, ChangeKind::MovedFrom, "main.rs.tmp", Some(4)),
            queued(root, ChangeKind::MovedTo, "main.rs", Some(4)),
            queued(root, ChangeKind::MovedFrom, "main.rs.tmp", Some(4)),
            queued(root, ChangeKind::MovedTo, "main.rs", Some(4)),
        ];
        let changes = smoosh(events, &Silencer::new());

        assert_eq!(changes.modified, vec![root.join("main.rs")]);
        assert!(changes.added.is_empty());
        assert!(changes.removed.is_empty());
    }

    #[test]
    fn test_plain_rename_is_remove_and_add() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("new.txt"), b"").unwrap();

        let events = vec![
            queued(root, ChangeKind::MovedFrom, "old.txt", Some(3)),
            queued(root, ChangeKind::MovedTo, "new.txt", Some(3)),
        ];
        let changes = smoosh(events, &Silencer::new());

        assert_eq!(changes.added, vec![root.join("new.txt")]);
        assert_eq!(changes.removed, vec![root.join("old.txt")]);
    }

    #[test]
    fn test_silenced_and_directory_events_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("notes.txt~"), b"").unwrap();
        fs::create_dir(root.join("dir")).unwrap();

        let mut dir_event = queued(root, ChangeKind::Added, "dir", None);
        dir_event.entry_type = EntryType::Dir;
        let events = vec![
            queued(root, ChangeKind::MovedTo, "notes.txt~", Some(1)),
            dir_event,
        ];

        assert!(smoosh(events, &Silencer::new()).is_empty());
    }

    #[test]
    fn test_first_seen_order_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for name in ["c.txt", "a.txt", "b.txt"] {
            fs::write(root.join(name), b"").unwrap();
        }

        let events = ["c.txt", "a.txt", "b.txt", "a.txt"]
            .into_iter()
            .map(|name| queued(root, ChangeKind::Modified, name, None))
            .collect();
        let changes = smoosh(events, &Silencer::new());

        assert_eq!(
            changes.modified,
            vec![root.join("c.txt"), root.join("a.txt"), root.join("b.txt")]
        );
    }
}
