//! File change classification
//!
//! Compares a file's live `lstat` metadata with what the [`Record`] last saw
//! and decides whether it was added, modified, removed or left alone. When
//! the filesystem only stores whole-second timestamps, two writes inside the
//! same second look identical, so the classifier falls back to a content
//! digest once the timestamp is old enough that the write which produced it
//! has certainly finished.

use crate::config::HashPolicy;
use crate::event::ChangeKind;
use crate::record::{stat_file, Record};
use lookout_core::hash::hash_path;
use lookout_core::{FileMeta, RelPath};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

/// Verdict for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Added,
    Modified,
    Removed,
    Unchanged,
}

impl Classification {
    /// Change to report, `None` for [`Classification::Unchanged`]
    pub fn change(self) -> Option<ChangeKind> {
        match self {
            Classification::Added => Some(ChangeKind::Added),
            Classification::Modified => Some(ChangeKind::Modified),
            Classification::Removed => Some(ChangeKind::Removed),
            Classification::Unchanged => None,
        }
    }
}

/// Classify `rel_path` against the record, updating the record on change
pub fn classify(record: &mut Record, rel_path: &RelPath, policy: &HashPolicy) -> Classification {
    let previous = record.file_data(rel_path).cloned();
    let full_path = rel_path.to_path(record.root());

    let current = match stat_file(&full_path) {
        Ok(current) => current,
        Err(err) => {
            trace!("Cannot stat {}: {}", full_path.display(), err);
            record.unset_path(rel_path);
            return match previous {
                Some(_) => Classification::Removed,
                None => Classification::Unchanged,
            };
        }
    };

    let Some(previous) = previous else {
        record.update_file(rel_path, current);
        return Classification::Added;
    };

    if metadata_differs(&previous, &current) {
        record.update_file(rel_path, current);
        return Classification::Modified;
    }

    if !policy.enabled || !needs_hash(current.mtime, policy.fresh_guard, SystemTime::now()) {
        return Classification::Unchanged;
    }

    let hash = match hash_path(&full_path) {
        Ok(hash) => hash,
        Err(err) => {
            debug!("Cannot hash {}: {:#}", full_path.display(), err);
            return Classification::Unchanged;
        }
    };
    record.update_file(rel_path, current.with_hash(hash));

    match previous.hash {
        Some(recorded) if recorded != hash => Classification::Modified,
        _ => Classification::Unchanged,
    }
}

fn metadata_differs(previous: &FileMeta, current: &FileMeta) -> bool {
    previous.mode != current.mode
        || previous.mtime != current.mtime
        || previous.size != current.size
}

/// Whether a timestamp is coarse and old enough for hashing to be safe
///
/// A timestamp with a non-zero sub-second part comes from a fine-grained
/// filesystem where metadata alone is reliable.
fn needs_hash(mtime: SystemTime, fresh_guard: Duration, now: SystemTime) -> bool {
    let Ok(since_epoch) = mtime.duration_since(UNIX_EPOCH) else {
        return false;
    };
    if since_epoch.subsec_nanos() != 0 {
        return false;
    }
    UNIX_EPOCH + Duration::from_secs(since_epoch.as_secs()) + fresh_guard <= now
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn policy(fresh_guard: Duration) -> HashPolicy {
        HashPolicy {
            enabled: true,
            fresh_guard,
        }
    }

    /// Whole-second timestamp ten seconds in the past
    fn coarse_past() -> FileTime {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
        FileTime::from_unix_time(now.as_secs() as i64 - 10, 0)
    }

    fn write_with_mtime(path: &Path, contents: &[u8], mtime: FileTime) {
        fs::write(path, contents).unwrap();
        set_file_mtime(path, mtime).unwrap();
    }

    #[test]
    fn test_new_file_is_added() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("new.txt"), b"hello").unwrap();
        let mut record = Record::new(temp_dir.path());
        let rel_path = RelPath::parse("new.txt");

        let verdict = classify(&mut record, &rel_path, &HashPolicy::default());

        assert_eq!(verdict, Classification::Added);
        let live = stat_file(&temp_dir.path().join("new.txt")).unwrap();
        assert_eq!(record.file_data(&rel_path), Some(&live));
    }

    #[test]
    fn test_equal_metadata_is_unchanged_and_record_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("same.txt");
        fs::write(&path, b"content").unwrap();
        // Sub-second precision, so no hashing is attempted
        set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 500_000_000)).unwrap();

        let mut record = Record::new(temp_dir.path());
        let rel_path = RelPath::parse("same.txt");
        classify(&mut record, &rel_path, &HashPolicy::default());
        let before = record.file_data(&rel_path).cloned();

        let verdict = classify(&mut record, &rel_path, &HashPolicy::default());

        assert_eq!(verdict, Classification::Unchanged);
        assert_eq!(record.file_data(&rel_path).cloned(), before);
        assert!(before.unwrap().hash.is_none());
    }

    #[test]
    fn test_mtime_change_is_modified() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("f.txt");
        write_with_mtime(&path, b"one", FileTime::from_unix_time(1_600_000_000, 0));

        let mut record = Record::new(temp_dir.path());
        let rel_path = RelPath::parse("f.txt");
        classify(&mut record, &rel_path, &HashPolicy::default());

        set_file_mtime(&path, FileTime::from_unix_time(1_600_000_001, 0)).unwrap();
        assert_eq!(
            classify(&mut record, &rel_path, &HashPolicy::default()),
            Classification::Modified
        );
        assert_eq!(
            record.file_data(&rel_path).unwrap().mtime,
            UNIX_EPOCH + Duration::from_secs(1_600_000_001)
        );
    }

    #[test]
    fn test_size_change_is_modified() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("f.txt");
        let mtime = coarse_past();
        write_with_mtime(&path, b"short", mtime);

        let mut record = Record::new(temp_dir.path());
        let rel_path = RelPath::parse("f.txt");
        classify(&mut record, &rel_path, &HashPolicy::default());

        write_with_mtime(&path, b"much longer", mtime);
        assert_eq!(
            classify(&mut record, &rel_path, &HashPolicy::default()),
            Classification::Modified
        );
    }

    #[test]
    fn test_content_change_on_coarse_mtime_detected_by_hash() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("coarse.txt");
        let mtime = coarse_past();
        let policy = policy(Duration::from_secs(2));
        write_with_mtime(&path, b"aaaa", mtime);

        let mut record = Record::new(temp_dir.path());
        let rel_path = RelPath::parse("coarse.txt");
        assert_eq!(classify(&mut record, &rel_path, &policy), Classification::Added);

        // First verification only records the digest
        assert_eq!(classify(&mut record, &rel_path, &policy), Classification::Unchanged);
        assert!(record.file_data(&rel_path).unwrap().hash.is_some());

        // Same size, same timestamp, different bytes
        write_with_mtime(&path, b"bbbb", mtime);
        assert_eq!(classify(&mut record, &rel_path, &policy), Classification::Modified);
        assert_eq!(classify(&mut record, &rel_path, &policy), Classification::Unchanged);
    }

    #[test]
    fn test_content_change_inside_fresh_window_is_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fresh.txt");
        let mtime = coarse_past();
        let policy = policy(Duration::from_secs(60));
        write_with_mtime(&path, b"aaaa", mtime);

        let mut record = Record::new(temp_dir.path());
        let rel_path = RelPath::parse("fresh.txt");
        classify(&mut record, &rel_path, &policy);
        classify(&mut record, &rel_path, &policy);
        let before = record.file_data(&rel_path).cloned();

        write_with_mtime(&path, b"bbbb", mtime);
        assert_eq!(classify(&mut record, &rel_path, &policy), Classification::Unchanged);
        assert_eq!(record.file_data(&rel_path).cloned(), before);
    }

    #[test]
    fn test_hashing_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("f.txt");
        let mtime = coarse_past();
        let policy = HashPolicy {
            enabled: false,
            fresh_guard: Duration::ZERO,
        };
        write_with_mtime(&path, b"aaaa", mtime);

        let mut record = Record::new(temp_dir.path());
        let rel_path = RelPath::parse("f.txt");
        classify(&mut record, &rel_path, &policy);

        write_with_mtime(&path, b"bbbb", mtime);
        assert_eq!(classify(&mut record, &rel_path, &policy), Classification::Unchanged);
        assert!(record.file_data(&rel_path).unwrap().hash.is_none());
    }

    #[test]
    fn test_removed_file_is_pruned() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gone.txt");
        fs::write(&path, b"bye").unwrap();

        let mut record = Record::new(temp_dir.path());
        let rel_path = RelPath::parse("gone.txt");
        classify(&mut record, &rel_path, &HashPolicy::default());
        fs::remove_file(&path).unwrap();

        assert_eq!(
            classify(&mut record, &rel_path, &HashPolicy::default()),
            Classification::Removed
        );
        assert!(record.file_data(&rel_path).is_none());
    }

    #[test]
    fn test_unknown_missing_file_is_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let mut record = Record::new(temp_dir.path());

        assert_eq!(
            classify(&mut record, &RelPath::parse("never.txt"), &HashPolicy::default()),
            Classification::Unchanged
        );
    }

    #[test]
    fn test_needs_hash() {
        let guard = Duration::from_secs(2);
        let now = UNIX_EPOCH + Duration::from_secs(1_000);

        assert!(needs_hash(UNIX_EPOCH + Duration::from_secs(998), guard, now));
        assert!(!needs_hash(UNIX_EPOCH + Duration::from_secs(999), guard, now));
        assert!(!needs_hash(UNIX_EPOCH + Duration::from_millis(990_500), guard, now));
    }

    #[test]
    fn test_classification_change() {
        assert_eq!(Classification::Added.change(), Some(ChangeKind::Added));
        assert_eq!(Classification::Removed.change(), Some(ChangeKind::Removed));
        assert_eq!(Classification::Unchanged.change(), None);
    }
}
