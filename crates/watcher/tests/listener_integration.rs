//! End-to-end listener tests against a real directory, using the polling
//! adapter so they behave the same on every platform

mod common;

use common::WatchedDir;
use lookout::{Config, Error, ListenerState};
use std::fs;
use std::time::Duration;

#[test]
fn test_reports_added_and_removed_files() {
    let watched = WatchedDir::new(&["a.txt"]);
    watched.listener.start().unwrap();
    assert!(watched
        .listener
        .wait_for_state(&[ListenerState::ProcessingEvents], Some(Duration::from_secs(1))));

    fs::write(watched.path("b.txt"), b"new").unwrap();
    let changes = watched.next_batch();
    assert_eq!(changes.added, vec![watched.path("b.txt")]);
    assert!(changes.modified.is_empty());
    assert!(changes.removed.is_empty());

    fs::remove_file(watched.path("a.txt")).unwrap();
    let changes = watched.next_batch();
    assert_eq!(changes.removed, vec![watched.path("a.txt")]);
    assert!(changes.added.is_empty());

    watched.listener.stop().unwrap();
    assert!(watched.listener.is_stopped());
}

#[test]
fn test_nested_directory_files_are_reported() {
    let watched = WatchedDir::new(&[]);
    watched.listener.start().unwrap();

    fs::create_dir_all(watched.path("src/deep")).unwrap();
    fs::write(watched.path("src/deep/lib.rs"), b"fn main() {}").unwrap();

    let changes = watched.next_batch();
    assert_eq!(changes.added, vec![watched.path("src/deep/lib.rs")]);

    fs::remove_dir_all(watched.path("src")).unwrap();
    let changes = watched.next_batch();
    assert_eq!(changes.removed, vec![watched.path("src/deep/lib.rs")]);

    watched.listener.stop().unwrap();
}

#[test]
fn test_pause_holds_changes_until_resumed() {
    let watched = WatchedDir::new(&["a.txt"]);
    watched.listener.start().unwrap();

    watched.listener.pause().unwrap();
    assert!(watched.listener.is_paused());

    fs::write(watched.path("c.txt"), b"while paused").unwrap();
    assert!(watched.quiet_for(Duration::from_millis(500)));

    watched.listener.start().unwrap();
    assert!(watched.listener.is_processing());

    let changes = watched.next_batch();
    assert_eq!(changes.added, vec![watched.path("c.txt")]);

    watched.listener.stop().unwrap();
}

#[test]
fn test_stop_delivers_the_pending_batch() {
    // A long coalescing delay keeps the change queued until stop
    let watched = WatchedDir::with_config(
        &[],
        Config {
            force_polling: true,
            latency_ms: Some(50),
            wait_for_delay_ms: Some(30_000),
            ..Config::default()
        },
    );
    watched.listener.start().unwrap();

    fs::write(watched.path("late.txt"), b"queued").unwrap();
    assert!(watched.quiet_for(Duration::from_millis(500)));

    watched.listener.stop().unwrap();
    let changes = watched.delivered().expect("pending batch dropped on stop");
    assert_eq!(changes.added, vec![watched.path("late.txt")]);
}

#[test]
fn test_ignored_files_are_not_reported() {
    let watched = WatchedDir::new(&[]);
    watched.listener.ignore([r"\.log$"]).unwrap();
    watched.listener.start().unwrap();

    fs::write(watched.path("debug.log"), b"noise").unwrap();
    fs::write(watched.path("notes.md"), b"signal").unwrap();

    let changes = watched.next_batch();
    assert_eq!(changes.added, vec![watched.path("notes.md")]);
    assert!(watched.quiet_for(Duration::from_millis(300)));

    watched.listener.stop().unwrap();
}

#[test]
fn test_stopped_listener_cannot_restart() {
    let watched = WatchedDir::new(&["a.txt"]);
    watched.listener.start().unwrap();
    watched.listener.stop().unwrap();

    assert!(matches!(watched.listener.start(), Err(Error::Usage(_))));
    assert!(watched.listener.pause().is_err());
    assert_eq!(watched.listener.directories(), &[watched.root().to_path_buf()]);
}
