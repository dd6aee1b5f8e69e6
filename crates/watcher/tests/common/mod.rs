//! Common utilities for integration tests

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use lookout::{Changes, Config, Listener};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// How long to wait for a batch that should arrive
pub const ARRIVAL_TIMEOUT: Duration = Duration::from_secs(5);

/// A polling listener on a fresh temporary directory, with every batch
/// forwarded to a channel
pub struct WatchedDir {
    // Dropped before the directory goes away
    pub listener: Listener,
    batches: Receiver<Changes>,
    root: PathBuf,
    _temp_dir: TempDir,
}

impl WatchedDir {
    /// Seed the directory with `files`, then set up (but don't start) the listener
    pub fn new(files: &[&str]) -> Self {
        Self::with_config(
            files,
            Config {
                force_polling: true,
                latency_ms: Some(50),
                ..Config::default()
            },
        )
    }

    /// Like [`WatchedDir::new`] with a caller-provided configuration
    pub fn with_config(files: &[&str], config: Config) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = fs::canonicalize(temp_dir.path()).unwrap();
        for name in files {
            fs::write(root.join(name), name.as_bytes()).unwrap();
        }

        let (tx, batches) = unbounded();
        let listener = Listener::new([&root], config, move |changes: &Changes| {
            let _ = tx.send(changes.clone());
        })
        .unwrap();

        Self {
            listener,
            batches,
            root,
            _temp_dir: temp_dir,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Next batch, failing the test if none arrives in time
    pub fn next_batch(&self) -> Changes {
        self.batches
            .recv_timeout(ARRIVAL_TIMEOUT)
            .expect("no changes reported")
    }

    /// A batch that was already delivered, without waiting
    pub fn delivered(&self) -> Option<Changes> {
        self.batches.try_recv().ok()
    }

    /// Whether nothing is reported within `window`
    pub fn quiet_for(&self, window: Duration) -> bool {
        matches!(
            self.batches.recv_timeout(window),
            Err(RecvTimeoutError::Timeout)
        )
    }
}
