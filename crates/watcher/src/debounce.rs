//! Event processor
//!
//! Runs on its own thread. After the first event of a burst arrives it
//! waits out the coalescing delay so the rest of the burst can pile up,
//! holds while the listener is paused, then drains the queue, squashes it
//! and hands the result to the user callback.

use crate::coalesce;
use crate::event::{Changes, QueuedEvent};
use crate::fsm::StateMachine;
use crate::listener::ListenerState;
use crate::silencer::SharedSilencer;
use crate::thread::{self, rescue_and_log};
use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender};
use lookout_core::MonotonicTime;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace};

/// User callback receiving each batch of changes
pub type Callback = Box<dyn FnMut(&Changes) + Send + 'static>;

/// Queue consumer, ready to be spawned
pub(crate) struct EventProcessor {
    events: Receiver<QueuedEvent>,
    fsm: Arc<StateMachine<ListenerState>>,
    silencer: SharedSilencer,
    relative_to: Option<PathBuf>,
    callback: Callback,
}

impl EventProcessor {
    pub(crate) fn new(
        events: Receiver<QueuedEvent>,
        fsm: Arc<StateMachine<ListenerState>>,
        silencer: SharedSilencer,
        relative_to: Option<PathBuf>,
        callback: Callback,
    ) -> Self {
        Self {
            events,
            fsm,
            silencer,
            relative_to,
            callback,
        }
    }

    /// Start processing with `latency` as the coalescing delay
    pub(crate) fn spawn(self, latency: Duration) -> io::Result<ProcessorHandle> {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let worker = thread::spawn("processor", move || self.run(latency, stop_rx))?;
        Ok(ProcessorHandle {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }

    fn run(mut self, latency: Duration, stop_rx: Receiver<()>) -> anyhow::Result<()> {
        debug!("Processing events (delay {:?})", latency);
        loop {
            let first = select! {
                recv(self.events) -> event => match event {
                    Ok(event) => event,
                    Err(_) => return Ok(()),
                },
                recv(stop_rx) -> _ => break,
            };

            // Give the rest of the burst time to arrive
            let deadline = MonotonicTime::now() + latency;
            let stopping = !matches!(
                stop_rx.recv_deadline(deadline.as_instant()),
                Err(RecvTimeoutError::Timeout)
            );
            if !stopping {
                self.fsm.wait_for_state(&ListenerState::NOT_PAUSED, None);
            }

            let mut batch = vec![first];
            batch.extend(self.events.try_iter());
            self.deliver(batch);

            if stopping {
                return Ok(());
            }
        }

        // Stopped while idle: flush what is already queued
        let remaining: Vec<_> = self.events.try_iter().collect();
        if !remaining.is_empty() {
            self.deliver(remaining);
        }
        Ok(())
    }

    fn deliver(&mut self, batch: Vec<QueuedEvent>) {
        let queued = batch.len();
        let changes = {
            let silencer = self.silencer.read();
            coalesce::smoosh(batch, &silencer)
        };
        let changes = match &self.relative_to {
            Some(base) => relativize(changes, base),
            None => changes,
        };

        if changes.is_empty() {
            trace!("{} queued event(s) squashed to nothing", queued);
            return;
        }
        debug!("{} queued event(s) => {} change(s)", queued, changes.len());

        let started = MonotonicTime::now();
        let callback = &mut self.callback;
        rescue_and_log("callback", None, || {
            callback(&changes);
            Ok(())
        });
        trace!("Callback took {:.3}s", started.elapsed().as_secs_f64());
    }
}

/// Handle to a running processor
#[derive(Debug)]
pub(crate) struct ProcessorHandle {
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ProcessorHandle {
    /// Ask the processor to flush and exit, and wait for it
    ///
    /// Called from the processor thread itself (a callback stopping its
    /// listener) it only signals; the thread exits once the callback returns.
    pub(crate) fn stop(&mut self) {
        self.stop_tx.take();
        let Some(worker) = self.worker.take() else {
            return;
        };
        if worker.thread().id() == std::thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            debug!("Event processor exited abnormally");
        }
    }
}

fn relativize(changes: Changes, base: &Path) -> Changes {
    let convert = |paths: Vec<PathBuf>| -> Vec<PathBuf> {
        paths.iter().map(|path| relative_to(path, base)).collect()
    };
    Changes {
        modified: convert(changes.modified),
        added: convert(changes.added),
        removed: convert(changes.removed),
    }
}

/// `path` expressed relative to `base`, walking up with `..` as needed
///
/// Paths sharing no prefix with `base` (another drive) stay as they are.
fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path_parts: Vec<Component<'_>> = path.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 {
        return path.to_path_buf();
    }

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[common..] {
        relative.push(part);
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_relative_to() {
        let base = Path::new("/home/dev/project");

        assert_eq!(
            relative_to(Path::new("/home/dev/project/src/main.rs"), base),
            PathBuf::from("src/main.rs")
        );
        assert_eq!(
            relative_to(Path::new("/home/dev/other/notes.md"), base),
            PathBuf::from("../other/notes.md")
        );
        assert_eq!(relative_to(base, base), PathBuf::from("."));
    }

    #[test]
    fn test_relative_to_without_common_prefix() {
        assert_eq!(
            relative_to(Path::new("src/lib.rs"), Path::new("other")),
            PathBuf::from("src/lib.rs")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_relativize_all_lists() {
        let changes = Changes {
            modified: vec![PathBuf::from("/w/a.txt")],
            added: vec![PathBuf::from("/w/sub/b.txt")],
            removed: vec![PathBuf::from("/elsewhere/c.txt")],
        };
        let relative = relativize(changes, Path::new("/w"));

        assert_eq!(relative.modified, vec![PathBuf::from("a.txt")]);
        assert_eq!(relative.added, vec![PathBuf::from("sub/b.txt")]);
        assert_eq!(relative.removed, vec![PathBuf::from("../elsewhere/c.txt")]);
    }
}
