//! Portable adapter that rescans every root on a timer

use super::{Adapter, AdapterKind};
use crate::change::Change;
use crate::config::Config;
use crate::error::Result;
use crate::event::{ChangeOptions, EntryType};
use crate::thread;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use lookout_core::RelPath;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace};

/// Rescans each watched root every `latency`
pub struct PollingAdapter {
    changes: Vec<Arc<Change>>,
    latency: Duration,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl PollingAdapter {
    pub fn new(changes: Vec<Arc<Change>>, config: &Config) -> Self {
        let latency = config
            .latency()
            .or(AdapterKind::Polling.default_latency())
            .unwrap_or(Duration::from_secs(1));
        Self {
            changes,
            latency,
            stop_tx: None,
            worker: None,
        }
    }

    /// Interval between rescans
    pub fn latency(&self) -> Duration {
        self.latency
    }
}

impl Adapter for PollingAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Polling
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        for change in &self.changes {
            change.rebuild();
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let changes = self.changes.clone();
        let latency = self.latency;

        let worker = thread::spawn("polling", move || {
            debug!("Polling {} root(s) every {:?}", changes.len(), latency);
            loop {
                match stop_rx.recv_timeout(latency) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                for change in &changes {
                    trace!("Polling {}", change.root().display());
                    change.invalidate(EntryType::Dir, &RelPath::root(), ChangeOptions::default());
                }
            }
            Ok(())
        })?;

        self.stop_tx = Some(stop_tx);
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        // Disconnecting wakes the worker at its next loop boundary
        self.stop_tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                debug!("Polling worker exited abnormally");
            }
        }
    }
}

impl Drop for PollingAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}
