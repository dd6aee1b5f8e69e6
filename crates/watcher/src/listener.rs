//! Listener: the public entry point
//!
//! A `Listener` owns everything one watch needs: the shared silencer, one
//! change dispatcher (and record) per root, the backend with its adapter,
//! and the event processor delivering batches to the user callback. Its
//! lifecycle is driven by a [`StateMachine`]:
//!
//! ```text
//! initializing ──> backend_started ──> processing_events <──> paused
//!       │                 │                    │                 │
//!       └─────────────────┴────────> stopped <─┴─────────────────┘
//! ```
//!
//! While paused, adapters keep observing and the record keeps up to date;
//! the queued events are delivered once processing resumes.

use crate::backend::Backend;
use crate::change::Change;
use crate::config::Config;
use crate::debounce::{Callback, EventProcessor, ProcessorHandle};
use crate::error::{Error, Result};
use crate::event::Changes;
use crate::fsm::{StateMachine, StateTable};
use crate::platform::AdapterKind;
use crate::record::Record;
use crate::silencer::{SharedSilencer, Silencer};
use crossbeam_channel::unbounded;
use parking_lot::Mutex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Lifecycle states of a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerState {
    Initializing,
    BackendStarted,
    ProcessingEvents,
    Paused,
    Stopped,
}

impl ListenerState {
    /// Every state in which the event processor may deliver
    pub const NOT_PAUSED: [ListenerState; 4] = [
        ListenerState::Initializing,
        ListenerState::BackendStarted,
        ListenerState::ProcessingEvents,
        ListenerState::Stopped,
    ];
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListenerState::Initializing => "initializing",
            ListenerState::BackendStarted => "backend_started",
            ListenerState::ProcessingEvents => "processing_events",
            ListenerState::Paused => "paused",
            ListenerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

impl StateTable for ListenerState {
    type Host = ListenerCore;

    const START: Self = ListenerState::Initializing;

    fn destinations(self) -> Option<&'static [Self]> {
        use ListenerState::*;
        match self {
            Initializing => Some(&[BackendStarted, Stopped]),
            BackendStarted => Some(&[ProcessingEvents, Stopped]),
            ProcessingEvents => Some(&[Paused, Stopped]),
            Paused => Some(&[ProcessingEvents, Stopped]),
            Stopped => Some(&[]),
        }
    }

    fn on_enter(self, core: &ListenerCore) -> Result<()> {
        match self {
            ListenerState::BackendStarted => core.backend.lock().start(),
            ListenerState::ProcessingEvents => core.start_processing(),
            ListenerState::Stopped => {
                core.halt();
                Ok(())
            }
            ListenerState::Initializing | ListenerState::Paused => Ok(()),
        }
    }
}

/// Components the lifecycle callbacks act on
pub struct ListenerCore {
    fsm: Arc<StateMachine<ListenerState>>,
    directories: Vec<PathBuf>,
    silencer: SharedSilencer,
    backend: Mutex<Backend>,
    pending: Mutex<Option<EventProcessor>>,
    processor: Mutex<Option<ProcessorHandle>>,
}

impl ListenerCore {
    fn start_processing(&self) -> Result<()> {
        // Already running when resuming from pause
        let Some(processor) = self.pending.lock().take() else {
            return Ok(());
        };
        let latency = self.backend.lock().min_delay();
        let handle = processor.spawn(latency)?;
        *self.processor.lock() = Some(handle);
        Ok(())
    }

    /// Stop the adapter first, then let the processor flush and exit
    fn halt(&self) {
        self.backend.lock().stop();
        let handle = self.processor.lock().take();
        if let Some(mut handle) = handle {
            handle.stop();
        }
        self.pending.lock().take();
    }
}

/// Watches one or more directories and reports changes to a callback
pub struct Listener {
    core: ListenerCore,
}

impl Listener {
    /// Prepare a listener; nothing is watched until [`Listener::start`]
    ///
    /// Every directory must exist; an empty list watches the current
    /// directory.
    pub fn new<I, P, F>(directories: I, config: Config, callback: F) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
        F: FnMut(&Changes) + Send + 'static,
    {
        config.validate()?;
        let config = Arc::new(config);
        let directories = canonical_roots(directories)?;

        let silencer = Silencer::from_config(&config)?.shared();
        let (queue_tx, queue_rx) = unbounded();
        let changes: Vec<Arc<Change>> = directories
            .iter()
            .map(|root| {
                Arc::new(Change::new(
                    Record::new(root.clone()),
                    Arc::clone(&silencer),
                    queue_tx.clone(),
                    config.hash_policy(),
                ))
            })
            .collect();
        drop(queue_tx);

        let backend = Backend::new(changes, Arc::clone(&config));
        let relative_to = if config.relative {
            Some(std::env::current_dir()?)
        } else {
            None
        };

        let fsm = Arc::new(StateMachine::new("listener"));
        let callback: Callback = Box::new(callback);
        let processor = EventProcessor::new(
            queue_rx,
            Arc::clone(&fsm),
            Arc::clone(&silencer),
            relative_to,
            callback,
        );

        Ok(Self {
            core: ListenerCore {
                fsm,
                directories,
                silencer,
                backend: Mutex::new(backend),
                pending: Mutex::new(Some(processor)),
                processor: Mutex::new(None),
            },
        })
    }

    /// Start watching, or resume after [`Listener::pause`]
    ///
    /// Records are built before this returns.
    pub fn start(&self) -> Result<()> {
        match self.state() {
            ListenerState::Initializing => {
                let started = self
                    .transition(ListenerState::BackendStarted)
                    .and_then(|_| self.transition(ListenerState::ProcessingEvents));
                if let Err(err) = started {
                    if let Err(stop_err) = self.transition(ListenerState::Stopped) {
                        warn!("Failed to stop after a failed start: {}", stop_err);
                    }
                    return Err(err);
                }
                info!(
                    "Listening to {} director{} with the {} adapter",
                    self.core.directories.len(),
                    if self.core.directories.len() == 1 { "y" } else { "ies" },
                    self.adapter_kind()
                );
                Ok(())
            }
            ListenerState::Paused => self.transition(ListenerState::ProcessingEvents).map(|_| ()),
            other => Err(Error::Usage(format!(
                "start() is only valid when initializing or paused, not when {other}"
            ))),
        }
    }

    /// Hold event delivery; changes keep being recorded and queued
    pub fn pause(&self) -> Result<()> {
        self.transition(ListenerState::Paused).map(|_| ())
    }

    /// Stop for good; queued events are delivered one last time
    pub fn stop(&self) -> Result<()> {
        self.transition(ListenerState::Stopped).map(|_| ())
    }

    pub fn state(&self) -> ListenerState {
        self.core.fsm.state()
    }

    pub fn is_processing(&self) -> bool {
        self.state() == ListenerState::ProcessingEvents
    }

    pub fn is_paused(&self) -> bool {
        self.state() == ListenerState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ListenerState::Stopped
    }

    /// Block until the listener is in one of `states`; see
    /// [`StateMachine::wait_for_state`]
    pub fn wait_for_state(&self, states: &[ListenerState], timeout: Option<Duration>) -> bool {
        self.core.fsm.wait_for_state(states, timeout)
    }

    /// Add ignore patterns, effective for the next observed change
    pub fn ignore<I>(&self, patterns: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.core.silencer.write().append_ignores(patterns)
    }

    /// Replace all ignore patterns, built-in defaults included
    pub fn ignore_replace<I>(&self, patterns: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.core.silencer.write().replace_ignores(patterns)
    }

    /// Only report files matching one of `patterns`; empty lifts the
    /// restriction
    pub fn only<I>(&self, patterns: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.core.silencer.write().replace_only(patterns)
    }

    /// Watched roots, canonicalized
    pub fn directories(&self) -> &[PathBuf] {
        &self.core.directories
    }

    /// Adapter variant in use
    pub fn adapter_kind(&self) -> AdapterKind {
        self.core.backend.lock().adapter_kind()
    }

    fn transition(&self, to: ListenerState) -> Result<bool> {
        self.core.fsm.transition(&self.core, to)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("state", &self.state())
            .field("directories", &self.core.directories)
            .finish()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if !self.is_stopped() {
            if let Err(err) = self.stop() {
                warn!("Failed to stop listener on drop: {}", err);
            }
        }
    }
}

fn canonical_roots<I, P>(directories: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut roots: Vec<PathBuf> = Vec::new();
    for dir in directories {
        let dir = dir.as_ref();
        let root = fs::canonicalize(dir).map_err(|_| Error::NotADirectory(dir.to_path_buf()))?;
        if !root.is_dir() {
            return Err(Error::NotADirectory(root));
        }
        if !roots.contains(&root) {
            roots.push(root);
        }
    }
    if roots.is_empty() {
        roots.push(fs::canonicalize(".")?);
    }
    Ok(roots)
}
