//! Adapter selection and coalescing delay

use crate::change::Change;
use crate::config::Config;
use crate::error::Result;
use crate::platform::{self, Adapter, AdapterKind, PollingAdapter};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Lower bound for the delay between two callbacks
pub const MIN_DELAY_BETWEEN_EVENTS: Duration = Duration::from_millis(100);

/// Owns the adapter feeding a listener's dispatchers
pub struct Backend {
    adapter: Box<dyn Adapter>,
    changes: Vec<Arc<Change>>,
    config: Arc<Config>,
    min_delay: Duration,
}

impl Backend {
    pub fn new(changes: Vec<Arc<Change>>, config: Arc<Config>) -> Self {
        let kind = AdapterKind::select(&config);
        let adapter = platform::build(kind, changes.clone(), &config);
        let min_delay = min_delay(&config, adapter.kind());
        Self {
            adapter,
            changes,
            config,
            min_delay,
        }
    }

    /// Start the adapter
    ///
    /// A native adapter that fails to subscribe (watch limits, unsupported
    /// filesystem) is replaced by polling.
    pub fn start(&mut self) -> Result<()> {
        match self.adapter.start() {
            Ok(()) => Ok(()),
            Err(err) if self.adapter.kind() != AdapterKind::Polling => {
                warn!("{} adapter failed to start: {}", self.adapter.kind(), err);
                self.adapter.stop();
                platform::warn_polling_fallback(&self.config);
                self.adapter = Box::new(PollingAdapter::new(self.changes.clone(), &self.config));
                self.min_delay = min_delay(&self.config, AdapterKind::Polling);
                self.adapter.start()
            }
            Err(err) => Err(err),
        }
    }

    /// Stop the adapter
    pub fn stop(&mut self) {
        self.adapter.stop();
    }

    /// Minimum delay the event processor waits to coalesce a burst
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Variant currently in use
    pub fn adapter_kind(&self) -> AdapterKind {
        self.adapter.kind()
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("adapter", &self.adapter.kind())
            .field("roots", &self.changes.len())
            .field("min_delay", &self.min_delay)
            .finish()
    }
}

/// `max(configured delay, adapter default, MIN_DELAY_BETWEEN_EVENTS)`
fn min_delay(config: &Config, kind: AdapterKind) -> Duration {
    [config.wait_for_delay(), kind.default_wait_for_delay()]
        .into_iter()
        .flatten()
        .fold(MIN_DELAY_BETWEEN_EVENTS, Duration::max)
}
