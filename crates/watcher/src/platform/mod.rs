//! Notification adapters
//!
//! An adapter watches every root of a listener and reports candidate paths
//! to the root's [`Change`] dispatcher. Optimized variants use the
//! platform's native notification API through `notify`; the polling variant
//! works everywhere by rescanning on a timer.

mod native;
mod polling;

pub use native::NativeAdapter;
pub use polling::PollingAdapter;

use crate::change::Change;
use crate::config::Config;
use crate::error::Result;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Capability every adapter provides
pub trait Adapter: Send {
    /// Variant this adapter implements
    fn kind(&self) -> AdapterKind;

    /// Build the records and begin reporting changes
    ///
    /// Records are fully built when this returns.
    fn start(&mut self) -> Result<()>;

    /// Stop reporting; idempotent
    fn stop(&mut self);
}

/// Known adapter variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    Darwin,
    Linux,
    Bsd,
    Windows,
    Polling,
}

impl AdapterKind {
    /// Optimized variants, in selection priority
    pub const OPTIMIZED: [AdapterKind; 4] = [
        AdapterKind::Darwin,
        AdapterKind::Linux,
        AdapterKind::Bsd,
        AdapterKind::Windows,
    ];

    /// Whether this variant can run on the current platform
    pub fn is_usable(self) -> bool {
        match self {
            AdapterKind::Darwin => cfg!(target_os = "macos"),
            AdapterKind::Linux => cfg!(any(target_os = "linux", target_os = "android")),
            AdapterKind::Bsd => cfg!(any(
                target_os = "freebsd",
                target_os = "openbsd",
                target_os = "netbsd",
                target_os = "dragonfly"
            )),
            AdapterKind::Windows => cfg!(windows),
            AdapterKind::Polling => true,
        }
    }

    /// Polling interval used when no latency is configured
    ///
    /// Native variants are paced by the OS back-end and take no latency.
    pub fn default_latency(self) -> Option<Duration> {
        match self {
            AdapterKind::Polling => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    /// Callback delay used when none is configured
    pub fn default_wait_for_delay(self) -> Option<Duration> {
        match self {
            AdapterKind::Linux => Some(Duration::from_millis(100)),
            AdapterKind::Polling => Some(Duration::from_millis(50)),
            _ => None,
        }
    }

    /// Choose a variant for `config`
    ///
    /// Forced polling wins; otherwise the first usable optimized variant;
    /// otherwise polling, with the configured fallback warning.
    pub fn select(config: &Config) -> AdapterKind {
        if config.force_polling {
            debug!("Adapter: polling (forced)");
            return AdapterKind::Polling;
        }

        match AdapterKind::OPTIMIZED.into_iter().find(|kind| kind.is_usable()) {
            Some(kind) => {
                debug!("Adapter: {}", kind);
                kind
            }
            None => {
                warn_polling_fallback(config);
                AdapterKind::Polling
            }
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdapterKind::Darwin => "darwin",
            AdapterKind::Linux => "linux",
            AdapterKind::Bsd => "bsd",
            AdapterKind::Windows => "windows",
            AdapterKind::Polling => "polling",
        };
        f.write_str(name)
    }
}

/// Instantiate `kind`, falling back to polling if the native watcher
/// cannot be created
pub fn build(kind: AdapterKind, changes: Vec<Arc<Change>>, config: &Config) -> Box<dyn Adapter> {
    if kind == AdapterKind::Polling {
        return Box::new(PollingAdapter::new(changes, config));
    }

    match NativeAdapter::new(kind, changes.clone()) {
        Ok(adapter) => Box::new(adapter),
        Err(err) => {
            debug!("Native watcher unavailable: {}", err);
            warn_polling_fallback(config);
            Box::new(PollingAdapter::new(changes, config))
        }
    }
}

/// Log the configured fallback warning, unless suppressed
pub(crate) fn warn_polling_fallback(config: &Config) {
    if let Some(message) = config.fallback_message() {
        warn!("{}", message);
    }
}
