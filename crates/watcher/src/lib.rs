//! File system watching for Lookout
//!
//! This crate watches directory trees and reports what changed:
//! - A per-root snapshot ([`Record`]) classifies changes, with content
//!   hashing where timestamps are too coarse to tell two writes apart
//! - Ignore/only patterns ([`Silencer`]) filter noise before it is recorded
//! - Native notifications via `notify`, or polling as a portable fallback
//! - Bursts are coalesced into one callback invocation
//!
//! ```no_run
//! use lookout::{Changes, Config, Listener};
//!
//! let listener = Listener::new(["."], Config::default(), |changes: &Changes| {
//!     for path in &changes.added {
//!         println!("added {}", path.display());
//!     }
//! })?;
//! listener.start()?;
//! # Ok::<(), lookout::Error>(())
//! ```

pub mod backend;
pub mod change;
pub mod coalesce;
pub mod config;
pub mod debounce;
mod directory;
pub mod error;
pub mod event;
pub mod file;
pub mod fsm;
pub mod listener;
pub mod platform;
pub mod record;
pub mod silencer;
mod symlink;
pub mod thread;

pub use backend::{Backend, MIN_DELAY_BETWEEN_EVENTS};
pub use change::Change;
pub use config::{Config, HashPolicy, POLLING_FALLBACK_MESSAGE};
pub use debounce::Callback;
pub use error::{Error, Result};
pub use event::{ChangeKind, ChangeOptions, Changes, Cookie, EntryType, QueuedEvent};
pub use file::{classify, Classification};
pub use fsm::{StateMachine, StateTable};
pub use listener::{Listener, ListenerState};
pub use platform::{Adapter, AdapterKind};
pub use record::Record;
pub use silencer::{SharedSilencer, Silencer};
