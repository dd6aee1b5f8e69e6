//! Reusable finite-state machine
//!
//! A host declares its states as a [`StateTable`]: the start state, the
//! destinations each state may move to, and an optional entry callback that
//! runs against the host. The [`StateMachine`] is a standalone object the
//! host owns; it serializes state changes behind one mutex and wakes
//! [`StateMachine::wait_for_state`] callers through one condition variable.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::fmt::{Debug, Display};
use std::time::{Duration, Instant};
use tracing::trace;

/// Static declaration of a state set
pub trait StateTable: Copy + Eq + Debug + Display + Send + Sync + 'static {
    /// Component the entry callbacks run against
    type Host: ?Sized;

    /// Initial state
    const START: Self;

    /// States reachable from `self`; `None` allows any move
    fn destinations(self) -> Option<&'static [Self]>;

    /// Runs after the machine entered `self`, with the lock released
    fn on_enter(self, _host: &Self::Host) -> Result<()> {
        Ok(())
    }
}

/// Thread-safe state holder for one host
pub struct StateMachine<S: StateTable> {
    name: &'static str,
    state: Mutex<S>,
    changed: Condvar,
}

impl<S: StateTable> StateMachine<S> {
    /// Create a machine in `S::START`; `name` appears in error messages
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(S::START),
            changed: Condvar::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> S {
        *self.state.lock()
    }

    /// Move to `to` and run its entry callback
    ///
    /// Returns `Ok(false)` without running the callback when already in
    /// `to`. An illegal move leaves the state untouched.
    pub fn transition(&self, host: &S::Host, to: S) -> Result<bool> {
        {
            let mut state = self.state.lock();
            let from = *state;
            if from == to {
                return Ok(false);
            }
            if let Some(allowed) = from.destinations() {
                if !allowed.contains(&to) {
                    return Err(Error::InvalidTransition {
                        machine: self.name,
                        from: from.to_string(),
                        to: to.to_string(),
                        allowed: list(allowed),
                    });
                }
            }

            *state = to;
            self.changed.notify_all();
            trace!("{}: {} -> {}", self.name, from, to);
        }

        to.on_enter(host)?;
        Ok(true)
    }

    /// Block until the state is one of `states` or `timeout` elapses
    ///
    /// `None` waits indefinitely. Returns whether one of the states was
    /// reached.
    pub fn wait_for_state(&self, states: &[S], timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut state = self.state.lock();

        while !states.contains(&*state) {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut state, deadline).timed_out() {
                        return states.contains(&*state);
                    }
                }
                None => self.changed.wait(&mut state),
            }
        }
        true
    }
}

impl<S: StateTable> Debug for StateMachine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

fn list<S: Display>(states: &[S]) -> String {
    if states.is_empty() {
        return "(none)".to_string();
    }
    states
        .iter()
        .map(|state| format!("'{state}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
