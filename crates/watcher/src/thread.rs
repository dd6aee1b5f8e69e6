//! Named background threads that log instead of dying silently
//!
//! Adapter workers and the event processor run through [`spawn`]. An `Err`
//! or a panic escaping the thread body is logged at `error` level with the
//! full cause chain, the error's backtrace when one was captured, and the
//! backtrace of the code that spawned the thread. The thread then exits; it
//! is not restarted.

use std::any::Any;
use std::backtrace::Backtrace;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tracing::error;

/// Spawn a thread named `lookout-{name}`
pub fn spawn<F>(name: &str, body: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    let thread_name = format!("lookout-{name}");
    let spawned_from = Backtrace::capture();

    thread::Builder::new().name(thread_name.clone()).spawn(move || {
        rescue_and_log(&thread_name, Some(&spawned_from), body);
    })
}

/// Run `body`, logging instead of propagating an error or panic
///
/// Returns the body's value, or `None` when it failed.
pub fn rescue_and_log<T, F>(label: &str, spawned_from: Option<&Backtrace>, body: F) -> Option<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            // `{:?}` on anyhow prints the message, every cause and the backtrace
            error!(
                "Error rescued in {}:\n{:?}{}",
                label,
                err,
                spawn_site(spawned_from)
            );
            None
        }
        Err(payload) => {
            error!(
                "Panic rescued in {}: {}\n{}{}",
                label,
                panic_message(payload.as_ref()),
                Backtrace::force_capture(),
                spawn_site(spawned_from)
            );
            None
        }
    }
}

fn spawn_site(spawned_from: Option<&Backtrace>) -> String {
    match spawned_from {
        Some(trace) => format!("\n--- thread spawned from ---\n{trace}"),
        None => String::new(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "<non-string panic payload>"
    }
}
