//! Cooperative stop signal and Ctrl+C handling.
//!
//! The sweep worker checks a [`StopSignal`] at the top of every pass, before
//! every file and while idling between passes. Raising the signal never
//! interrupts work already in progress; it only asks the worker to wrap up.
//!
//! # Usage
//!
//! ```rust,no_run
//! use mediadupe::signal::install_handler;
//! use std::time::Duration;
//!
//! let stop = install_handler().expect("Failed to install signal handler");
//!
//! // Sleep for up to two seconds, waking early on Ctrl+C.
//! if stop.wait_timeout(Duration::from_secs(2)) {
//!     println!("Stop requested, finishing up...");
//! }
//! ```
//!
//! # Exit Codes
//!
//! When Ctrl+C is received the signal is raised and "Interrupted. Finishing
//! up..." is printed to stderr. The binary exits with code 130 (128 + SIGINT)
//! once the worker has stopped.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::time::Duration;

/// Exit code for SIGINT (Ctrl+C) interruption.
/// This follows Unix convention: 128 + signal number (SIGINT = 2).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

#[derive(Debug, Default)]
struct Inner {
    raised: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// A shared, raise-once stop request.
///
/// Cloning is cheap and every clone observes the same state. Waiters blocked
/// in [`StopSignal::wait_timeout`] wake as soon as the signal is raised.
///
/// # Example
///
/// ```
/// use mediadupe::signal::StopSignal;
///
/// let stop = StopSignal::new();
/// let worker_copy = stop.clone();
///
/// stop.raise();
/// assert!(worker_copy.is_raised());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True once [`raise`](Self::raise) has been called (or Ctrl+C pressed).
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Request a stop and wake every waiter.
    pub fn raise(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
        // Taking the lock orders this notify after any in-progress predicate check.
        let _guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.wake.notify_all();
    }

    /// Clear the signal so the handle can be reused.
    pub fn reset(&self) {
        self.inner.raised.store(false, Ordering::SeqCst);
    }

    /// Block for at most `timeout`, returning early if the signal is raised.
    ///
    /// Returns whether the signal is raised on return.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self
            .inner
            .wake
            .wait_timeout_while(guard, timeout, |_| !self.is_raised())
            .unwrap_or_else(PoisonError::into_inner);
        self.is_raised()
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_SIGNAL: OnceLock<StopSignal> = OnceLock::new();

/// Install a Ctrl+C handler that raises the returned stop signal.
///
/// Only one process-wide handler can exist. Later calls (for example from
/// tests running `run_app` in parallel) get the already-installed signal,
/// reset to the un-raised state. If another library already owns the Ctrl+C
/// hook, an unhooked signal is returned that still works for manual raises.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if the operating system refuses the
/// handler.
pub fn install_handler() -> Result<StopSignal, SignalError> {
    if let Some(signal) = GLOBAL_SIGNAL.get() {
        signal.reset();
        return Ok(signal.clone());
    }

    let signal = StopSignal::new();
    let hooked = signal.clone();

    match ctrlc::set_handler(move || {
        hooked.raise();

        let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing up...");
        let _ = std::io::stderr().flush();

        log::info!("Stop signal received");
    }) {
        Ok(()) => {
            let _ = GLOBAL_SIGNAL.set(signal.clone());
            Ok(signal)
        }
        Err(ctrlc::Error::MultipleHandlers) => {
            if let Some(existing) = GLOBAL_SIGNAL.get() {
                existing.reset();
                Ok(existing.clone())
            } else {
                log::debug!("Ctrl+C already hooked elsewhere, using unhooked signal");
                let fallback = StopSignal::new();
                let _ = GLOBAL_SIGNAL.set(fallback.clone());
                Ok(fallback)
            }
        }
        Err(e) => Err(SignalError::InstallFailed(e)),
    }
}
