//! Signal handling and cooperative cancellation.
//!
//! Installs SIGINT/SIGTERM handlers so that an install run can stop between
//! steps and run its remediation instead of dying halfway through a package
//! manager transaction.
//!
//! - First signal: sets the interrupted flag; the running command finishes,
//!   the executor sees the flag before the next step and cleans up.
//! - Second signal: restores the default handler and re-raises, forcing
//!   immediate termination.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Set to `true` by the signal handler on the first SIGINT/SIGTERM.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Counts how many signals have been received.
static SIGNAL_COUNT: AtomicUsize = AtomicUsize::new(0);

/// The signal number that triggered the first interruption.
static CAUGHT_SIGNAL: AtomicUsize = AtomicUsize::new(0);

/// Signal handler (async-signal-safe).
///
/// First invocation: sets the `INTERRUPTED` flag and writes a short message
/// to stderr using raw `write(2, …)`.
///
/// Second invocation: restores `SIG_DFL` and re-raises.
extern "C" fn handle_signal(sig: libc::c_int) {
    let prev = SIGNAL_COUNT.fetch_add(1, Ordering::SeqCst);

    if prev == 0 {
        INTERRUPTED.store(true, Ordering::SeqCst);
        CAUGHT_SIGNAL.store(sig as usize, Ordering::SeqCst);

        let msg = b"\nInterrupt received, stopping after the current step...\n";
        unsafe {
            libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
        }
    } else {
        let msg = b"\nForced exit - packages may be half-configured. Run: sudo apt-get -f install\n";
        unsafe {
            libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
            libc::signal(sig, libc::SIG_DFL);
            libc::raise(sig);
        }
    }
}

/// Install signal handlers for SIGINT and SIGTERM.
///
/// Safe to call more than once (idempotent).
pub fn install_signal_handlers() {
    unsafe {
        libc::signal(
            libc::SIGINT,
            handle_signal as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGTERM,
            handle_signal as *const () as libc::sighandler_t,
        );
    }
}

/// Returns `true` if an interrupt signal has been received.
pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Re-raise the caught signal with the default handler so the process exits
/// with the correct signal status.
///
/// Does nothing if no signal was caught.
pub fn reraise() {
    let sig = CAUGHT_SIGNAL.load(Ordering::SeqCst);
    if sig != 0 {
        unsafe {
            libc::signal(sig as libc::c_int, libc::SIG_DFL);
            libc::raise(sig as libc::c_int);
        }
    }
}

/// Shared cancellation flag checked by the executor between steps.
///
/// Cancelling never interrupts a command that is already running.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    follow_signals: bool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also reports cancellation once SIGINT/SIGTERM arrived
    pub fn with_signals() -> Self {
        Self {
            flag: Arc::default(),
            follow_signals: true,
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || (self.follow_signals && is_interrupted())
    }
}
