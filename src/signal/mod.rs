//! Signal handling for graceful fleet shutdown (SIGINT/SIGTERM)
//!
//! On the first signal the CLI stops every robot thread, joins them and
//! exits with [`EXIT_CODE_INTERRUPTED`]. A second signal exits immediately
//! without waiting for the joins.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

/// Exit code after an interrupt
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Signal handler state
#[derive(Debug, Default)]
pub struct SignalState {
    shutdown_requested: AtomicBool,
    immediate_exit: AtomicBool,
    signal_count: AtomicU8,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Second signal received
    pub fn is_immediate_exit(&self) -> bool {
        self.immediate_exit.load(Ordering::SeqCst)
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Record a signal and return what the process should do about it.
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.signal_count.fetch_add(1, Ordering::SeqCst);

        match count {
            0 => {
                self.shutdown_requested.store(true, Ordering::SeqCst);
                SignalAction::Shutdown
            }
            1 => {
                self.immediate_exit.store(true, Ordering::SeqCst);
                SignalAction::ImmediateExit
            }
            _ => SignalAction::Ignore,
        }
    }

    /// Ask for shutdown without a signal, e.g. when the input stream ends.
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Stop and join all robots
    Shutdown,
    /// Exit without joining
    ImmediateExit,
    Ignore,
}

/// Installs the process signal handler over a shared [`SignalState`]
#[derive(Debug, Clone, Default)]
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Arc<SignalState> {
        Arc::clone(&self.state)
    }

    /// Install handlers for SIGINT and SIGTERM. Call once at startup.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::Shutdown => warn!("interrupt received, stopping fleet"),
            SignalAction::ImmediateExit => {
                warn!("second interrupt received, exiting immediately");
                std::process::exit(EXIT_CODE_INTERRUPTED);
            }
            SignalAction::Ignore => {}
        })
    }

    /// Block until shutdown is requested or `limit` elapses.
    ///
    /// Returns true if shutdown was requested.
    pub fn wait_for_shutdown(&self, poll: Duration, limit: Option<Duration>) -> bool {
        let start = Instant::now();
        loop {
            if self.state.is_shutdown_requested() {
                return true;
            }
            if limit.map(|l| start.elapsed() >= l).unwrap_or(false) {
                return false;
            }
            std::thread::sleep(poll);
        }
    }
}
