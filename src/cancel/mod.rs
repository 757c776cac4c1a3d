//! Cancellation of a running archive build.
//!
//! A [`CancelToken`] is shared between whoever may want to stop the build
//! (the Ctrl-C handler, an embedding caller) and the capture loop that owns
//! the child process. The capture loop polls it and terminates the child.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Exit code for cancelled scans
pub const EXIT_CODE_CANCELLED: i32 = 80;

/// Why a build was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    /// Cancelled programmatically by the caller
    User,
    /// SIGINT/SIGTERM
    Signal,
    /// The configured overall timeout elapsed
    Timeout,
}

impl CancelReason {
    fn to_u8(self) -> u8 {
        match self {
            CancelReason::User => 1,
            CancelReason::Signal => 2,
            CancelReason::Timeout => 3,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(CancelReason::User),
            2 => Some(CancelReason::Signal),
            3 => Some(CancelReason::Timeout),
            _ => None,
        }
    }
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::User => write!(f, "cancelled by caller"),
            CancelReason::Signal => write!(f, "interrupted by signal"),
            CancelReason::Timeout => write!(f, "timed out"),
        }
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: stop the build and let the scan wind down
    InitiateCancellation,
    /// Second signal: exit immediately
    ImmediateExit,
    /// Third+ signal: ignore
    Ignore,
}

#[derive(Debug, Default)]
struct CancelState {
    requested: AtomicBool,
    reason: AtomicU8,
    signal_count: AtomicU8,
}

/// Shared, cloneable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The first reason recorded wins.
    pub fn cancel(&self, reason: CancelReason) {
        let _ = self.state.reason.compare_exchange(
            0,
            reason.to_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.state.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.requested.load(Ordering::SeqCst)
    }

    /// Reason recorded by the first `cancel` call
    pub fn reason(&self) -> Option<CancelReason> {
        CancelReason::from_u8(self.state.reason.load(Ordering::SeqCst))
    }

    /// Handle a SIGINT/SIGTERM delivery
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.state.signal_count.fetch_add(1, Ordering::SeqCst);
        match count {
            0 => {
                self.cancel(CancelReason::Signal);
                SignalAction::InitiateCancellation
            }
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }
}

/// Route Ctrl-C / SIGTERM into `token`.
///
/// Must be called at most once per process.
pub fn install_signal_handler(token: &CancelToken) -> Result<(), ctrlc::Error> {
    let token = token.clone();
    ctrlc::set_handler(move || match token.handle_signal() {
        SignalAction::InitiateCancellation => {
            tracing::warn!("received interrupt, stopping the build");
        }
        SignalAction::ImmediateExit => {
            eprintln!("\nReceived second interrupt, exiting immediately...");
            std::process::exit(EXIT_CODE_CANCELLED);
        }
        SignalAction::Ignore => {}
    })
}
