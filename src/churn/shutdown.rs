//! Interrupt-driven shutdown of the churn driver.
//!
//! The listener task never touches the pool. It only cancels a token; the
//! driver loop notices the cancellation between ticks and performs the
//! close-all and drain itself, so a resize and a shutdown can never overlap.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::churn::pool::DrainReport;
use crate::signals::interrupt_signal;

/// What the final close-all did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Live members signalled at shutdown.
    pub signaled: usize,
    /// Signals that could not be delivered.
    pub signal_failures: usize,
    /// Result of waiting for the signalled members.
    pub drain: DrainReport,
}

/// Owns the cancellation token shared between the interrupt listener and
/// the driver loop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    cancel: CancellationToken,
}

impl ShutdownCoordinator {
    /// Coordinator with a fresh token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token the driver loop watches.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request shutdown without an OS signal.
    pub fn request(&self) {
        self.cancel.cancel();
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Spawn the task that turns the first interrupt into a cancellation.
    ///
    /// The task ends on its own once the token is cancelled by other means.
    #[must_use]
    pub fn install(&self) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = interrupt_signal() => {
                    info!("interrupt received, requesting churn shutdown");
                    cancel.cancel();
                }
                () = cancel.cancelled() => {}
            }
        })
    }
}
