//! # Worker Controller
//!
//! Process-wide cooperative signaling shared by every worker.
//!
//! The controller carries two independent signals:
//!
//! - **exit requested**: a [`CancellationToken`], monotone, once cancelled it
//!   never clears for the session. Workers blocked on a long tick or a slow
//!   read race it with `tokio::select!` so shutdown is not held up by their
//!   period.
//! - **paused**: a plain atomic toggle, last writer wins
//!
//! Reads on the worker hot path never block. A fresh controller is created per
//! supervision session; cloning shares both signals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Cloneable handle to the shared lifecycle signals.
///
/// # Examples
///
/// ```
/// use vehicle_supervisor::worker::controller::WorkerController;
///
/// let controller = WorkerController::new();
/// let worker_view = controller.clone();
///
/// controller.request_exit();
/// assert!(worker_view.is_exit_requested());
/// ```
#[derive(Debug, Clone, Default)]
pub struct WorkerController {
    exit: CancellationToken,
    paused: Arc<AtomicBool>,
}

impl WorkerController {
    /// Creates a controller with exit not requested and not paused.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every worker to stop. Idempotent.
    pub fn request_exit(&self) {
        self.exit.cancel();
    }

    /// Returns true once exit has been requested.
    pub fn is_exit_requested(&self) -> bool {
        self.exit.is_cancelled()
    }

    /// Completes once exit has been requested.
    ///
    /// Cancel-safe; meant to be raced against a worker's blocking step.
    pub async fn exit_requested(&self) {
        self.exit.cancelled().await;
    }

    /// Pauses workers at the top of their next iteration.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Clears the paused flag.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    /// Non-blocking read of the paused flag.
    pub fn check_pause(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Sleeps in `poll` steps while paused.
    ///
    /// Returns immediately when not paused, and as soon as exit is requested
    /// while paused.
    pub async fn wait_while_paused(&self, poll: Duration) {
        while self.check_pause() && !self.is_exit_requested() {
            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = self.exit_requested() => break,
            }
        }
    }
}
