//! # Telemetry Fuser
//!
//! Joins the position/velocity source and the orientation source into one
//! [`TelemetrySnapshot`] per cycle.
//!
//! Each cycle polls both sources with a short per-message timeout, repeating
//! until both have arrived or the cycle budget runs out. Fusion is
//! all-or-nothing: if either reading is missing when the budget expires, the
//! cycle produces nothing, and no reading carries over into the next cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::TelemetrySnapshot;
use crate::error::{Result, SupervisorError};
use crate::transport::{MessageKind, VehicleLink, VehicleMessage};
use crate::worker::{BoundedChannel, WorkerContext};

/// Time limits for one fusion cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FusionBudget {
    /// Wall-clock time allowed to collect both readings
    pub cycle: Duration,
    /// Timeout of a single receive attempt
    pub message_timeout: Duration,
}

impl Default for FusionBudget {
    fn default() -> Self {
        Self {
            cycle: Duration::from_secs(1),
            message_timeout: Duration::from_millis(50),
        }
    }
}

/// Telemetry fusion over a shared vehicle link.
#[derive(Clone)]
pub struct Telemetry {
    link: Arc<dyn VehicleLink>,
    budget: FusionBudget,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

impl Telemetry {
    /// Creates a fuser reading from `link`.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::Config`] if either limit is zero or the message
    /// timeout exceeds the cycle budget.
    pub fn new(link: Arc<dyn VehicleLink>, budget: FusionBudget) -> Result<Self> {
        if budget.cycle.is_zero() || budget.message_timeout.is_zero() {
            return Err(SupervisorError::Config(
                "telemetry cycle budget and message timeout must be greater than 0".to_string(),
            ));
        }
        if budget.message_timeout > budget.cycle {
            return Err(SupervisorError::Config(
                "telemetry message timeout cannot exceed the cycle budget".to_string(),
            ));
        }
        Ok(Self { link, budget })
    }

    /// Runs one fusion cycle.
    ///
    /// Returns `None` when the budget expires before both readings arrive.
    pub async fn run(&self) -> Option<TelemetrySnapshot> {
        let deadline = Instant::now() + self.budget.cycle;
        let mut position = None;
        let mut attitude = None;

        loop {
            if position.is_some() && attitude.is_some() {
                break;
            }
            let Some(timeout) = self.remaining(deadline) else {
                break;
            };

            if position.is_none() {
                if let Some(VehicleMessage::LocalPositionNed(p)) =
                    self.poll(MessageKind::LocalPositionNed, timeout).await
                {
                    debug!("LOCAL_POSITION_NED received");
                    position = Some(p);
                }
            }

            if attitude.is_none() {
                // The position poll may have used up most of the budget
                let Some(timeout) = self.remaining(deadline) else {
                    break;
                };
                if let Some(VehicleMessage::Attitude(a)) =
                    self.poll(MessageKind::Attitude, timeout).await
                {
                    debug!("ATTITUDE received");
                    attitude = Some(a);
                }
            }
        }

        match (position, attitude) {
            (Some(p), Some(a)) => {
                let snapshot = TelemetrySnapshot::fuse(&p, &a);
                info!("Telemetry snapshot created at {}ms", snapshot.time_boot_ms);
                Some(snapshot)
            }
            (p, a) => {
                warn!(
                    position_received = p.is_some(),
                    attitude_received = a.is_some(),
                    "No telemetry snapshot within {:?}",
                    self.budget.cycle
                );
                None
            }
        }
    }

    /// Per-message timeout clipped to the time left before `deadline`.
    fn remaining(&self, deadline: Instant) -> Option<Duration> {
        let left = deadline.saturating_duration_since(Instant::now());
        (!left.is_zero()).then(|| self.budget.message_timeout.min(left))
    }

    async fn poll(&self, kind: MessageKind, timeout: Duration) -> Option<VehicleMessage> {
        match self.link.receive_message(kind, true, timeout).await {
            Ok(message) => message.filter(|m| m.kind() == kind),
            Err(e) => {
                warn!("Failed to receive {}: {}", kind, e);
                // Keep the cycle cadence even when the link errors out immediately
                tokio::time::sleep(timeout).await;
                None
            }
        }
    }
}

/// Telemetry worker: fuses snapshots until exit and publishes them to `output`.
pub async fn telemetry_worker(
    ctx: WorkerContext,
    telemetry: Telemetry,
    output: BoundedChannel<TelemetrySnapshot>,
    poll: Duration,
) -> Result<()> {
    while !ctx.controller.is_exit_requested() {
        ctx.controller.wait_while_paused(poll).await;
        if ctx.controller.is_exit_requested() {
            break;
        }

        let fused = tokio::select! {
            fused = telemetry.run() => fused,
            _ = ctx.controller.exit_requested() => break,
        };
        match fused {
            Some(snapshot) => {
                if ctx.publish(&output, snapshot, poll).await {
                    debug!("Telemetry snapshot sent to command worker");
                }
            }
            None => warn!("No telemetry snapshot could be sent to command worker"),
        }
    }

    info!("Telemetry worker stopping");
    Ok(())
}
