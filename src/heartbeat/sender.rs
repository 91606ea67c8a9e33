//! # Heartbeat Sender
//!
//! Announces the ground station to the vehicle once per period. Sending is
//! best-effort: a failed send is logged and the next period tries again.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::transport::{TransportError, VehicleCommand, VehicleLink};
use crate::worker::WorkerContext;

/// Heartbeat sending logic.
#[derive(Clone)]
pub struct HeartbeatSender {
    link: Arc<dyn VehicleLink>,
}

impl std::fmt::Debug for HeartbeatSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatSender").finish_non_exhaustive()
    }
}

impl HeartbeatSender {
    pub fn new(link: Arc<dyn VehicleLink>) -> Self {
        Self { link }
    }

    /// Sends one heartbeat, logging any failure.
    pub async fn run(&self) -> std::result::Result<(), TransportError> {
        let result = self.link.send_command(VehicleCommand::Heartbeat).await;
        match &result {
            Ok(()) => debug!("Heartbeat sent"),
            Err(e) => error!("Failed to send heartbeat: {}", e),
        }
        result
    }
}

/// Heartbeat sender worker: one heartbeat per `period` until exit.
pub async fn heartbeat_sender_worker(
    ctx: WorkerContext,
    sender: HeartbeatSender,
    period: Duration,
    poll: Duration,
) -> Result<()> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !ctx.controller.is_exit_requested() {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = ctx.controller.exit_requested() => break,
        }
        ctx.controller.wait_while_paused(poll).await;
        if ctx.controller.is_exit_requested() {
            break;
        }
        let _ = sender.run().await;
    }

    info!("Heartbeat sender stopping");
    Ok(())
}
