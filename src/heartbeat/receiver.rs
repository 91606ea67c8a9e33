//! # Heartbeat Receiver
//!
//! Tracks vehicle liveness from periodic heartbeat receipts.
//!
//! ## State machine
//!
//! ```text
//!                 heartbeat                 missed >= threshold
//! Disconnected ─────────────► Connected ─────────────────────► Disconnected
//!      ▲                          │
//!      └──── (initial state)      └── heartbeat: missed = 0
//! ```
//!
//! Any received heartbeat resets the miss counter. The state only drops to
//! `Disconnected` once the counter reaches the threshold (5 periods by default).

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SupervisorError};
use crate::transport::{MessageKind, VehicleLink};
use crate::worker::{BoundedChannel, WorkerContext};

/// Consecutive missed periods before the vehicle counts as disconnected
pub const DEFAULT_DISCONNECT_THRESHOLD: u32 = 5;

/// Connection health as seen by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LivenessState {
    Connected,
    Disconnected,
}

impl fmt::Display for LivenessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LivenessState::Connected => f.write_str("Connected"),
            LivenessState::Disconnected => f.write_str("Disconnected"),
        }
    }
}

/// Heartbeat receiving logic.
pub struct HeartbeatReceiver {
    link: Arc<dyn VehicleLink>,
    state: LivenessState,
    missed: u32,
    threshold: u32,
}

impl fmt::Debug for HeartbeatReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeartbeatReceiver")
            .field("state", &self.state)
            .field("missed", &self.missed)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl HeartbeatReceiver {
    /// Creates a receiver in the `Disconnected` state.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::Config`] if `threshold` is 0.
    pub fn new(link: Arc<dyn VehicleLink>, threshold: u32) -> Result<Self> {
        if threshold == 0 {
            return Err(SupervisorError::Config(
                "heartbeat disconnect threshold must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            link,
            state: LivenessState::Disconnected,
            missed: 0,
            threshold,
        })
    }

    pub fn state(&self) -> LivenessState {
        self.state
    }

    /// Consecutive periods without a heartbeat.
    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// Attempts one non-blocking heartbeat receive and updates the state.
    pub async fn run(&mut self) -> LivenessState {
        match self
            .link
            .receive_message(MessageKind::Heartbeat, false, Duration::ZERO)
            .await
        {
            Ok(Some(_)) => self.record_heartbeat(),
            Ok(None) => self.record_miss(),
            Err(e) => {
                error!("There was a problem receiving the heartbeat: {}", e);
                self.record_miss();
            }
        }
        self.state
    }

    /// Applies a successful receive.
    pub fn record_heartbeat(&mut self) {
        self.missed = 0;
        if self.state == LivenessState::Disconnected {
            self.state = LivenessState::Connected;
            info!("The vehicle is connected");
        }
    }

    /// Applies a period without a heartbeat.
    pub fn record_miss(&mut self) {
        self.missed = self.missed.saturating_add(1);
        if self.missed >= self.threshold {
            if self.missed == self.threshold {
                warn!(
                    "The vehicle has been disconnected ({} heartbeats missed)",
                    self.missed
                );
            } else {
                debug!("{} heartbeats missed", self.missed);
            }
            self.state = LivenessState::Disconnected;
        } else {
            info!("{} heartbeats missed", self.missed);
        }
    }
}

/// Heartbeat receiver worker: one receive per `period`, state published every cycle.
pub async fn heartbeat_receiver_worker(
    ctx: WorkerContext,
    mut receiver: HeartbeatReceiver,
    output: BoundedChannel<LivenessState>,
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

        let state = receiver.run().await;
        ctx.publish(&output, state, poll).await;
    }

    info!("Heartbeat receiver stopping in state {}", receiver.state());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::link::mocks::ScriptedLink;
    use crate::transport::{TransportError, VehicleMessage};
    use crate::worker::{WorkerController, WorkerPool};

    fn receiver(link: &ScriptedLink) -> HeartbeatReceiver {
        HeartbeatReceiver::new(Arc::new(link.clone()), DEFAULT_DISCONNECT_THRESHOLD).unwrap()
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let link: Arc<dyn VehicleLink> = Arc::new(ScriptedLink::new());
        assert!(HeartbeatReceiver::new(link, 0).is_err());
    }

    #[test]
    fn test_initial_state_disconnected() {
        let link = ScriptedLink::new();
        let rx = receiver(&link);
        assert_eq!(rx.state(), LivenessState::Disconnected);
        assert_eq!(rx.missed(), 0);
    }

    #[test]
    fn test_first_heartbeat_connects() {
        let link = ScriptedLink::new();
        let mut rx = receiver(&link);
        rx.record_heartbeat();
        assert_eq!(rx.state(), LivenessState::Connected);
    }

    #[test]
    fn test_exactly_five_misses_disconnect() {
        let link = ScriptedLink::new();
        let mut rx = receiver(&link);
        rx.record_heartbeat();

        for expected in 1..=4 {
            rx.record_miss();
            assert_eq!(rx.missed(), expected);
            assert_eq!(rx.state(), LivenessState::Connected);
        }
        rx.record_miss();
        assert_eq!(rx.missed(), 5);
        assert_eq!(rx.state(), LivenessState::Disconnected);
    }

    #[test]
    fn test_four_misses_then_success_resets_counter() {
        let link = ScriptedLink::new();
        let mut rx = receiver(&link);
        rx.record_heartbeat();

        for _ in 0..4 {
            rx.record_miss();
        }
        rx.record_heartbeat();
        assert_eq!(rx.missed(), 0);
        assert_eq!(rx.state(), LivenessState::Connected);

        // Counter really restarted: four more misses keep the link up
        for _ in 0..4 {
            rx.record_miss();
        }
        assert_eq!(rx.state(), LivenessState::Connected);
    }

    #[test]
    fn test_reconnect_after_disconnect() {
        let link = ScriptedLink::new();
        let mut rx = receiver(&link);
        rx.record_heartbeat();
        for _ in 0..7 {
            rx.record_miss();
        }
        assert_eq!(rx.state(), LivenessState::Disconnected);

        rx.record_heartbeat();
        assert_eq!(rx.state(), LivenessState::Connected);
        assert_eq!(rx.missed(), 0);
    }

    #[tokio::test]
    async fn test_run_consumes_link_replies() {
        let link = ScriptedLink::new();
        link.push_message(VehicleMessage::Heartbeat);
        link.push_silence(MessageKind::Heartbeat, 1);
        link.push_reply(
            MessageKind::Heartbeat,
            Err(TransportError::Receive("socket closed".to_string())),
        );

        let mut rx = receiver(&link);
        assert_eq!(rx.run().await, LivenessState::Connected);
        assert_eq!(rx.run().await, LivenessState::Connected);
        assert_eq!(rx.missed(), 1);
        assert_eq!(rx.run().await, LivenessState::Connected);
        assert_eq!(rx.missed(), 2);
    }

    #[test]
    fn test_state_strings() {
        assert_eq!(LivenessState::Connected.to_string(), "Connected");
        assert_eq!(LivenessState::Disconnected.to_string(), "Disconnected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_publishes_every_period() {
        let link = ScriptedLink::new();
        link.push_message(VehicleMessage::Heartbeat);

        let controller = WorkerController::new();
        let output = BoundedChannel::new(0);
        let out = output.clone();
        let shared: Arc<dyn VehicleLink> = Arc::new(link.clone());
        let mut pool = WorkerPool::create("heartbeat_receiver", 1, controller.clone(), move |ctx| {
            let rx = HeartbeatReceiver::new(Arc::clone(&shared), 5);
            let out = out.clone();
            async move {
                heartbeat_receiver_worker(
                    ctx,
                    rx?,
                    out,
                    Duration::from_secs(1),
                    Duration::from_millis(100),
                )
                .await
            }
        })
        .unwrap();
        pool.start();

        // Ticks at 0s..=6s: one heartbeat, then silence
        tokio::time::sleep(Duration::from_millis(6500)).await;
        controller.request_exit();
        let report = pool.join(Duration::from_secs(2)).await;
        assert!(report.is_clean());

        let states = output.drain();
        assert_eq!(states.len(), 7);
        assert_eq!(&states[..5], &[LivenessState::Connected; 5]);
        assert_eq!(&states[5..], &[LivenessState::Disconnected; 2]);
    }
    #[tokio::test(start_paused = true)]
    async fn test_worker_stops_mid_period_on_exit() {
        let link = ScriptedLink::new();
        link.push_message(VehicleMessage::Heartbeat);

        let controller = WorkerController::new();
        let output = BoundedChannel::new(0);
        let out = output.clone();
        let shared: Arc<dyn VehicleLink> = Arc::new(link.clone());
        let mut pool = WorkerPool::create("heartbeat_receiver", 1, controller.clone(), move |ctx| {
            let rx = HeartbeatReceiver::new(Arc::clone(&shared), 5);
            let out = out.clone();
            async move {
                heartbeat_receiver_worker(
                    ctx,
                    rx?,
                    out,
                    Duration::from_secs(60),
                    Duration::from_millis(100),
                )
                .await
            }
        })
        .unwrap();
        pool.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        controller.request_exit();
        let start = tokio::time::Instant::now();
        let report = pool.join(Duration::from_millis(100)).await;
        assert_eq!(report.forced, 0);
        assert!(report.is_clean());
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(output.drain(), vec![LivenessState::Connected]);
    }
}
