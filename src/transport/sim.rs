//! # Simulated Vehicle
//!
//! In-process [`VehicleLink`] used by the binary and integration tests when no
//! real link is available.
//!
//! The simulation is deliberately shallow: commands update the pose
//! instantly, telemetry messages become available at a fixed rate, and the
//! heartbeat is always available while enabled. Switches allow tests to
//! silence heartbeats or telemetry and to drop the peer entirely.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::link::{TransportError, VehicleLink};
use super::message::{
    Attitude, LocalPositionNed, MessageKind, TurnDirection, VehicleCommand, VehicleMessage,
};
use crate::command::angle::normalize_radians;

/// Default interval between telemetry messages of one kind (10 Hz)
pub const DEFAULT_TELEMETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Step used while waiting for the peer to appear
const PEER_POLL: Duration = Duration::from_millis(50);

/// Kinematic state of the simulated vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
    pub roll: f64,
    pub pitch: f64,
    /// Radians, kept in (-π, π]
    pub yaw: f64,
}

#[derive(Debug)]
struct SimState {
    pose: SimPose,
    next_position_at: Instant,
    next_attitude_at: Instant,
    commands: Vec<VehicleCommand>,
}

/// Vehicle simulated entirely in memory.
///
/// # Examples
///
/// ```
/// use vehicle_supervisor::transport::sim::{SimPose, SimulatedVehicle};
///
/// let vehicle = SimulatedVehicle::new(SimPose { z: 2.0, ..SimPose::default() });
/// assert_eq!(vehicle.pose().z, 2.0);
/// ```
#[derive(Debug)]
pub struct SimulatedVehicle {
    state: Mutex<SimState>,
    boot: Instant,
    telemetry_interval: Duration,
    heartbeat_enabled: AtomicBool,
    telemetry_enabled: AtomicBool,
    peer_present: AtomicBool,
    heartbeats_received: AtomicU64,
}

impl SimulatedVehicle {
    pub fn new(pose: SimPose) -> Self {
        Self::with_telemetry_interval(pose, DEFAULT_TELEMETRY_INTERVAL)
    }

    pub fn with_telemetry_interval(pose: SimPose, telemetry_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            state: Mutex::new(SimState {
                pose: SimPose {
                    yaw: normalize_radians(pose.yaw),
                    ..pose
                },
                next_position_at: now,
                next_attitude_at: now,
                commands: Vec::new(),
            }),
            boot: now,
            telemetry_interval,
            heartbeat_enabled: AtomicBool::new(true),
            telemetry_enabled: AtomicBool::new(true),
            peer_present: AtomicBool::new(true),
            heartbeats_received: AtomicU64::new(0),
        }
    }

    /// Current pose snapshot.
    pub fn pose(&self) -> SimPose {
        self.state().pose
    }

    /// Commands received so far, heartbeats excluded.
    pub fn commands(&self) -> Vec<VehicleCommand> {
        self.state().commands.clone()
    }

    /// Number of ground-station heartbeats received.
    pub fn heartbeats_received(&self) -> u64 {
        self.heartbeats_received.load(Ordering::Relaxed)
    }

    pub fn set_heartbeat_enabled(&self, enabled: bool) {
        self.heartbeat_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_telemetry_enabled(&self, enabled: bool) {
        self.telemetry_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_peer_present(&self, present: bool) {
        self.peer_present.store(present, Ordering::Relaxed);
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn time_boot_ms(&self) -> u32 {
        u32::try_from(self.boot.elapsed().as_millis()).unwrap_or(u32::MAX)
    }

    fn emit(&self, kind: MessageKind, pose: SimPose) -> VehicleMessage {
        let time_boot_ms = self.time_boot_ms();
        match kind {
            MessageKind::Heartbeat => VehicleMessage::Heartbeat,
            MessageKind::LocalPositionNed => VehicleMessage::LocalPositionNed(LocalPositionNed {
                time_boot_ms,
                x: pose.x,
                y: pose.y,
                z: pose.z,
                vx: pose.vx,
                vy: pose.vy,
                vz: pose.vz,
            }),
            MessageKind::Attitude => VehicleMessage::Attitude(Attitude {
                time_boot_ms,
                roll: pose.roll,
                pitch: pose.pitch,
                yaw: pose.yaw,
                roll_speed: 0.0,
                pitch_speed: 0.0,
                yaw_speed: 0.0,
            }),
        }
    }

    /// Claims the next telemetry slot of `kind` if it is due, otherwise
    /// returns how long until it is.
    fn claim_slot(&self, kind: MessageKind) -> Result<SimPose, Duration> {
        let now = Instant::now();
        let mut state = self.state();
        let pose = state.pose;
        let next_at = match kind {
            MessageKind::LocalPositionNed => &mut state.next_position_at,
            _ => &mut state.next_attitude_at,
        };
        if now >= *next_at {
            *next_at = now + self.telemetry_interval;
            Ok(pose)
        } else {
            Err(*next_at - now)
        }
    }
}

#[async_trait]
impl VehicleLink for SimulatedVehicle {
    async fn send_command(&self, command: VehicleCommand) -> Result<(), TransportError> {
        if !self.is_peer_present() {
            return Err(TransportError::Disconnected);
        }

        match command {
            VehicleCommand::Heartbeat => {
                self.heartbeats_received.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            VehicleCommand::ChangeAltitude { target_z } => {
                self.state().pose.z = target_z;
            }
            VehicleCommand::ConditionYaw {
                angle_deg,
                direction,
                relative,
            } => {
                let signed = match direction {
                    TurnDirection::CounterClockwise => angle_deg.to_radians(),
                    TurnDirection::Clockwise => -angle_deg.to_radians(),
                };
                let mut state = self.state();
                let yaw = if relative {
                    state.pose.yaw + signed
                } else {
                    signed
                };
                state.pose.yaw = normalize_radians(yaw);
            }
        }

        debug!("Simulated vehicle applied {:?}", command);
        self.state().commands.push(command);
        Ok(())
    }

    async fn receive_message(
        &self,
        kind: MessageKind,
        blocking: bool,
        timeout: Duration,
    ) -> Result<Option<VehicleMessage>, TransportError> {
        if !self.is_peer_present() {
            if blocking {
                tokio::time::sleep(timeout).await;
            }
            return Ok(None);
        }

        let enabled = match kind {
            MessageKind::Heartbeat => self.heartbeat_enabled.load(Ordering::Relaxed),
            _ => self.telemetry_enabled.load(Ordering::Relaxed),
        };
        if !enabled {
            if blocking {
                tokio::time::sleep(timeout).await;
            }
            return Ok(None);
        }

        if kind == MessageKind::Heartbeat {
            return Ok(Some(VehicleMessage::Heartbeat));
        }

        match self.claim_slot(kind) {
            Ok(pose) => Ok(Some(self.emit(kind, pose))),
            Err(_) if !blocking => Ok(None),
            Err(wait) if wait > timeout => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
            Err(wait) => {
                tokio::time::sleep(wait).await;
                match self.claim_slot(kind) {
                    Ok(pose) => Ok(Some(self.emit(kind, pose))),
                    Err(_) => Ok(None),
                }
            }
        }
    }

    async fn wait_for_peer(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_peer_present() && self.heartbeat_enabled.load(Ordering::Relaxed) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(PEER_POLL).await;
        }
    }

    fn is_peer_present(&self) -> bool {
        self.peer_present.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[tokio::test]
    async fn test_change_altitude_sets_z() {
        let vehicle = SimulatedVehicle::new(SimPose::default());
        vehicle
            .send_command(VehicleCommand::ChangeAltitude { target_z: 3.5 })
            .await
            .unwrap();
        assert_eq!(vehicle.pose().z, 3.5);
        assert_eq!(vehicle.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_relative_yaw_wraps() {
        let vehicle = SimulatedVehicle::new(SimPose {
            yaw: 170f64.to_radians(),
            ..SimPose::default()
        });
        vehicle
            .send_command(VehicleCommand::ConditionYaw {
                angle_deg: 20.0,
                direction: TurnDirection::CounterClockwise,
                relative: true,
            })
            .await
            .unwrap();

        let yaw = vehicle.pose().yaw;
        assert!(yaw > -PI && yaw <= PI);
        assert!((yaw.to_degrees() - (-170.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_clockwise_turn_decreases_yaw() {
        let vehicle = SimulatedVehicle::new(SimPose::default());
        vehicle
            .send_command(VehicleCommand::ConditionYaw {
                angle_deg: 30.0,
                direction: TurnDirection::Clockwise,
                relative: true,
            })
            .await
            .unwrap();
        assert!((vehicle.pose().yaw.to_degrees() + 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_heartbeat_counted_not_logged_as_command() {
        let vehicle = SimulatedVehicle::new(SimPose::default());
        vehicle.send_command(VehicleCommand::Heartbeat).await.unwrap();
        vehicle.send_command(VehicleCommand::Heartbeat).await.unwrap();
        assert_eq!(vehicle.heartbeats_received(), 2);
        assert!(vehicle.commands().is_empty());
    }

    #[tokio::test]
    async fn test_send_fails_without_peer() {
        let vehicle = SimulatedVehicle::new(SimPose::default());
        vehicle.set_peer_present(false);
        let result = vehicle.send_command(VehicleCommand::Heartbeat).await;
        assert_eq!(result, Err(TransportError::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_telemetry_rate_limited() {
        let vehicle = SimulatedVehicle::new(SimPose::default());
        let kind = MessageKind::LocalPositionNed;

        let first = vehicle.receive_message(kind, false, Duration::ZERO).await.unwrap();
        assert!(first.is_some());

        // Next slot is 100ms away
        let second = vehicle.receive_message(kind, false, Duration::ZERO).await.unwrap();
        assert!(second.is_none());

        let third = vehicle
            .receive_message(kind, true, Duration::from_millis(150))
            .await
            .unwrap();
        assert!(matches!(third, Some(VehicleMessage::LocalPositionNed(p)) if p.time_boot_ms >= 100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silenced_heartbeat() {
        let vehicle = SimulatedVehicle::new(SimPose::default());
        vehicle.set_heartbeat_enabled(false);
        let msg = vehicle
            .receive_message(MessageKind::Heartbeat, false, Duration::ZERO)
            .await
            .unwrap();
        assert!(msg.is_none());
        assert!(!vehicle.wait_for_peer(Duration::from_millis(200)).await);

        vehicle.set_heartbeat_enabled(true);
        assert!(vehicle.wait_for_peer(Duration::from_millis(200)).await);
    }
}
