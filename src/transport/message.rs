//! # Vehicle Message Types
//!
//! Typed messages and commands exchanged with the vehicle. Wire encoding is the
//! link implementation's business; workers only see these types.

use std::fmt;

/// Message type filter for [`VehicleLink::receive_message`](super::VehicleLink::receive_message).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Liveness announcement
    Heartbeat,
    /// Local position and velocity in the NED frame
    LocalPositionNed,
    /// Orientation and angular rates
    Attitude,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Heartbeat => "HEARTBEAT",
            MessageKind::LocalPositionNed => "LOCAL_POSITION_NED",
            MessageKind::Attitude => "ATTITUDE",
        };
        f.write_str(name)
    }
}

/// Position and linear velocity reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalPositionNed {
    /// Vehicle clock, milliseconds since boot
    pub time_boot_ms: u32,
    /// Position (m)
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Velocity (m/s)
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
}

/// Orientation reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attitude {
    /// Vehicle clock, milliseconds since boot
    pub time_boot_ms: u32,
    /// Orientation (rad)
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    /// Angular rates (rad/s)
    pub roll_speed: f64,
    pub pitch_speed: f64,
    pub yaw_speed: f64,
}

/// A message received from the vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VehicleMessage {
    Heartbeat,
    LocalPositionNed(LocalPositionNed),
    Attitude(Attitude),
}

impl VehicleMessage {
    /// The filter kind this message matches.
    pub fn kind(&self) -> MessageKind {
        match self {
            VehicleMessage::Heartbeat => MessageKind::Heartbeat,
            VehicleMessage::LocalPositionNed(_) => MessageKind::LocalPositionNed,
            VehicleMessage::Attitude(_) => MessageKind::Attitude,
        }
    }
}

/// Rotational sense of a yaw command, seen from above in a right-handed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirection {
    Clockwise,
    CounterClockwise,
}

/// A command sent to the vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VehicleCommand {
    /// Ground-station liveness announcement
    Heartbeat,
    /// Climb or descend to an absolute altitude (m)
    ChangeAltitude { target_z: f64 },
    /// Turn by `angle_deg` (non-negative) in `direction`
    ConditionYaw {
        angle_deg: f64,
        direction: TurnDirection,
        relative: bool,
    },
}
