//! # Telemetry Module
//!
//! Fuses position and orientation readings into consistent snapshots.
//!
//! This module handles:
//! - The [`TelemetrySnapshot`] type consumed by the control loop
//! - Time-budgeted fusion of the two telemetry sources ([`fuser`])
//! - JSONL recording of supervisor outputs with file rotation ([`recorder`])

pub mod fuser;
pub mod recorder;

use std::fmt;

use crate::command::angle::normalize_radians;
use crate::transport::{Attitude, LocalPositionNed};

/// One consistent view of the vehicle state.
///
/// Only built from a position reading and an orientation reading received in
/// the same fusion cycle, so every field is always populated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetrySnapshot {
    /// Vehicle clock (ms), the later of the two source timestamps
    pub time_boot_ms: u32,
    /// Position (m)
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Velocity (m/s)
    pub x_velocity: f64,
    pub y_velocity: f64,
    pub z_velocity: f64,
    /// Orientation (rad), yaw in (-π, π]
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    /// Angular rates (rad/s)
    pub roll_speed: f64,
    pub pitch_speed: f64,
    pub yaw_speed: f64,
}

impl TelemetrySnapshot {
    /// Combines a position and an orientation reading.
    ///
    /// # Examples
    ///
    /// ```
    /// use vehicle_supervisor::telemetry::TelemetrySnapshot;
    /// use vehicle_supervisor::transport::{Attitude, LocalPositionNed};
    ///
    /// let position = LocalPositionNed { time_boot_ms: 120, x: 1.0, y: 2.0, z: 3.0, vx: 0.0, vy: 0.0, vz: 0.0 };
    /// let attitude = Attitude { time_boot_ms: 150, roll: 0.0, pitch: 0.0, yaw: 0.5, roll_speed: 0.0, pitch_speed: 0.0, yaw_speed: 0.0 };
    ///
    /// let snapshot = TelemetrySnapshot::fuse(&position, &attitude);
    /// assert_eq!(snapshot.time_boot_ms, 150);
    /// ```
    pub fn fuse(position: &LocalPositionNed, attitude: &Attitude) -> Self {
        Self {
            time_boot_ms: position.time_boot_ms.max(attitude.time_boot_ms),
            x: position.x,
            y: position.y,
            z: position.z,
            x_velocity: position.vx,
            y_velocity: position.vy,
            z_velocity: position.vz,
            roll: attitude.roll,
            pitch: attitude.pitch,
            yaw: normalize_radians(attitude.yaw),
            roll_speed: attitude.roll_speed,
            pitch_speed: attitude.pitch_speed,
            yaw_speed: attitude.yaw_speed,
        }
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={}ms pos=({:.2}, {:.2}, {:.2}) vel=({:.2}, {:.2}, {:.2}) rpy=({:.3}, {:.3}, {:.3})",
            self.time_boot_ms,
            self.x,
            self.y,
            self.z,
            self.x_velocity,
            self.y_velocity,
            self.z_velocity,
            self.roll,
            self.pitch,
            self.yaw
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn position(time_boot_ms: u32) -> LocalPositionNed {
        LocalPositionNed {
            time_boot_ms,
            x: 1.0,
            y: 2.0,
            z: 3.0,
            vx: 0.1,
            vy: 0.2,
            vz: 0.3,
        }
    }

    fn attitude(time_boot_ms: u32, yaw: f64) -> Attitude {
        Attitude {
            time_boot_ms,
            roll: 0.01,
            pitch: 0.02,
            yaw,
            roll_speed: 0.4,
            pitch_speed: 0.5,
            yaw_speed: 0.6,
        }
    }

    #[test]
    fn test_fuse_uses_later_timestamp() {
        let snapshot = TelemetrySnapshot::fuse(&position(500), &attitude(400, 0.0));
        assert_eq!(snapshot.time_boot_ms, 500);

        let snapshot = TelemetrySnapshot::fuse(&position(300), &attitude(400, 0.0));
        assert_eq!(snapshot.time_boot_ms, 400);
    }

    #[test]
    fn test_fuse_copies_every_field() {
        let snapshot = TelemetrySnapshot::fuse(&position(1), &attitude(2, 0.7));
        assert_eq!((snapshot.x, snapshot.y, snapshot.z), (1.0, 2.0, 3.0));
        assert_eq!(
            (snapshot.x_velocity, snapshot.y_velocity, snapshot.z_velocity),
            (0.1, 0.2, 0.3)
        );
        assert_eq!((snapshot.roll, snapshot.pitch, snapshot.yaw), (0.01, 0.02, 0.7));
        assert_eq!(
            (snapshot.roll_speed, snapshot.pitch_speed, snapshot.yaw_speed),
            (0.4, 0.5, 0.6)
        );
    }

    #[test]
    fn test_fuse_normalizes_yaw() {
        let snapshot = TelemetrySnapshot::fuse(&position(1), &attitude(1, -PI));
        assert_eq!(snapshot.yaw, PI);

        let snapshot = TelemetrySnapshot::fuse(&position(1), &attitude(1, 1.5 * PI));
        assert!((snapshot.yaw + 0.5 * PI).abs() < 1e-12);
    }
}
