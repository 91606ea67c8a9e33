//! # Control Decision
//!
//! Turns each telemetry snapshot into at most one corrective directive.
//!
//! Checks run in strict priority order:
//!
//! 1. **Altitude**: if `|target.z - z|` exceeds the altitude threshold, climb
//!    or descend and stop there for this cycle.
//! 2. **Heading**: otherwise turn toward the target when the signed bearing
//!    error exceeds the yaw threshold. Positive errors are counter-clockwise.
//! 3. Otherwise nothing is emitted.
//!
//! A bearing error of exactly half a turn resolves to `+180°`, so the vehicle
//! turns counter-clockwise (see [`angle`](super::angle)).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use super::angle::{heading_error, normalize_degrees};
use crate::error::{Result, SupervisorError};
use crate::telemetry::TelemetrySnapshot;
use crate::transport::{TurnDirection, VehicleCommand, VehicleLink};
use crate::worker::{BoundedChannel, WorkerContext};

/// Default altitude error tolerated before correcting (m)
pub const DEFAULT_ALTITUDE_THRESHOLD_M: f64 = 0.5;

/// Default heading error tolerated before correcting (degrees)
pub const DEFAULT_YAW_THRESHOLD_DEG: f64 = 5.0;

/// Point in the telemetry frame.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Result of one control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    /// Required altitude change (m), `target.z - current.z`
    AltitudeChange { delta_m: f64 },
    /// Signed heading change in (-180, 180] degrees, positive counter-clockwise
    YawChange { delta_deg: f64 },
    NoAction,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::AltitudeChange { delta_m } => write!(f, "CHANGE_ALTITUDE: {}", delta_m),
            Directive::YawChange { delta_deg } => write!(f, "CHANGE_YAW: {}", delta_deg),
            Directive::NoAction => f.write_str("NO_ACTION"),
        }
    }
}

/// Error tolerances for the decision policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub altitude_m: f64,
    pub yaw_deg: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            altitude_m: DEFAULT_ALTITUDE_THRESHOLD_M,
            yaw_deg: DEFAULT_YAW_THRESHOLD_DEG,
        }
    }
}

/// Pure decision step.
///
/// # Examples
///
/// ```
/// use vehicle_supervisor::command::decision::{decide, Directive, Position, Thresholds};
/// use vehicle_supervisor::telemetry::TelemetrySnapshot;
///
/// let current = TelemetrySnapshot { z: 1.0, ..TelemetrySnapshot::default() };
/// let directive = decide(&Position::new(1.0, 1.0, 1.0), &current, &Thresholds::default());
///
/// match directive {
///     Directive::YawChange { delta_deg } => assert!((delta_deg - 45.0).abs() < 1e-9),
///     other => panic!("unexpected {:?}", other),
/// }
/// ```
pub fn decide(target: &Position, current: &TelemetrySnapshot, thresholds: &Thresholds) -> Directive {
    let altitude_delta = target.z - current.z;
    if altitude_delta.abs() > thresholds.altitude_m {
        return Directive::AltitudeChange {
            delta_m: altitude_delta,
        };
    }

    let dx = target.x - current.x;
    let dy = target.y - current.y;
    if dx == 0.0 && dy == 0.0 {
        // Directly above or below the target: no bearing to turn toward
        return Directive::NoAction;
    }

    let bearing = dy.atan2(dx);
    let delta_deg = normalize_degrees(heading_error(bearing, current.yaw).to_degrees());
    if delta_deg.abs() > thresholds.yaw_deg {
        return Directive::YawChange { delta_deg };
    }

    Directive::NoAction
}

/// Running mean of velocity samples, kept for observability only.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VelocityLog {
    sum: [f64; 3],
    samples: u64,
}

impl VelocityLog {
    pub fn record(&mut self, snapshot: &TelemetrySnapshot) {
        self.sum[0] += snapshot.x_velocity;
        self.sum[1] += snapshot.y_velocity;
        self.sum[2] += snapshot.z_velocity;
        self.samples += 1;
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Mean (vx, vy, vz), `None` before the first sample.
    pub fn mean(&self) -> Option<[f64; 3]> {
        if self.samples == 0 {
            return None;
        }
        let n = self.samples as f64;
        Some([self.sum[0] / n, self.sum[1] / n, self.sum[2] / n])
    }
}

/// Closed-loop controller steering the vehicle toward a fixed target.
pub struct Command {
    link: Arc<dyn VehicleLink>,
    target: Position,
    thresholds: Thresholds,
    velocity: VelocityLog,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("target", &self.target)
            .field("thresholds", &self.thresholds)
            .field("velocity", &self.velocity)
            .finish_non_exhaustive()
    }
}

impl Command {
    /// Creates a controller for `target`.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::Config`] if the target is not finite or a threshold
    /// is not a positive finite number.
    pub fn new(link: Arc<dyn VehicleLink>, target: Position, thresholds: Thresholds) -> Result<Self> {
        if ![target.x, target.y, target.z].iter().all(|v| v.is_finite()) {
            return Err(SupervisorError::Config(
                "command target must be finite".to_string(),
            ));
        }
        if !(thresholds.altitude_m.is_finite() && thresholds.altitude_m > 0.0) {
            return Err(SupervisorError::Config(
                "altitude threshold must be a positive number".to_string(),
            ));
        }
        if !(thresholds.yaw_deg > 0.0 && thresholds.yaw_deg < 180.0) {
            return Err(SupervisorError::Config(
                "yaw threshold must be between 0 and 180 degrees".to_string(),
            ));
        }
        Ok(Self {
            link,
            target,
            thresholds,
            velocity: VelocityLog::default(),
        })
    }

    pub fn target(&self) -> Position {
        self.target
    }

    pub fn velocity_log(&self) -> &VelocityLog {
        &self.velocity
    }

    /// Runs one control cycle: records velocity, decides, and commands the vehicle.
    ///
    /// Transport failures are logged; the directive is returned regardless.
    pub async fn run(&mut self, snapshot: &TelemetrySnapshot) -> Directive {
        self.velocity.record(snapshot);
        if let Some([vx, vy, vz]) = self.velocity.mean() {
            info!("Average velocity is ({:.3}, {:.3}, {:.3}) m/s", vx, vy, vz);
        }

        let directive = decide(&self.target, snapshot, &self.thresholds);
        let command = match directive {
            Directive::AltitudeChange { .. } => VehicleCommand::ChangeAltitude {
                target_z: self.target.z,
            },
            Directive::YawChange { delta_deg } => VehicleCommand::ConditionYaw {
                angle_deg: delta_deg.abs(),
                direction: if delta_deg > 0.0 {
                    TurnDirection::CounterClockwise
                } else {
                    TurnDirection::Clockwise
                },
                relative: true,
            },
            Directive::NoAction => {
                debug!("On target, no action");
                return directive;
            }
        };

        if let Err(e) = self.link.send_command(command).await {
            error!("Failed to send {:?}: {}", command, e);
        }
        directive
    }
}

/// Command worker: runs one cycle per received snapshot and publishes every
/// directive other than `NoAction`.
pub async fn command_worker(
    ctx: WorkerContext,
    mut command: Command,
    input: BoundedChannel<TelemetrySnapshot>,
    output: BoundedChannel<Directive>,
    poll: Duration,
) -> Result<()> {
    while !ctx.controller.is_exit_requested() {
        ctx.controller.wait_while_paused(poll).await;

        let Some(snapshot) = input.get_timeout(poll).await else {
            continue;
        };
        if ctx.controller.is_exit_requested() {
            break;
        }

        let directive = command.run(&snapshot).await;
        if directive != Directive::NoAction {
            ctx.publish(&output, directive, poll).await;
        }
    }

    info!(
        "Command worker stopping after {} snapshots",
        command.velocity_log().samples()
    );
    Ok(())
}
