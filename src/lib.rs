//! # Vehicle Supervisor Library
//!
//! Supervises a set of cooperating workers that keep a ground station in
//! contact with a vehicle and steer it toward a fixed target.
//!
//! Workers exchange heartbeats, fuse position and attitude telemetry into
//! snapshots, and turn each snapshot into an altitude or heading correction.
//! They run as independent tokio tasks connected by bounded channels and share
//! one set of lifecycle flags; the [`supervisor`] starts them, watches their
//! outputs for a bounded session and shuts them down in order.

pub mod command;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod supervisor;
pub mod telemetry;
pub mod transport;
pub mod worker;
