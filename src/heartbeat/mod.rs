//! # Heartbeat Module
//!
//! Liveness exchange with the vehicle.
//!
//! This module handles:
//! - Sending a ground-station heartbeat every period ([`sender`])
//! - Receiving vehicle heartbeats and tracking connection state ([`receiver`])

pub mod receiver;
pub mod sender;

pub use receiver::{HeartbeatReceiver, LivenessState, DEFAULT_DISCONNECT_THRESHOLD};
pub use sender::HeartbeatSender;
