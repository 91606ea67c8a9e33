//! # Worker Module
//!
//! Supervision primitives shared by every worker role.
//!
//! This module handles:
//! - Cooperative exit and pause signaling ([`controller`])
//! - Bounded MPMC queues with a shutdown drain ([`channel`])
//! - Launching and joining homogeneous worker pools ([`pool`])

pub mod channel;
pub mod controller;
pub mod pool;

pub use channel::{BoundedChannel, ChannelError};
pub use controller::WorkerController;
pub use pool::{JoinReport, WorkerContext, WorkerPool};
