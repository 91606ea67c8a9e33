//! # Transport Module
//!
//! Typed boundary to the vehicle link.
//!
//! This module handles:
//! - The [`VehicleLink`] trait workers use to send commands and receive messages
//! - Typed vehicle messages and commands
//! - An in-process simulated vehicle for running without hardware
//!
//! Wire-level encoding lives behind the trait; nothing here touches bytes.

pub mod link;
pub mod message;
pub mod sim;

pub use link::{TransportError, VehicleLink};
pub use message::{
    Attitude, LocalPositionNed, MessageKind, TurnDirection, VehicleCommand, VehicleMessage,
};
