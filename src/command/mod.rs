//! # Command Module
//!
//! Closed-loop control from fused telemetry.
//!
//! This module handles:
//! - Angular wraparound normalization ([`angle`])
//! - The altitude-then-heading decision policy and command worker ([`decision`])

pub mod angle;
pub mod decision;

pub use decision::{Command, Directive, Position, Thresholds};
