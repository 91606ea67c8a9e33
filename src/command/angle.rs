//! # Angular Wraparound
//!
//! Normalizes angles onto half-open canonical intervals:
//!
//! - radians: `(-π, π]`
//! - degrees: `(-180, 180]`
//!
//! The upper bound is inclusive, so a difference of exactly half a turn always
//! resolves to `+π` / `+180` (a counter-clockwise turn), never to the negative
//! side. Angles already inside the interval are returned unchanged, which makes
//! normalization exactly idempotent.

use std::f64::consts::PI;

const TAU: f64 = 2.0 * PI;

/// Wraps `angle` into `(-half_turn, half_turn]`.
fn wrap(angle: f64, half_turn: f64) -> f64 {
    if angle > -half_turn && angle <= half_turn {
        return angle;
    }
    let full_turn = 2.0 * half_turn;
    let wrapped = half_turn - (half_turn - angle).rem_euclid(full_turn);
    // rem_euclid may round up to full_turn for inputs just past a boundary
    if wrapped <= -half_turn {
        wrapped + full_turn
    } else {
        wrapped
    }
}

/// Normalizes a radian angle into `(-π, π]`.
///
/// # Examples
///
/// ```
/// use std::f64::consts::PI;
/// use vehicle_supervisor::command::angle::normalize_radians;
///
/// assert_eq!(normalize_radians(-PI), PI);
/// assert!((normalize_radians(1.5 * PI) + 0.5 * PI).abs() < 1e-12);
/// ```
pub fn normalize_radians(angle: f64) -> f64 {
    wrap(angle, PI)
}

/// Normalizes a degree angle into `(-180, 180]`.
///
/// # Examples
///
/// ```
/// use vehicle_supervisor::command::angle::normalize_degrees;
///
/// assert_eq!(normalize_degrees(-180.0), 180.0);
/// assert_eq!(normalize_degrees(270.0), -90.0);
/// ```
pub fn normalize_degrees(angle: f64) -> f64 {
    wrap(angle, 180.0)
}

/// Signed shortest turn from `current` to `target`, both in radians.
///
/// Positive is counter-clockwise. The result lies in `(-π, π]`.
pub fn heading_error(target: f64, current: f64) -> f64 {
    normalize_radians(normalize_radians(target) - normalize_radians(current))
}
