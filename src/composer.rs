//! # Vector Composer
//!
//! Sums the per-channel contributions into north and east components and turns them
//! into a rounded speed and a compass bearing.
//!
//! - **Speed**: Euclidean norm of the two axis sums
//! - **Direction**: `bearing_offset - atan2(north, east)` in whole degrees, wrapped
//!   into `0..360`
//!
//! A calm reading (both components exactly zero) has no defined angle; it is reported
//! as speed 0, direction 0.

use crate::calibration::Contributions;
use crate::WindEstimate;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VectorComposer {
    bearing_offset: i32,
}

impl VectorComposer {
    pub fn new(bearing_offset: i32) -> Self {
        Self { bearing_offset }
    }

    pub fn bearing_offset(&self) -> i32 {
        self.bearing_offset
    }

    pub fn compose(&self, contributions: &Contributions) -> WindEstimate {
        self.compose_components(contributions.north_total(), contributions.east_total())
    }

    pub fn compose_components(&self, north: f64, east: f64) -> WindEstimate {
        if north == 0.0 && east == 0.0 {
            return WindEstimate {
                speed: 0,
                direction: 0,
            };
        }

        let speed = north.hypot(east).round() as i32;
        let angle = north.atan2(east).to_degrees().round() as i64;
        WindEstimate {
            speed,
            direction: normalize_degrees(i64::from(self.bearing_offset) - angle),
        }
    }
}

/// Wrap any whole-degree angle into `0..360`.
pub fn normalize_degrees(degrees: i64) -> u16 {
    degrees.rem_euclid(360) as u16
}
