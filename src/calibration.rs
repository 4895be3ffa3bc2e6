//! # Calibration Model
//!
//! Maps a channel's rolling average onto north and east wind contributions using a
//! three-point linear model recorded at startup:
//!
//! - **calm**: readings with no wind
//! - **north**: readings under the reference speed blowing along the north axis
//! - **east**: readings under the reference speed blowing along the east axis
//!
//! ```text
//! contribution = reference_speed * (avg - calm) / (reference - calm)
//! ```
//!
//! A zero span (reference equal to calm) is a configuration fault. It is reported when
//! the model is built so the pipeline never runs with a biased substitute.

use crate::Channel;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wind component axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    North,
    East,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::North => write!(f, "north"),
            Axis::East => write!(f, "east"),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum CalibrationError {
    #[error("{axis} reference for the {channel} channel equals its calm reading ({value})")]
    ZeroSpan {
        channel: Channel,
        axis: Axis,
        value: u16,
    },

    #[error("reference reading equals calm reading ({0})")]
    DegenerateSpan(u16),

    #[error("reference speed must be finite and positive, got {0}")]
    InvalidReferenceSpeed(f64),
}

/// Raw readings of both channels under one known wind condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub first: u16,
    pub second: u16,
}

impl CalibrationPoint {
    pub fn reading(&self, channel: Channel) -> u16 {
        match channel {
            Channel::First => self.first,
            Channel::Second => self.second,
        }
    }
}

/// The three reference points plus the wind speed used while recording them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSet {
    pub calm: CalibrationPoint,
    pub north: CalibrationPoint,
    pub east: CalibrationPoint,
    pub reference_speed: f64,
}

impl CalibrationSet {
    pub fn reference(&self, axis: Axis) -> &CalibrationPoint {
        match axis {
            Axis::North => &self.north,
            Axis::East => &self.east,
        }
    }
}

/// Linear map of one channel's average onto one axis.
///
/// Returns [`CalibrationError::DegenerateSpan`] when `reference == calm`.
///
/// # Example
/// ```
/// use anemometer_lib::calibration::contribution;
///
/// assert_eq!(contribution(650.0, 500, 800, 10.0).unwrap(), 5.0);
/// assert_eq!(contribution(500.0, 500, 800, 10.0).unwrap(), 0.0);
/// assert!(contribution(650.0, 500, 500, 10.0).is_err());
/// ```
pub fn contribution(
    avg: f64,
    calm: u16,
    reference: u16,
    reference_speed: f64,
) -> Result<f64, CalibrationError> {
    if reference == calm {
        return Err(CalibrationError::DegenerateSpan(calm));
    }
    Ok(scaled(avg, f64::from(calm), span(calm, reference), reference_speed))
}

fn span(calm: u16, reference: u16) -> f64 {
    f64::from(reference) - f64::from(calm)
}

// Ratio first so avg == reference gives exactly 1.0 and the result is exactly
// the reference speed.
fn scaled(avg: f64, calm: f64, span: f64, reference_speed: f64) -> f64 {
    reference_speed * ((avg - calm) / span)
}

/// Four per-channel, per-axis contributions.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Contributions {
    /// Indexed by [`Channel::index`]
    pub north: [f64; 2],
    /// Indexed by [`Channel::index`]
    pub east: [f64; 2],
}

impl Contributions {
    pub fn north_total(&self) -> f64 {
        self.north[0] + self.north[1]
    }

    pub fn east_total(&self) -> f64 {
        self.east[0] + self.east[1]
    }
}

/// Validated calibration, ready to evaluate.
#[derive(Clone, Debug)]
pub struct CalibrationModel {
    set: CalibrationSet,
    // [axis][channel]
    spans: [[f64; 2]; 2],
}

impl CalibrationModel {
    pub fn new(set: CalibrationSet) -> Result<Self, CalibrationError> {
        if !set.reference_speed.is_finite() || set.reference_speed <= 0.0 {
            return Err(CalibrationError::InvalidReferenceSpeed(set.reference_speed));
        }

        let mut spans = [[0.0; 2]; 2];
        for (axis_idx, axis) in [Axis::North, Axis::East].into_iter().enumerate() {
            for channel in Channel::ALL {
                let calm = set.calm.reading(channel);
                let reference = set.reference(axis).reading(channel);
                if reference == calm {
                    return Err(CalibrationError::ZeroSpan {
                        channel,
                        axis,
                        value: calm,
                    });
                }
                spans[axis_idx][channel.index()] = span(calm, reference);
            }
        }

        Ok(Self { set, spans })
    }

    /// The validated reference points.
    pub fn set(&self) -> &CalibrationSet {
        &self.set
    }

    /// Wind speed the north and east points were recorded at.
    pub fn reference_speed(&self) -> f64 {
        self.set.reference_speed
    }

    /// Span `reference - calm` for one channel on one axis.
    pub fn span(&self, channel: Channel, axis: Axis) -> f64 {
        let axis_idx = match axis {
            Axis::North => 0,
            Axis::East => 1,
        };
        self.spans[axis_idx][channel.index()]
    }

    /// Contribution of one channel average along one axis.
    pub fn contribution(&self, channel: Channel, axis: Axis, avg: f64) -> f64 {
        scaled(
            avg,
            f64::from(self.set.calm.reading(channel)),
            self.span(channel, axis),
            self.set.reference_speed,
        )
    }

    /// Evaluate all four contributions from the two channel averages.
    pub fn contributions(&self, first_avg: f64, second_avg: f64) -> Contributions {
        let mut out = Contributions::default();
        for (channel, avg) in [(Channel::First, first_avg), (Channel::Second, second_avg)] {
            out.north[channel.index()] = self.contribution(channel, Axis::North, avg);
            out.east[channel.index()] = self.contribution(channel, Axis::East, avg);
        }
        out
    }
}
