//! # Ultrasonic Anemometer Core Library
//!
//! This library provides the sampling-and-estimation pipeline for a dual-channel
//! ultrasonic anemometer. Two transducer paths are read through a 12-bit ADC; the
//! wind shifts each path's time of flight, which shows up as a shift in the raw reading.
//!
//! ## Data Flow
//! 1. **Sampler**: alternates between the two channels, gated by a minimum interval
//! 2. **Filter**: each channel keeps a rolling average over the last N readings
//! 3. **Calibration**: each average is mapped to north/east contributions using three
//!    recorded reference points (calm, north, east)
//! 4. **Composer**: contributions are summed per axis and turned into speed and bearing
//! 5. **Outputs**: the four-digit display shows the speed, telemetry publishes both
//!
//! The [`collector`] module reads published payloads back for offline analysis.
//!
//! ## Timing Model
//! Everything runs on one cooperative loop. Timing gates compare elapsed microseconds
//! from an injected [`clock::Clock`] instead of sleeping, so the whole pipeline can be
//! driven deterministically from tests.
//!
//! ## Core Types
//! - [`Channel`]: which transducer path a reading came from
//! - [`RawSample`]: a single validated ADC reading
//! - [`WindEstimate`]: rounded speed and compass direction

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Module declarations
pub mod calibration;
pub mod clock;
pub mod collector;
pub mod composer;
pub mod config;
pub mod display;
pub mod estimator;
pub mod filter;
pub mod handoff;
#[cfg(all(target_os = "linux", feature = "hardware"))]
pub mod hardware;
pub mod renderer;
pub mod sampler;
pub mod simulation;
pub mod stats;
pub mod telemetry;

/// Largest value the 12-bit ADC can report.
pub const ADC_MAX: u16 = 4095;

/// One of the two transducer signal paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    First,
    Second,
}

impl Channel {
    /// Both channels in acquisition order.
    pub const ALL: [Channel; 2] = [Channel::First, Channel::Second];

    /// The channel sampled after this one.
    pub fn other(self) -> Channel {
        match self {
            Channel::First => Channel::Second,
            Channel::Second => Channel::First,
        }
    }

    /// Array index used for per-channel state.
    pub fn index(self) -> usize {
        match self {
            Channel::First => 0,
            Channel::Second => 1,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::First => write!(f, "first"),
            Channel::Second => write!(f, "second"),
        }
    }
}

/// Reading rejected before it reaches the filter.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleError {
    #[error("{channel} channel reading {value} exceeds ADC range 0..={max}", max = ADC_MAX)]
    OutOfRange { channel: Channel, value: u16 },
}

/// A single ADC reading.
///
/// Values are guaranteed to be within `0..=4095`; the only way to build one is
/// [`RawSample::new`], which rejects anything larger.
///
/// # Example
/// ```
/// use anemometer_lib::{Channel, RawSample};
///
/// let sample = RawSample::new(Channel::First, 2048, 1_000).unwrap();
/// assert_eq!(sample.value(), 2048);
///
/// assert!(RawSample::new(Channel::Second, 5000, 1_500).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RawSample {
    channel: Channel,
    value: u16,
    timestamp_us: u64,
}

impl RawSample {
    pub fn new(channel: Channel, value: u16, timestamp_us: u64) -> Result<Self, SampleError> {
        if value > ADC_MAX {
            return Err(SampleError::OutOfRange { channel, value });
        }
        Ok(Self {
            channel,
            value,
            timestamp_us,
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn value(&self) -> u16 {
        self.value
    }

    /// Monotonic acquisition time in microseconds.
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }
}

/// Latest wind estimate.
///
/// `speed` is rounded and uses the same unit as the calibration reference speed.
/// `direction` is a compass bearing in whole degrees, always within `0..360`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindEstimate {
    pub speed: i32,
    pub direction: u16,
}
