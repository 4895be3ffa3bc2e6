//! # Simulated Transducer Source
//!
//! Produces raw readings for development without the ADC attached. Given a wind speed
//! and compass direction, it works the calibration model backwards to find the two
//! channel readings that the estimator will map back onto that wind.
//!
//! ## Model Inversion
//! With `x = avg - calm` per channel and the north/east spans `a`, `b`:
//!
//! ```text
//! north / R = x1 / a1 + x2 / a2
//! east  / R = x1 / b1 + x2 / b2
//! ```
//!
//! a 2x2 linear system solved directly. Calibrations whose north and east spans are
//! proportional across the two channels cannot separate the axes; the source then
//! reports calm readings and logs a warning.
//!
//! ## Noise
//! Optional uniform noise of `±noise` ADC counts from a seeded RNG keeps runs
//! reproducible. Readings are clamped into the ADC range.

use crate::calibration::{Axis, CalibrationModel};
use crate::config::Config;
use crate::estimator::EstimatorError;
use crate::sampler::{SampleSource, SourceError};
use crate::{Channel, ADC_MAX};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct SimulatedSource {
    model: CalibrationModel,
    bearing_offset: i32,
    readings: [f64; 2],
    noise: u16,
    rng: StdRng,
}

impl SimulatedSource {
    pub fn new(model: CalibrationModel, bearing_offset: i32, noise: u16, seed: u64) -> Self {
        let calm = model.set().calm;
        Self {
            readings: [f64::from(calm.first), f64::from(calm.second)],
            model,
            bearing_offset,
            noise,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, EstimatorError> {
        let model = CalibrationModel::new(config.calibration.set())?;
        let sim = &config.simulation;
        let mut source = Self::new(model, config.calibration.bearing_offset, sim.noise, sim.seed);
        source.set_wind(sim.speed, sim.direction);
        log::info!(
            "[Simulation] Wind {} from {}°, noise ±{} counts",
            sim.speed,
            sim.direction,
            sim.noise
        );
        Ok(source)
    }

    /// Change the simulated wind. `direction` is a compass bearing in degrees.
    pub fn set_wind(&mut self, speed: f64, direction: f64) {
        let theta = (f64::from(self.bearing_offset) - direction).to_radians();
        let north = speed * theta.sin() / self.model.reference_speed();
        let east = speed * theta.cos() / self.model.reference_speed();

        let inv = |channel, axis| 1.0 / self.model.span(channel, axis);
        let (n1, n2) = (inv(Channel::First, Axis::North), inv(Channel::Second, Axis::North));
        let (e1, e2) = (inv(Channel::First, Axis::East), inv(Channel::Second, Axis::East));

        let calm = self.model.set().calm;
        let det = n1 * e2 - n2 * e1;
        if det.abs() < f64::EPSILON {
            log::warn!("[Simulation] Calibration cannot separate north from east, simulating calm");
            self.readings = [f64::from(calm.first), f64::from(calm.second)];
            return;
        }

        let x1 = (north * e2 - east * n2) / det;
        let x2 = (east * n1 - north * e1) / det;
        self.readings = [f64::from(calm.first) + x1, f64::from(calm.second) + x2];
    }

    /// Noise-free readings for the current wind.
    pub fn readings(&self) -> [f64; 2] {
        self.readings
    }
}

impl SampleSource for SimulatedSource {
    fn read(&mut self, channel: Channel) -> Result<u16, SourceError> {
        let jitter = if self.noise > 0 {
            let n = i32::from(self.noise);
            f64::from(self.rng.gen_range(-n..=n))
        } else {
            0.0
        };
        let value = (self.readings[channel.index()] + jitter).round();
        Ok(value.clamp(0.0, f64::from(ADC_MAX)) as u16)
    }
}
