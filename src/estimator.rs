//! # Wind Estimator
//!
//! Owns the per-channel rolling state, the validated calibration and the composer.
//! Every accepted [`RawSample`] updates its channel and, once both channels have seen
//! at least one reading, produces a fresh [`WindEstimate`] that replaces the previous
//! one.
//!
//! Construction is the fail-closed point of the pipeline: an invalid calibration or
//! window never yields an `Estimator`, so no estimate can ever be produced from it.

use crate::calibration::{CalibrationError, CalibrationModel, Contributions};
use crate::composer::VectorComposer;
use crate::config::Config;
use crate::filter::{ChannelState, FilterError, Warmup};
use crate::sampler::SampleSink;
use crate::{Channel, RawSample, WindEstimate};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum EstimatorError {
    #[error("calibration: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("filter: {0}")]
    Filter(#[from] FilterError),
}

#[derive(Clone, Debug)]
pub struct Estimator {
    channels: [ChannelState; 2],
    model: CalibrationModel,
    composer: VectorComposer,
    latest: Option<WindEstimate>,
    contributions: Option<Contributions>,
}

impl Estimator {
    pub fn new(
        model: CalibrationModel,
        composer: VectorComposer,
        window: usize,
        warmup: Warmup,
    ) -> Result<Self, FilterError> {
        Ok(Self {
            channels: [
                ChannelState::new(window, warmup)?,
                ChannelState::new(window, warmup)?,
            ],
            model,
            composer,
            latest: None,
            contributions: None,
        })
    }

    /// Validate the calibration and filter settings and build the pipeline.
    pub fn from_config(config: &Config) -> Result<Self, EstimatorError> {
        let model = CalibrationModel::new(config.calibration.set())?;
        let composer = VectorComposer::new(config.calibration.bearing_offset);
        let estimator = Self::new(
            model,
            composer,
            config.filter.window,
            config.filter.warmup,
        )?;
        log::info!(
            "[Estimator] Ready: window {} ({:?} warm-up), reference speed {}, bearing offset {}",
            config.filter.window,
            config.filter.warmup,
            config.calibration.reference_speed,
            config.calibration.bearing_offset
        );
        Ok(estimator)
    }

    /// Feed one reading and recompute.
    ///
    /// Returns `None` until both channels have at least one reading.
    pub fn push(&mut self, sample: RawSample) -> Option<WindEstimate> {
        self.channels[sample.channel().index()].update(sample.value());
        self.recompute()
    }

    fn recompute(&mut self) -> Option<WindEstimate> {
        let first = self.channels[Channel::First.index()].average()?;
        let second = self.channels[Channel::Second.index()].average()?;

        let contributions = self.model.contributions(first, second);
        let estimate = self.composer.compose(&contributions);
        log::trace!(
            "[Estimator] avg=({first:.1}, {second:.1}) north={:.3} east={:.3} -> {estimate:?}",
            contributions.north_total(),
            contributions.east_total()
        );

        self.contributions = Some(contributions);
        self.latest = Some(estimate);
        Some(estimate)
    }

    /// Most recent estimate, `None` until both channels have a reading.
    pub fn latest(&self) -> Option<WindEstimate> {
        self.latest
    }

    /// Per-channel contributions behind the latest estimate.
    pub fn contributions(&self) -> Option<Contributions> {
        self.contributions
    }

    /// Current rolling average of one channel.
    pub fn average(&self, channel: Channel) -> Option<f64> {
        self.channels[channel.index()].average()
    }

    /// Filter state of one channel.
    pub fn channel_state(&self, channel: Channel) -> &ChannelState {
        &self.channels[channel.index()]
    }

    pub fn model(&self) -> &CalibrationModel {
        &self.model
    }
}

impl SampleSink for Estimator {
    fn accept(&mut self, sample: RawSample) -> Option<WindEstimate> {
        self.push(sample)
    }
}
