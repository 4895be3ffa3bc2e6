//! # Alternating Dual-Channel Sampler
//!
//! The sampler owns the acquisition schedule:
//!
//! - **Alternation**: channels are read strictly First, Second, First, ... A channel is
//!   never read twice in a row.
//! - **Minimum interval**: no acquisition happens until `min_interval_us` has elapsed
//!   since the previous attempt. A poll that arrives early is a no-op; the control loop
//!   simply polls again on its next pass.
//! - **No retries**: a failed read is not retried or queued. The gate restarts and the
//!   same channel is attempted on the next slot, so a miss only delays alternation.
//!
//! Accepted readings go straight to a [`SampleSink`]: the [`Estimator`] when sampling
//! on the main loop, or a handoff producer when sampling on a separate thread.
//!
//! [`Estimator`]: crate::estimator::Estimator

use crate::clock::{Clock, IntervalGate};
use crate::{Channel, RawSample, SampleError, WindEstimate};
use thiserror::Error;

/// Failure reported by a raw sample source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("ADC read failed: {0}")]
    Read(String),

    #[error("ADC transfer failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that can produce a raw ADC reading for a channel on demand.
pub trait SampleSource {
    fn read(&mut self, channel: Channel) -> Result<u16, SourceError>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn read(&mut self, channel: Channel) -> Result<u16, SourceError> {
        (**self).read(channel)
    }
}

/// Consumer of accepted readings.
pub trait SampleSink {
    /// Take one reading; returns a fresh estimate when the sink computes one.
    fn accept(&mut self, sample: RawSample) -> Option<WindEstimate>;
}

/// Result of one pass through [`Sampler::poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Minimum interval has not elapsed yet
    NotDue,
    /// A reading was taken and handed to the sink
    Acquired {
        sample: RawSample,
        estimate: Option<WindEstimate>,
    },
    /// The reading was outside the ADC range and was discarded
    Rejected { channel: Channel, value: u16 },
    /// The source failed; this channel will be tried again next slot
    Missed { channel: Channel },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub acquired: u64,
    pub rejected: u64,
    pub missed: u64,
}

pub struct Sampler<C: Clock> {
    clock: C,
    gate: IntervalGate,
    next_channel: Channel,
    stats: SamplerStats,
}

impl<C: Clock> Sampler<C> {
    pub fn new(clock: C, min_interval_us: u64) -> Self {
        Self {
            clock,
            gate: IntervalGate::new(min_interval_us),
            next_channel: Channel::First,
            stats: SamplerStats::default(),
        }
    }

    /// Run one scheduling pass.
    pub fn poll<S, K>(&mut self, source: &mut S, sink: &mut K) -> PollOutcome
    where
        S: SampleSource + ?Sized,
        K: SampleSink + ?Sized,
    {
        let now = self.clock.now_us();
        if !self.gate.ready(now) {
            return PollOutcome::NotDue;
        }

        let channel = self.next_channel;
        let value = match source.read(channel) {
            Ok(value) => value,
            Err(e) => {
                self.stats.missed += 1;
                log::warn!("[Sampler] Missed {channel} channel slot: {e}");
                return PollOutcome::Missed { channel };
            }
        };

        // The slot is spent either way; alternation moves on.
        self.next_channel = channel.other();

        match RawSample::new(channel, value, now) {
            Ok(sample) => {
                self.stats.acquired += 1;
                let estimate = sink.accept(sample);
                PollOutcome::Acquired { sample, estimate }
            }
            Err(SampleError::OutOfRange { channel, value }) => {
                self.stats.rejected += 1;
                log::warn!("[Sampler] Discarding out-of-range {channel} channel reading {value}");
                PollOutcome::Rejected { channel, value }
            }
        }
    }

    /// Channel the next due slot will read.
    pub fn next_channel(&self) -> Channel {
        self.next_channel
    }

    /// Acquired, rejected and missed slot counts so far.
    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    /// Minimum spacing between two acquisitions.
    pub fn min_interval_us(&self) -> u64 {
        self.gate.interval_us()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
