//! # Rolling Average Filter
//!
//! Each channel keeps a fixed window of its last N raw readings together with a
//! running sum, so a new reading costs one subtraction and one addition.
//!
//! ## Warm-up
//! The window starts zero-filled. Under [`Warmup::ZeroPadded`] the divisor is always N,
//! so the first N readings are biased toward zero, matching the physical warm-up of the
//! transducers. [`Warmup::Partial`] divides by the number of readings seen instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterError {
    #[error("rolling average window must hold at least one sample")]
    EmptyWindow,
}

/// Divisor used before the window has filled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Warmup {
    /// Unfilled slots count as zeros (divide by N)
    #[default]
    ZeroPadded,
    /// Divide by the number of samples seen so far, capped at N
    Partial,
}

/// Per-channel rolling state.
#[derive(Clone, Debug)]
pub struct ChannelState {
    buffer: Vec<u16>,
    sum: u64,
    cursor: usize,
    count: usize,
    warmup: Warmup,
}

impl ChannelState {
    pub fn new(window: usize, warmup: Warmup) -> Result<Self, FilterError> {
        if window == 0 {
            return Err(FilterError::EmptyWindow);
        }
        Ok(Self {
            buffer: vec![0; window],
            sum: 0,
            cursor: 0,
            count: 0,
            warmup,
        })
    }

    /// Push a raw reading and return the updated average.
    pub fn update(&mut self, raw: u16) -> f64 {
        let evicted = std::mem::replace(&mut self.buffer[self.cursor], raw);
        self.sum = self.sum - u64::from(evicted) + u64::from(raw);
        self.cursor = (self.cursor + 1) % self.buffer.len();
        if self.count < self.buffer.len() {
            self.count += 1;
        }

        self.average_unchecked()
    }

    /// Current average, or `None` before the first reading.
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.average_unchecked())
    }

    fn average_unchecked(&self) -> f64 {
        let divisor = match self.warmup {
            Warmup::ZeroPadded => self.buffer.len(),
            Warmup::Partial => self.count.max(1),
        };
        self.sum as f64 / divisor as f64
    }

    /// Running sum of the readings currently in the window.
    pub fn sum(&self) -> u64 {
        self.sum
    }

    /// Samples seen so far, capped at the window size.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Configured window size N.
    pub fn window(&self) -> usize {
        self.buffer.len()
    }

    /// True once N readings have been seen and the warm-up bias is gone.
    pub fn is_warm(&self) -> bool {
        self.count == self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_of_four_evicts_oldest() {
        let mut state = ChannelState::new(4, Warmup::ZeroPadded).unwrap();
        for raw in [10, 20, 30] {
            state.update(raw);
        }
        assert_eq!(state.update(40), 25.0);
        assert!(state.is_warm());

        // 10 falls out of the window
        assert_eq!(state.update(50), 35.0);
        assert_eq!(state.sum(), 20 + 30 + 40 + 50);
    }

    #[test]
    fn test_zero_padded_warmup_biases_toward_zero() {
        let mut state = ChannelState::new(4, Warmup::ZeroPadded).unwrap();
        assert_eq!(state.average(), None);
        assert_eq!(state.update(100), 25.0);
        assert_eq!(state.update(100), 50.0);
        assert_eq!(state.count(), 2);
    }

    #[test]
    fn test_partial_warmup_divides_by_count() {
        let mut state = ChannelState::new(4, Warmup::Partial).unwrap();
        assert_eq!(state.update(100), 100.0);
        assert_eq!(state.update(200), 150.0);
    }

    #[test]
    fn test_sum_tracks_buffer_over_many_wraps() {
        let mut state = ChannelState::new(7, Warmup::ZeroPadded).unwrap();
        let readings: Vec<u16> = (0..100u16).map(|i| (i * 37) % 4096).collect();
        for (i, &raw) in readings.iter().enumerate() {
            let avg = state.update(raw);
            if i >= 6 {
                let window = &readings[i - 6..=i];
                let expected = window.iter().map(|&v| f64::from(v)).sum::<f64>() / 7.0;
                assert!((avg - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_zero_window_rejected() {
        assert_eq!(
            ChannelState::new(0, Warmup::Partial).unwrap_err(),
            FilterError::EmptyWindow
        );
    }
}
