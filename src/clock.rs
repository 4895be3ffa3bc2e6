//! Monotonic clock abstraction and elapsed-time gates.
//!
//! The control loop never sleeps on its hot path. Every periodic action (sampling,
//! display refresh, telemetry) is guarded by an [`IntervalGate`] that compares the
//! current clock reading with the last time the action fired.

use std::cell::Cell;
use std::time::Instant;

/// Source of monotonic microseconds.
pub trait Clock {
    fn now_us(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

/// Wall-clock backed monotonic time, counted from construction.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

/// Manually advanced clock for deterministic tests and replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self {
            now: Cell::new(start_us),
        }
    }

    pub fn advance(&self, us: u64) {
        self.now.set(self.now.get() + us);
    }

    pub fn set(&self, us: u64) {
        self.now.set(us);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now.get()
    }
}

/// Fires at most once per interval; the first check always fires.
#[derive(Clone, Copy, Debug)]
pub struct IntervalGate {
    interval_us: u64,
    last_us: Option<u64>,
}

impl IntervalGate {
    pub fn new(interval_us: u64) -> Self {
        Self {
            interval_us,
            last_us: None,
        }
    }

    pub fn interval_us(&self) -> u64 {
        self.interval_us
    }

    /// True when the interval has elapsed since the last time it fired.
    pub fn is_due(&self, now_us: u64) -> bool {
        match self.last_us {
            None => true,
            Some(last) => now_us.saturating_sub(last) >= self.interval_us,
        }
    }

    /// Check and, if due, restart the interval from `now_us`.
    pub fn ready(&mut self, now_us: u64) -> bool {
        if self.is_due(now_us) {
            self.last_us = Some(now_us);
            true
        } else {
            false
        }
    }

    /// Restart the interval without checking.
    pub fn mark(&mut self, now_us: u64) {
        self.last_us = Some(now_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_fires_once_per_interval() {
        let clock = ManualClock::new(1_000);
        let mut gate = IntervalGate::new(500);

        assert!(gate.ready(clock.now_us()));
        assert!(!gate.ready(clock.now_us()));

        clock.advance(499);
        assert!(!gate.ready(clock.now_us()));

        clock.advance(1);
        assert!(gate.ready(clock.now_us()));
    }

    #[test]
    fn test_gate_mark_restarts_interval() {
        let mut gate = IntervalGate::new(100);
        gate.mark(50);
        assert!(!gate.is_due(149));
        assert!(gate.is_due(150));
    }

    #[test]
    fn test_monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let a = clock.now_us();
        let b = clock.now_us();
        assert!(b >= a);
    }
}
