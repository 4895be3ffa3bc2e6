//! Running statistics over collected wind readings.
//!
//! Mirrors the summary the data collector prints after a collection run: count, mean,
//! min, max and sample standard deviation for speed and for direction. Values are
//! accumulated with Welford's update so nothing is buffered.

use std::fmt;

/// Streaming summary of one quantity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Summary {
    pub count: u64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    m2: f64,
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            m2: 0.0,
        }
    }
}

impl Summary {
    pub fn record(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Sample standard deviation; `None` with fewer than two values.
    pub fn std_dev(&self) -> Option<f64> {
        (self.count > 1).then(|| (self.m2 / (self.count - 1) as f64).sqrt())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WindStats {
    pub speed: Summary,
    pub direction: Summary,
}

impl WindStats {
    pub fn record(&mut self, speed: f64, direction: f64) {
        self.speed.record(speed);
        self.direction.record(direction);
    }

    pub fn count(&self) -> u64 {
        self.speed.count
    }
}

impl fmt::Display for WindStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count() == 0 {
            return writeln!(f, "No readings collected.");
        }

        writeln!(f, "Total readings: {}", self.count())?;
        writeln!(f, "Wind speed:")?;
        writeln!(f, "   Average: {:.3}", self.speed.mean)?;
        writeln!(f, "   Min: {:.3}", self.speed.min)?;
        writeln!(f, "   Max: {:.3}", self.speed.max)?;
        if let Some(sd) = self.speed.std_dev() {
            writeln!(f, "   Standard deviation: {sd:.3}")?;
        }
        writeln!(f, "Wind direction:")?;
        writeln!(f, "   Average: {:.1}°", self.direction.mean)?;
        writeln!(f, "   Min: {:.1}°", self.direction.min)?;
        writeln!(f, "   Max: {:.1}°", self.direction.max)?;
        if let Some(sd) = self.direction.std_dev() {
            writeln!(f, "   Standard deviation: {sd:.1}°")?;
        }
        Ok(())
    }
}
