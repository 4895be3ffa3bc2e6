//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the anemometer.toml file.
//! It provides a centralized way to configure the calibration, the filter window, the
//! sampling and display timing, telemetry and the pin assignments.
//!
//! A missing file falls back to the built-in defaults. A file that exists but cannot be
//! parsed, or whose calibration is degenerate, is an error: running with a guessed
//! calibration would publish biased numbers.

use crate::calibration::{CalibrationError, CalibrationModel, CalibrationPoint, CalibrationSet};
use crate::filter::{FilterError, Warmup};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use std::{fs, io};
use thiserror::Error;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_PATH: &str = "anemometer.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config IO: {0}")]
    Io(#[from] io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("calibration: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("filter: {0}")]
    Filter(#[from] FilterError),

    #[error("ADC channel {0} does not exist (MCP3208 has channels 0-7)")]
    InvalidAdcChannel(u8),
}

/// Application configuration loaded from anemometer.toml
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Reference readings and compass alignment (required in the file)
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
}

/// Three-point calibration recorded at installation
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CalibrationConfig {
    /// Wind speed used while recording the north and east points
    pub reference_speed: f64,
    /// Degrees added to the computed angle so 0 points at compass north
    pub bearing_offset: i32,
    pub calm: CalibrationPoint,
    pub north: CalibrationPoint,
    pub east: CalibrationPoint,
}

impl CalibrationConfig {
    pub fn set(&self) -> CalibrationSet {
        CalibrationSet {
            calm: self.calm,
            north: self.north,
            east: self.east,
            reference_speed: self.reference_speed,
        }
    }
}

/// Rolling average settings
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Number of readings averaged per channel
    pub window: usize,
    pub warmup: Warmup,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            window: 32,
            warmup: Warmup::ZeroPadded,
        }
    }
}

/// Acquisition timing
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Minimum time between two acquisitions (any channel)
    pub min_interval_us: u64,
    /// Queue depth between the acquisition thread and the main loop (continuous mode)
    pub handoff_capacity: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            min_interval_us: 500,
            handoff_capacity: crate::handoff::DEFAULT_CAPACITY,
        }
    }
}

/// Display timing
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Time each digit stays lit before moving to the next
    pub refresh_interval_us: u64,
    /// How often development mode prints the readout to stdout
    pub print_interval_ms: u64,
}

impl DisplayConfig {
    /// Print interval in microseconds; absurdly large values saturate instead of overflowing.
    pub fn print_interval_us(&self) -> u64 {
        self.print_interval_ms.saturating_mul(1_000)
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_interval_us: 1_000,
            print_interval_ms: 1_000,
        }
    }
}

/// Telemetry relay settings
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// HTTP bridge URL; without one, messages are only logged
    pub endpoint: Option<String>,
    pub topic: String,
    pub publish_interval_ms: u64,
    pub queue_capacity: usize,
    pub timeout_ms: u64,
}

impl TelemetryConfig {
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            topic: crate::telemetry::DEFAULT_TOPIC.to_string(),
            publish_interval_ms: 1_000,
            queue_capacity: 16,
            timeout_ms: 5_000,
        }
    }
}

/// Synthetic wind for `--simulate`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub speed: f64,
    /// Compass bearing in degrees
    pub direction: f64,
    /// Uniform noise amplitude in ADC counts
    pub noise: u16,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            speed: 6.0,
            direction: 225.0,
            noise: 4,
            seed: 7,
        }
    }
}

/// Pin and bus assignments (BCM numbering)
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub spi_clock_hz: u32,
    pub first_adc_channel: u8,
    pub second_adc_channel: u8,
    /// Digit enable lines, most significant digit first
    pub digit_pins: [u8; 4],
    /// Segment lines 0-7
    pub segment_pins: [u8; 8],
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            spi_clock_hz: 1_000_000,
            first_adc_channel: 0,
            second_adc_channel: 1,
            digit_pins: [5, 6, 13, 19],
            segment_pins: [12, 16, 20, 21, 26, 17, 27, 22],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            calibration: CalibrationConfig {
                reference_speed: 10.0,
                bearing_offset: 90,
                calm: CalibrationPoint {
                    first: 2048,
                    second: 2048,
                },
                north: CalibrationPoint {
                    first: 2348,
                    second: 2148,
                },
                east: CalibrationPoint {
                    first: 2148,
                    second: 2448,
                },
            },
            filter: FilterConfig::default(),
            sampler: SamplerConfig::default(),
            display: DisplayConfig::default(),
            telemetry: TelemetryConfig::default(),
            simulation: SimulationConfig::default(),
            hardware: HardwareConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from anemometer.toml in the working directory
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(DEFAULT_PATH)
    }

    /// Load and validate configuration from the specified path
    /// Falls back to the default configuration only if the file doesn't exist
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = match fs::read_to_string(&path) {
            Ok(contents) => {
                let config = toml::from_str::<Config>(&contents)?;
                log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                config
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!(
                    "[Config] No config file at {:?}, using default calibration",
                    path.as_ref()
                );
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check everything that would otherwise fail later at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        CalibrationModel::new(self.calibration.set())?;
        if self.filter.window == 0 {
            return Err(FilterError::EmptyWindow.into());
        }
        for channel in [self.hardware.first_adc_channel, self.hardware.second_adc_channel] {
            if channel > 7 {
                return Err(ConfigError::InvalidAdcChannel(channel));
            }
        }
        Ok(())
    }

    /// Save current configuration to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        log::info!("[Config] Configuration saved to {:?}", path.as_ref());
        Ok(())
    }
}
