//! # Wind Data Collection
//!
//! Reads published payload lines (`{speed:5.00,direction:126}`), keeps running
//! statistics and optionally records each valid reading to a CSV file with the columns
//! `timestamp,topic,wind_speed,wind_direction`.
//!
//! Input is taken as raw bytes. A line that is not valid UTF-8 or not a payload is
//! logged and skipped; it never ends the collection. Rows are flushed as they are
//! written, so an interrupted run keeps every reading received up to that point.

use crate::stats::WindStats;
use crate::telemetry::{parse_payload, WindReading};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("collector IO: {0}")]
    Io(#[from] io::Error),

    #[error("CSV output: {0}")]
    Csv(#[from] csv::Error),
}

/// One saved reading; field order is the CSV column order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectedRow {
    /// Local time the reading was received
    pub timestamp: DateTime<Local>,
    pub topic: String,
    pub wind_speed: f64,
    pub wind_direction: f64,
}

/// What happened to one input line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LineOutcome {
    Recorded(WindReading),
    Blank,
    Skipped,
}

pub struct Collector {
    topic: String,
    target: u64,
    stats: WindStats,
    skipped: u64,
    output: Option<csv::Writer<File>>,
}

impl Collector {
    /// Collect up to `target` readings, tagging saved rows with `topic`.
    pub fn new(topic: impl Into<String>, target: u64) -> Self {
        Self {
            topic: topic.into(),
            target,
            stats: WindStats::default(),
            skipped: 0,
            output: None,
        }
    }

    /// Also write every valid reading to a CSV file at `path`, replacing any old file.
    pub fn with_csv_output<P: AsRef<Path>>(mut self, path: P) -> Result<Self, CollectError> {
        let writer = csv::WriterBuilder::new()
            .has_headers(true)
            .from_path(path.as_ref())?;
        log::info!("[Collect] Saving readings to {:?}", path.as_ref());
        self.output = Some(writer);
        Ok(self)
    }

    /// True once `target` valid readings have been recorded.
    pub fn is_complete(&self) -> bool {
        self.stats.count() >= self.target
    }

    /// Handle one input line, without its trailing newline.
    pub fn accept_line(&mut self, line: &[u8]) -> Result<LineOutcome, CollectError> {
        let text = match std::str::from_utf8(line) {
            Ok(text) => text.trim(),
            Err(_) => {
                self.skipped += 1;
                log::warn!(
                    "[Collect] Skipped undecodable line {:?}",
                    String::from_utf8_lossy(line)
                );
                return Ok(LineOutcome::Skipped);
            }
        };
        if text.is_empty() {
            return Ok(LineOutcome::Blank);
        }

        let reading = match parse_payload(text) {
            Ok(reading) => reading,
            Err(e) => {
                self.skipped += 1;
                log::warn!("[Collect] Skipped {text:?}: {e}");
                return Ok(LineOutcome::Skipped);
            }
        };

        self.stats.record(reading.speed, reading.direction);
        if let Some(writer) = self.output.as_mut() {
            writer.serialize(CollectedRow {
                timestamp: Local::now(),
                topic: self.topic.clone(),
                wind_speed: reading.speed,
                wind_direction: reading.direction,
            })?;
            writer.flush()?;
        }
        log::debug!(
            "[Collect] Reading {}/{}: speed={} direction={}",
            self.stats.count(),
            self.target,
            reading.speed,
            reading.direction
        );
        Ok(LineOutcome::Recorded(reading))
    }

    /// Consume newline-separated input until the target is reached or the input ends.
    pub fn run<R: BufRead>(&mut self, input: R) -> Result<(), CollectError> {
        if self.is_complete() {
            return Ok(());
        }
        for line in input.split(b'\n') {
            self.accept_line(&line?)?;
            if self.is_complete() {
                break;
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> &WindStats {
        &self.stats
    }

    /// Non-empty lines that were not valid payloads.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    /// Flush the CSV output and return the statistics.
    pub fn finish(mut self) -> Result<WindStats, CollectError> {
        if let Some(mut writer) = self.output.take() {
            writer.flush()?;
        }
        Ok(self.stats)
    }
}
