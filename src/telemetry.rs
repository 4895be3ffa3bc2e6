//! # Telemetry Relay
//!
//! Publishes the latest estimate as a `(topic, payload)` pair. Delivery is best effort:
//! nothing waits for an acknowledgement and failures are only logged.
//!
//! ## Payload Format
//! The same compact text the field units and data collector already speak:
//!
//! ```text
//! {speed:5.00,direction:126}
//! ```
//!
//! ## Transports
//! - [`LogRelay`]: writes each message to the log (development, no network)
//! - [`HttpRelay`]: forwards each message as JSON to an HTTP bridge in front of the
//!   message broker. Requests run on a tokio task; the control loop only does a
//!   non-blocking `try_send` into a bounded queue and drops the message when it is full.

use crate::clock::IntervalGate;
use crate::WindEstimate;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Topic the anemometer publishes under unless configured otherwise.
pub const DEFAULT_TOPIC: &str = "ultrasonic_anemometer/data";

/// Errors that can occur while setting up a relay or reading payloads.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// HTTP client could not be built
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Text that is not a `{speed:..,direction:..}` payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("missing `{0}` field")]
    MissingField(&'static str),

    #[error("invalid number for `{field}`: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Speed and direction as read back from a payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindReading {
    pub speed: f64,
    pub direction: f64,
}

/// Render an estimate in the wire format.
pub fn format_payload(estimate: &WindEstimate) -> String {
    format!(
        "{{speed:{:.2},direction:{}}}",
        f64::from(estimate.speed),
        estimate.direction
    )
}

/// Parse a payload line. Unknown keys are ignored; field order does not matter.
pub fn parse_payload(text: &str) -> Result<WindReading, PayloadError> {
    let body = text.trim().trim_start_matches('{').trim_end_matches('}');

    let mut speed = None;
    let mut direction = None;
    for part in body.split(',') {
        let Some((key, value)) = part.split_once(':') else {
            continue;
        };
        let value = value.trim();
        let field = match key.trim() {
            "speed" => ("speed", &mut speed),
            "direction" => ("direction", &mut direction),
            _ => continue,
        };
        let parsed = value.parse::<f64>().ok().filter(|v| v.is_finite());
        *field.1 = Some(parsed.ok_or_else(|| PayloadError::InvalidNumber {
            field: field.0,
            value: value.to_string(),
        })?);
    }

    Ok(WindReading {
        speed: speed.ok_or(PayloadError::MissingField("speed"))?,
        direction: direction.ok_or(PayloadError::MissingField("direction"))?,
    })
}

/// One outbound message.
#[derive(Clone, Debug, Serialize)]
pub struct TelemetryMessage {
    pub topic: String,
    pub payload: String,
    pub sent_at: DateTime<Utc>,
}

impl TelemetryMessage {
    pub fn new(topic: &str, payload: &str) -> Self {
        Self {
            topic: topic.to_string(),
            payload: payload.to_string(),
            sent_at: Utc::now(),
        }
    }
}

/// Best-effort publisher.
pub trait TelemetryRelay {
    fn publish(&mut self, topic: &str, payload: &str);
}

/// Relay that only logs.
#[derive(Debug, Default)]
pub struct LogRelay;

impl TelemetryRelay for LogRelay {
    fn publish(&mut self, topic: &str, payload: &str) {
        log::info!("[Telemetry] {topic} {payload}");
    }
}

/// Relay posting JSON messages to an HTTP bridge from a background task.
pub struct HttpRelay {
    tx: mpsc::Sender<TelemetryMessage>,
    dropped: u64,
}

impl HttpRelay {
    /// Start the sender task on `handle`.
    pub fn spawn(
        handle: &tokio::runtime::Handle,
        endpoint: String,
        capacity: usize,
        timeout: Duration,
    ) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let (tx, mut rx) = mpsc::channel::<TelemetryMessage>(capacity.max(1));

        handle.spawn(async move {
            while let Some(message) = rx.recv().await {
                let result = client
                    .post(&endpoint)
                    .json(&message)
                    .send()
                    .await
                    .and_then(|response| response.error_for_status());
                match result {
                    Ok(_) => log::debug!("[Telemetry] Published to {}", message.topic),
                    Err(e) => log::warn!("[Telemetry] Failed to publish to {endpoint}: {e}"),
                }
            }
            log::debug!("[Telemetry] HTTP relay stopped");
        });

        log::info!("[Telemetry] HTTP relay started (queue {capacity}, timeout {timeout:?})");
        Ok(Self { tx, dropped: 0 })
    }

    /// Messages discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl TelemetryRelay for HttpRelay {
    fn publish(&mut self, topic: &str, payload: &str) {
        match self.tx.try_send(TelemetryMessage::new(topic, payload)) {
            Ok(()) => (),
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                log::debug!("[Telemetry] Queue full, dropping message ({} so far)", self.dropped);
            }
            Err(TrySendError::Closed(_)) => {
                log::warn!("[Telemetry] Relay task has stopped, message not sent");
            }
        }
    }
}

/// Rate-limited publishing of the latest estimate.
pub struct TelemetryPublisher {
    relay: Box<dyn TelemetryRelay>,
    topic: String,
    gate: IntervalGate,
    published: u64,
}

impl TelemetryPublisher {
    pub fn new(relay: Box<dyn TelemetryRelay>, topic: impl Into<String>, interval: Duration) -> Self {
        Self {
            relay,
            topic: topic.into(),
            gate: IntervalGate::new(interval.as_micros() as u64),
            published: 0,
        }
    }

    /// Publish `estimate` if the interval has elapsed. Returns whether it was sent.
    pub fn maybe_publish(&mut self, now_us: u64, estimate: &WindEstimate) -> bool {
        if !self.gate.ready(now_us) {
            return false;
        }
        self.relay.publish(&self.topic, &format_payload(estimate));
        self.published += 1;
        true
    }

    pub fn published(&self) -> u64 {
        self.published
    }
}
