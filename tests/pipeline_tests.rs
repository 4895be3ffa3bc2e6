//! # End-to-End Pipeline Tests
//!
//! These tests drive the full acquisition path (sampler, filter, calibration model and
//! vector composer) through the public API, using a manual clock so timing is
//! deterministic. The continuous-mode test is the only one that uses real threads.

use anemometer_lib::calibration::{contribution, CalibrationModel, CalibrationPoint, CalibrationSet};
use anemometer_lib::clock::{ManualClock, MonotonicClock};
use anemometer_lib::collector::{CollectedRow, Collector};
use anemometer_lib::composer::VectorComposer;
use anemometer_lib::config::Config;
use anemometer_lib::estimator::Estimator;
use anemometer_lib::filter::{ChannelState, Warmup};
use anemometer_lib::handoff;
use anemometer_lib::sampler::{PollOutcome, SampleSource, Sampler, SourceError};
use anemometer_lib::simulation::SimulatedSource;
use anemometer_lib::stats::WindStats;
use anemometer_lib::telemetry::{format_payload, parse_payload, TelemetryMessage};
use anemometer_lib::{Channel, RawSample, WindEstimate};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

/// Source returning fixed per-channel readings.
struct ConstantSource([u16; 2]);

impl SampleSource for ConstantSource {
    fn read(&mut self, channel: Channel) -> Result<u16, SourceError> {
        Ok(self.0[channel.index()])
    }
}

fn simulated(speed: f64, direction: f64) -> SimulatedSource {
    let config = Config::default();
    let model = CalibrationModel::new(config.calibration.set()).unwrap();
    let mut source = SimulatedSource::new(model, config.calibration.bearing_offset, 0, 1);
    source.set_wind(speed, direction);
    source
}

/// Run `slots` acquisitions, advancing the manual clock by exactly one interval each.
fn run_slots<S: SampleSource>(
    clock: &ManualClock,
    source: &mut S,
    estimator: &mut Estimator,
    slots: usize,
) -> Option<WindEstimate> {
    let mut sampler = Sampler::new(clock, 500);
    let mut latest = None;
    for _ in 0..slots {
        if let PollOutcome::Acquired {
            estimate: Some(estimate),
            ..
        } = sampler.poll(source, estimator)
        {
            latest = Some(estimate);
        }
        clock.advance(500);
    }
    latest
}

/// The window-of-four example: 25 after four readings, 35 once 10 is evicted.
#[test]
fn rolling_average_evicts_oldest_reading() {
    let mut state = ChannelState::new(4, Warmup::ZeroPadded).unwrap();
    let averages: Vec<f64> = [10, 20, 30, 40].into_iter().map(|v| state.update(v)).collect();

    assert_eq!(averages[3], 25.0, "average of a full window of 10..40");
    assert_eq!(state.update(50), 35.0, "10 should have been evicted");
    assert_eq!(state.sum(), 140, "running sum tracks the live window");
}

/// Before the window fills the missing slots count as zero.
#[test]
fn warmup_is_biased_toward_zero() {
    let mut padded = ChannelState::new(4, Warmup::ZeroPadded).unwrap();
    let mut partial = ChannelState::new(4, Warmup::Partial).unwrap();

    assert_eq!(padded.update(100), 25.0);
    assert_eq!(partial.update(100), 100.0);
    assert!(!padded.is_warm());
}

/// Calm 500, reference 800, reference speed 10: an average of 650 is half the span.
#[test]
fn contribution_is_linear_in_the_span() {
    assert_eq!(contribution(650.0, 500, 800, 10.0).unwrap(), 5.0);
    assert_eq!(
        contribution(800.0, 500, 800, 10.0).unwrap(),
        10.0,
        "the reference reading maps exactly to the reference speed"
    );
}

/// Feeding the calm readings through the whole pipeline reports no wind, pointing north.
#[test]
fn calm_readings_give_zero_speed_and_zero_direction() {
    let config = Config::default();
    let calm = config.calibration.calm;
    let mut estimator = Estimator::from_config(&config).unwrap();
    let clock = ManualClock::new(0);
    let mut source = ConstantSource([calm.first, calm.second]);

    let estimate = run_slots(&clock, &mut source, &mut estimator, config.filter.window * 2);

    assert_eq!(estimate, Some(WindEstimate::default()));
    assert_eq!(WindEstimate::default(), WindEstimate { speed: 0, direction: 0 });
}

/// Nothing is emitted until both channels have been read once.
#[test]
fn first_estimate_waits_for_both_channels() {
    let mut estimator = Estimator::from_config(&Config::default()).unwrap();
    let clock = ManualClock::new(0);
    let mut sampler = Sampler::new(&clock, 500);
    let mut source = ConstantSource([2100, 2100]);

    let first = sampler.poll(&mut source, &mut estimator);
    assert!(
        matches!(first, PollOutcome::Acquired { estimate: None, .. }),
        "one channel alone must not produce an estimate, got {first:?}"
    );

    assert_eq!(
        sampler.poll(&mut source, &mut estimator),
        PollOutcome::NotDue,
        "the minimum interval applies across channels"
    );

    clock.advance(500);
    let second = sampler.poll(&mut source, &mut estimator);
    assert!(matches!(
        second,
        PollOutcome::Acquired {
            estimate: Some(_),
            ..
        }
    ));
}

/// A wind generated by inverting the calibration comes back out of the estimator.
#[test]
fn simulated_wind_survives_the_pipeline() {
    let config = Config::default();
    let mut estimator = Estimator::from_config(&config).unwrap();
    let clock = ManualClock::new(0);
    let mut source = simulated(6.0, 225.0);

    let estimate = run_slots(&clock, &mut source, &mut estimator, config.filter.window * 2);

    assert_eq!(
        estimate,
        Some(WindEstimate {
            speed: 6,
            direction: 225
        }),
        "a full window of exact readings should reproduce the simulated wind"
    );
}

/// Out-of-range readings are discarded without stalling the other channel.
#[test]
fn out_of_range_readings_are_skipped() {
    let mut estimator = Estimator::from_config(&Config::default()).unwrap();
    let clock = ManualClock::new(0);
    let mut sampler = Sampler::new(&clock, 500);
    let mut source = ConstantSource([5000, 2048]);

    assert_eq!(
        sampler.poll(&mut source, &mut estimator),
        PollOutcome::Rejected {
            channel: Channel::First,
            value: 5000
        }
    );
    clock.advance(500);
    assert_eq!(sampler.next_channel(), Channel::Second);
    assert!(matches!(
        sampler.poll(&mut source, &mut estimator),
        PollOutcome::Acquired { estimate: None, .. }
    ));
    assert_eq!(sampler.stats().rejected, 1);
    assert_eq!(estimator.average(Channel::First), None);
}

/// A configuration whose reference equals its calm reading must stop startup.
#[test]
fn degenerate_calibration_fails_closed() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [calibration]
        reference_speed = 10.0
        bearing_offset = 90
        calm = {{ first = 2048, second = 2048 }}
        north = {{ first = 2048, second = 2148 }}
        east = {{ first = 2148, second = 2448 }}
        "#
    )
    .unwrap();

    assert!(
        Config::load_from_path(file.path()).is_err(),
        "zero north span on the first channel must be rejected"
    );

    let model = CalibrationModel::new(CalibrationSet {
        calm: CalibrationPoint { first: 1, second: 1 },
        north: CalibrationPoint { first: 2, second: 2 },
        east: CalibrationPoint { first: 3, second: 3 },
        reference_speed: 0.0,
    });
    assert!(model.is_err(), "zero reference speed must be rejected");
}

/// Samples acquired on another thread reach the estimator through the handoff queue.
#[test]
fn continuous_mode_hands_samples_to_main_loop() {
    let config = Config::default();
    let mut estimator = Estimator::new(
        CalibrationModel::new(config.calibration.set()).unwrap(),
        VectorComposer::new(config.calibration.bearing_offset),
        8,
        Warmup::ZeroPadded,
    )
    .unwrap();

    let (mut producer, mut consumer) = handoff::channel(16);
    let running = Arc::new(AtomicBool::new(true));
    let worker = {
        let running = running.clone();
        thread::spawn(move || {
            let mut source = simulated(6.0, 225.0);
            let mut sampler = Sampler::new(MonotonicClock::new(), 50);
            while running.load(Ordering::Relaxed) {
                sampler.poll(&mut source, &mut producer);
                thread::yield_now();
            }
        })
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut latest = None;
    while Instant::now() < deadline {
        if consumer.take_ready() {
            let drained = consumer.drain_into(&mut estimator);
            assert!(drained.estimates <= drained.samples);
            if drained.latest.is_some() {
                latest = drained.latest;
            }
        }
        let warm = Channel::ALL
            .iter()
            .all(|&channel| estimator.channel_state(channel).is_warm());
        if warm && latest.is_some() {
            break;
        }
        thread::yield_now();
    }

    running.store(false, Ordering::Relaxed);
    worker.join().unwrap();

    assert_eq!(
        latest,
        Some(WindEstimate {
            speed: 6,
            direction: 225
        })
    );
}

/// Published payloads can be read back and summarized.
#[test]
fn published_payloads_feed_statistics() {
    let mut stats = WindStats::default();
    for (speed, direction) in [(4, 90), (6, 90), (8, 90)] {
        let payload = format_payload(&WindEstimate { speed, direction });
        let reading = parse_payload(&payload).unwrap();
        stats.record(reading.speed, reading.direction);
    }

    assert_eq!(stats.count(), 3);
    assert!((stats.speed.mean - 6.0).abs() < 1e-9);
    assert_eq!(stats.speed.min, 4.0);
    assert_eq!(stats.speed.max, 8.0);
    assert_eq!(stats.direction.std_dev(), Some(0.0));
}

/// The HTTP bridge receives the topic, the wire payload and a timestamp.
#[test]
fn telemetry_message_json_shape() {
    let message = TelemetryMessage::new("ultrasonic_anemometer/data", "{speed:5.00,direction:126}");
    let json = serde_json::to_value(&message).unwrap();

    assert_eq!(json["topic"], "ultrasonic_anemometer/data");
    assert_eq!(json["payload"], "{speed:5.00,direction:126}");
    assert!(json["sent_at"].is_string());
}

/// Raw samples outside the 12-bit range cannot be constructed.
#[test]
fn raw_sample_range() {
    assert!(RawSample::new(Channel::First, 4095, 0).is_ok());
    assert!(RawSample::new(Channel::Second, 4096, 0).is_err());
}

/// Collected readings written to CSV read back with the same values and topic.
#[test]
fn collected_readings_round_trip_through_csv() {
    let file = NamedTempFile::new().unwrap();
    let input: &[u8] = b"{speed:4.00,direction:90}\n\xff\xfe noise\nnot a payload\n{speed:6.50,direction:270}\n";

    let mut collector = Collector::new("ultrasonic_anemometer/data", 10)
        .with_csv_output(file.path())
        .unwrap();
    collector.run(input).unwrap();
    assert_eq!(collector.skipped(), 2, "undecodable and malformed lines are skipped");
    let stats = collector.finish().unwrap();
    assert_eq!(stats.count(), 2);

    let mut reader = csv::Reader::from_path(file.path()).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, ["timestamp", "topic", "wind_speed", "wind_direction"]);
    let rows: Vec<CollectedRow> = reader.deserialize().map(|row| row.unwrap()).collect();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].topic, "ultrasonic_anemometer/data");
    assert_eq!((rows[0].wind_speed, rows[0].wind_direction), (4.0, 90.0));
    assert_eq!((rows[1].wind_speed, rows[1].wind_direction), (6.5, 270.0));
    assert!(
        rows[0].timestamp <= rows[1].timestamp,
        "rows are stamped in arrival order"
    );
}
