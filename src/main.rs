//! # Ultrasonic Anemometer Application Entry Point
//!
//! This binary wires the estimation pipeline to its outputs and runs the cooperative
//! control loop. It supports hardware mode (MCP3208 + seven-segment panel) and a
//! development mode that prints the readout to stdout and can simulate the wind.

use anemometer_lib::clock::{Clock, IntervalGate, MonotonicClock};
use anemometer_lib::collector::Collector;
use anemometer_lib::config::{self, Config};
use anemometer_lib::display::{SegmentPin, SevenSegmentDisplay};
use anemometer_lib::estimator::Estimator;
use anemometer_lib::filter::{ChannelState, Warmup};
use anemometer_lib::handoff::{self, HandoffConsumer, HandoffProducer};
use anemometer_lib::renderer::draw_ascii;
use anemometer_lib::sampler::{PollOutcome, SampleSink, SampleSource, Sampler};
use anemometer_lib::simulation::SimulatedSource;
use anemometer_lib::stats::WindStats;
use anemometer_lib::telemetry::{
    self, HttpRelay, LogRelay, TelemetryPublisher, TelemetryRelay,
};
use anemometer_lib::{calibration::CalibrationPoint, Channel, RawSample, WindEstimate};
use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Parser)]
#[command(version, about = "Dual-channel ultrasonic anemometer", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = config::DEFAULT_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the estimation loop (default)
    Run(RunArgs),
    /// Sample both channels and print their averages as a calibration point
    Capture(CaptureArgs),
    /// Summarize `{speed:..,direction:..}` payload lines read from stdin
    Collect(CollectArgs),
}

#[derive(Debug, Default, Args)]
struct RunArgs {
    /// Print the readout to stdout instead of driving the panel
    #[arg(long)]
    stdout: bool,
    /// Use the simulated source instead of the ADC
    #[arg(long)]
    simulate: bool,
    /// Acquire on a separate thread and hand samples to the main loop
    #[arg(long)]
    continuous: bool,
    /// Exit after this many estimates and print a summary
    #[arg(long)]
    max_estimates: Option<u64>,
}

#[derive(Debug, Args)]
struct CaptureArgs {
    /// Which reference point is being recorded
    #[arg(long, value_enum, default_value_t = Reference::Calm)]
    label: Reference,
    /// Number of acquisitions (split across both channels)
    #[arg(long, default_value_t = 2_000)]
    slots: u64,
    #[arg(long)]
    simulate: bool,
}

#[derive(Debug, Args)]
struct CollectArgs {
    /// Stop after this many valid readings
    #[arg(long, default_value_t = 200, value_parser = clap::value_parser!(u64).range(1..))]
    count: u64,
    /// Save every valid reading to this CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Topic recorded with each saved reading
    #[arg(long, default_value = telemetry::DEFAULT_TOPIC)]
    topic: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Reference {
    Calm,
    North,
    East,
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => {
            let config = Config::load_from_path(&cli.config)
                .with_context(|| format!("loading {}", cli.config.display()))?;
            run(&config, &args)
        }
        Command::Capture(args) => {
            // A capture is how a calibration gets made, so a missing or broken one is fine here.
            let config = Config::load_from_path(&cli.config).unwrap_or_else(|e| {
                log::warn!("[Capture] Ignoring config ({e}), using defaults");
                Config::default()
            });
            capture(&config, &args)
        }
        Command::Collect(args) => collect(&args),
    }
}

fn open_source(config: &Config, simulate: bool) -> anyhow::Result<Box<dyn SampleSource + Send>> {
    if simulate {
        return Ok(Box::new(SimulatedSource::from_config(config)?));
    }

    #[cfg(all(target_os = "linux", feature = "hardware"))]
    {
        let adc = anemometer_lib::hardware::Mcp3208Source::open(&config.hardware)
            .context("opening MCP3208")?;
        Ok(Box::new(adc))
    }

    #[cfg(not(all(target_os = "linux", feature = "hardware")))]
    {
        anyhow::bail!("ADC support not enabled. Rebuild with --features hardware or pass --simulate.")
    }
}

fn open_relay(config: &Config, runtime: &tokio::runtime::Runtime) -> anyhow::Result<Box<dyn TelemetryRelay>> {
    let telemetry = &config.telemetry;
    match &telemetry.endpoint {
        Some(endpoint) => Ok(Box::new(HttpRelay::spawn(
            runtime.handle(),
            endpoint.clone(),
            telemetry.queue_capacity,
            telemetry.timeout(),
        )?)),
        None => Ok(Box::new(LogRelay)),
    }
}

fn run(config: &Config, args: &RunArgs) -> anyhow::Result<()> {
    // Fail closed: no estimator, no output.
    let estimator =
        Estimator::from_config(config).context("calibration rejected, refusing to start")?;

    // Tokio runtime for the telemetry relay only; the control loop stays synchronous
    let runtime = tokio::runtime::Runtime::new()?;
    let publisher = TelemetryPublisher::new(
        open_relay(config, &runtime)?,
        config.telemetry.topic.clone(),
        config.telemetry.publish_interval(),
    );
    let source = open_source(config, args.simulate)?;

    if args.stdout {
        return control_loop(
            config,
            args,
            estimator,
            source,
            publisher,
            SevenSegmentDisplay::virtual_display(),
        );
    }

    #[cfg(all(target_os = "linux", feature = "hardware"))]
    {
        let display = anemometer_lib::hardware::open_display(&config.hardware)
            .context("claiming display GPIO lines")?;
        control_loop(config, args, estimator, source, publisher, display)
    }

    #[cfg(not(all(target_os = "linux", feature = "hardware")))]
    {
        log::warn!("Display support not enabled. Rebuild with --features hardware for the panel.");
        log::warn!("Showing ASCII output instead.");
        let args = RunArgs {
            stdout: true,
            simulate: args.simulate,
            continuous: args.continuous,
            max_estimates: args.max_estimates,
        };
        control_loop(
            config,
            &args,
            estimator,
            source,
            publisher,
            SevenSegmentDisplay::virtual_display(),
        )
    }
}

/// Where readings come from on each pass of the loop.
enum Acquisition {
    Direct {
        sampler: Sampler<MonotonicClock>,
        source: Box<dyn SampleSource + Send>,
    },
    Continuous {
        consumer: HandoffConsumer,
        running: Arc<AtomicBool>,
        worker: JoinHandle<()>,
    },
}

impl Acquisition {
    /// Number of estimates produced this pass, and the most recent of them.
    fn poll_estimates(&mut self, estimator: &mut Estimator) -> (u64, Option<WindEstimate>) {
        match self {
            Acquisition::Direct { sampler, source } => match sampler.poll(source, estimator) {
                PollOutcome::Acquired {
                    estimate: Some(estimate),
                    ..
                } => (1, Some(estimate)),
                _ => (0, None),
            },
            Acquisition::Continuous { consumer, .. } => {
                if !consumer.take_ready() {
                    return (0, None);
                }
                let drained = consumer.drain_into(estimator);
                (drained.estimates as u64, drained.latest)
            }
        }
    }

    fn shutdown(self) {
        match self {
            Acquisition::Direct { sampler, .. } => {
                log::info!("[Sampler] {:?}", sampler.stats());
            }
            Acquisition::Continuous {
                consumer,
                running,
                worker,
            } => {
                running.store(false, Ordering::Relaxed);
                if worker.join().is_err() {
                    log::error!("[Sampler] Acquisition thread panicked");
                }
                log::info!("[Sampler] {} samples dropped by the handoff queue", consumer.dropped());
            }
        }
    }
}

/// Acquisition thread for continuous mode; stands in for the ADC interrupt.
fn spawn_acquisition(
    mut source: Box<dyn SampleSource + Send>,
    mut producer: HandoffProducer,
    min_interval_us: u64,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut sampler = Sampler::new(MonotonicClock::new(), min_interval_us);
        while running.load(Ordering::Relaxed) && !producer.is_abandoned() {
            sampler.poll(&mut source, &mut producer);
            thread::yield_now();
        }
        log::info!("[Sampler] Acquisition thread stopped: {:?}", sampler.stats());
    })
}

fn control_loop<P: SegmentPin>(
    config: &Config,
    args: &RunArgs,
    mut estimator: Estimator,
    source: Box<dyn SampleSource + Send>,
    mut publisher: TelemetryPublisher,
    mut display: SevenSegmentDisplay<P>,
) -> anyhow::Result<()> {
    let clock = MonotonicClock::new();
    let mut acquisition = if args.continuous {
        let (producer, consumer) = handoff::channel(config.sampler.handoff_capacity);
        let running = Arc::new(AtomicBool::new(true));
        let worker = spawn_acquisition(
            source,
            producer,
            config.sampler.min_interval_us,
            running.clone(),
        );
        Acquisition::Continuous {
            consumer,
            running,
            worker,
        }
    } else {
        Acquisition::Direct {
            sampler: Sampler::new(clock, config.sampler.min_interval_us),
            source,
        }
    };

    let mut refresh_gate = IntervalGate::new(config.display.refresh_interval_us);
    let mut print_gate = IntervalGate::new(config.display.print_interval_us());
    let mut stats = WindStats::default();
    let mut estimates = 0u64;

    log::info!(
        "[Main] Sampling every {} us ({} mode)",
        config.sampler.min_interval_us,
        if args.continuous { "continuous" } else { "direct" }
    );

    loop {
        let (produced, latest) = acquisition.poll_estimates(&mut estimator);
        estimates += produced;
        if let Some(estimate) = latest {
            display.set_number(estimate.speed);
        }

        let now = clock.now_us();
        if refresh_gate.ready(now) {
            if let Err(e) = display.refresh_tick() {
                log::warn!("[Display] Refresh failed: {e}");
            }
        }

        if let Some(latest) = estimator.latest() {
            if publisher.maybe_publish(now, &latest) {
                stats.record(f64::from(latest.speed), f64::from(latest.direction));
            }
        }

        if args.stdout && print_gate.ready(now) {
            draw_ascii(estimator.latest().as_ref(), &display.render_ascii());
        }

        if args.max_estimates.is_some_and(|max| estimates >= max) {
            break;
        }

        thread::yield_now();
    }

    acquisition.shutdown();
    if let Err(e) = display.blank() {
        log::warn!("[Display] Could not blank panel: {e}");
    }
    println!("{stats}");
    Ok(())
}

/// Averages of both channels, with no calibration applied.
struct CaptureSink {
    channels: [ChannelState; 2],
}

impl SampleSink for CaptureSink {
    fn accept(&mut self, sample: RawSample) -> Option<WindEstimate> {
        self.channels[sample.channel().index()].update(sample.value());
        None
    }
}

fn capture(config: &Config, args: &CaptureArgs) -> anyhow::Result<()> {
    let mut source = open_source(config, args.simulate)?;
    let mut sink = CaptureSink {
        channels: [
            ChannelState::new(config.filter.window, Warmup::Partial)?,
            ChannelState::new(config.filter.window, Warmup::Partial)?,
        ],
    };
    let mut sampler = Sampler::new(MonotonicClock::new(), config.sampler.min_interval_us);

    log::info!("[Capture] Recording {:?} reference over {} slots", args.label, args.slots);
    while sampler.stats().acquired < args.slots {
        if sampler.poll(&mut source, &mut sink) == PollOutcome::NotDue {
            thread::yield_now();
        }
        if sampler.stats().missed > args.slots {
            anyhow::bail!("source failed {} reads, giving up", sampler.stats().missed);
        }
    }

    let average = |channel: Channel| -> anyhow::Result<u16> {
        let avg = sink.channels[channel.index()]
            .average()
            .with_context(|| format!("no readings on the {channel} channel"))?;
        Ok(avg.round() as u16)
    };
    let point = CalibrationPoint {
        first: average(Channel::First)?,
        second: average(Channel::Second)?,
    };

    let table = match args.label {
        Reference::Calm => "calm",
        Reference::North => "north",
        Reference::East => "east",
    };
    println!("[calibration.{table}]");
    print!("{}", toml::to_string(&point)?);
    Ok(())
}

fn collect(args: &CollectArgs) -> anyhow::Result<()> {
    let mut collector = Collector::new(args.topic.clone(), args.count);
    if let Some(path) = &args.output {
        collector = collector
            .with_csv_output(path)
            .with_context(|| format!("creating {}", path.display()))?;
    }
    log::info!(
        "[Collect] Started at {}, waiting for {} readings on stdin",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        args.count
    );

    // Ctrl-C ends the collection early but keeps what was received.
    let runtime = tokio::runtime::Runtime::new()?;
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::Relaxed);
            }
        });
    }

    // A blocking stdin read cannot be cancelled, so lines come from a reader thread.
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().split(b'\n') {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let started = Instant::now();
    while !collector.is_complete() {
        if interrupted.load(Ordering::Relaxed) {
            log::warn!(
                "[Collect] Interrupted, keeping {} readings",
                collector.stats().count()
            );
            break;
        }
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => {
                collector.accept_line(&line?)?;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let elapsed = started.elapsed();
    let skipped = collector.skipped();
    let stats = collector.finish()?;
    println!("{stats}");
    if skipped > 0 {
        println!("Skipped lines: {skipped}");
    }
    if stats.count() > 0 && elapsed > Duration::ZERO {
        println!(
            "Collection rate: {:.2} readings/second",
            stats.count() as f64 / elapsed.as_secs_f64()
        );
    }
    if let Some(path) = &args.output {
        println!("Saved to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_collect_count_must_be_positive() {
        assert!(Cli::try_parse_from(["anemometer", "collect", "--count", "0"]).is_err());

        let cli = Cli::try_parse_from(["anemometer", "collect", "--count", "3", "-o", "wind.csv"])
            .unwrap();
        match cli.command {
            Some(Command::Collect(args)) => {
                assert_eq!(args.count, 3);
                assert_eq!(args.output, Some(PathBuf::from("wind.csv")));
                assert_eq!(args.topic, telemetry::DEFAULT_TOPIC);
            }
            other => panic!("expected collect, got {other:?}"),
        }
    }

    #[test]
    fn test_run_is_the_default_command() {
        let cli = Cli::try_parse_from(["anemometer"]).unwrap();
        assert!(cli.command.is_none());
    }
}
