//! CLI entry point for the ride pulse analytics pipeline.
//!
//! Provides subcommands for replaying an event log through the engine,
//! running a live simulation with the synthetic generator, and writing
//! synthetic event logs.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ride_pulse::{
    codec::encode_event,
    config::{EngineConfig, RuntimeConfig},
    engine::Engine,
    event::SequencedEvent,
    fetch::BasicClient,
    generator::{DEFAULT_MAX_DURATION_MINUTES, RideEventGenerator},
    notify::{
        ChangeNotificationEmitter, ChannelSink, HttpSink, JsonLinesSink, Notification,
        NotificationSink,
    },
    projection::{DashboardProjection, spawn_publisher},
    runtime::{Dispatcher, Runtime},
    source::{EventSource, decode_log},
    views::ActiveRidePolicy,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "ride_pulse")]
#[command(about = "Real-time ride analytics over a stream of ride events", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines event log from a file or URL through the engine
    Process {
        /// Path to file or URL to fetch (gzip accepted)
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        #[command(flatten)]
        engine: EngineArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Feed generated events into the engine live
    Simulate {
        /// Milliseconds between generated events
        #[arg(long, default_value_t = 3000)]
        interval_ms: u64,

        /// Number of events to generate (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 0)]
        count: u64,

        /// Seconds between dashboard snapshots
        #[arg(long, default_value_t = 5)]
        publish_secs: u64,

        #[command(flatten)]
        engine: EngineArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Write synthetic ride events as JSON lines
    Generate {
        /// Number of events to write
        #[arg(short = 'n', long, default_value_t = 100)]
        count: u64,

        /// File to write to ("-" for stdout)
        #[arg(short, long, default_value = "-")]
        output: String,

        /// Upper bound for generated ride durations in minutes
        #[arg(long, default_value_t = DEFAULT_MAX_DURATION_MINUTES)]
        max_duration: u32,

        /// Seed for a reproducible event sequence
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// Number of worker partitions
    #[arg(long, env = "RIDE_PULSE_PARTITIONS", default_value_t = 4)]
    partitions: usize,

    /// Size of the top active cities ranking
    #[arg(long, env = "RIDE_PULSE_TOP_N", default_value_t = 5)]
    top_n: usize,

    /// Rides longer than this many minutes are reported as anomalies
    #[arg(long, env = "RIDE_PULSE_ANOMALY_THRESHOLD", default_value_t = 60)]
    anomaly_threshold: u32,

    /// Which events open and close an active ride
    #[arg(
        long,
        env = "RIDE_PULSE_ACTIVE_POLICY",
        default_value_t = ActiveRidePolicy::StartComplete
    )]
    active_policy: ActiveRidePolicy,
}

impl EngineArgs {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            active_policy: self.active_policy,
            top_n: self.top_n,
            anomaly_threshold_minutes: self.anomaly_threshold,
        }
    }
}

#[derive(Args)]
struct OutputArgs {
    /// JSON-lines file to append notifications to ("-" for stdout)
    #[arg(short, long, env = "RIDE_PULSE_OUTPUT", default_value = "-")]
    output: String,

    /// Optional: webhook URL every notification is POSTed to
    #[arg(long, env = "RIDE_PULSE_WEBHOOK")]
    webhook: Option<String>,

    /// Optional: checkpoint file for state recovery
    #[arg(long, env = "RIDE_PULSE_CHECKPOINT")]
    checkpoint: Option<PathBuf>,

    /// Write a checkpoint every N events (0 = only on shutdown)
    #[arg(long, default_value_t = 0)]
    checkpoint_every: u64,
}

impl OutputArgs {
    fn runtime_config(&self, partitions: usize) -> RuntimeConfig {
        RuntimeConfig {
            partitions,
            checkpoint_path: self.checkpoint.clone(),
            checkpoint_every: self.checkpoint_every,
            ..RuntimeConfig::default()
        }
    }

    async fn sinks(&self) -> Result<Vec<Arc<dyn NotificationSink>>> {
        let mut sinks: Vec<Arc<dyn NotificationSink>> = Vec::new();

        if self.output == "-" {
            sinks.push(Arc::new(JsonLinesSink::stdout()));
        } else {
            if let Some(parent) = Path::new(&self.output).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            sinks.push(Arc::new(JsonLinesSink::append(&self.output).await?));
        }

        if let Some(url) = &self.webhook {
            info!(url = %url, "Webhook delivery enabled");
            sinks.push(Arc::new(HttpSink::new(BasicClient::new()?, url.clone())));
        }
        Ok(sinks)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/ride_pulse.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("ride_pulse.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            source,
            engine,
            output,
        } => {
            process(&source, &engine, &output).await?;
        }
        Commands::Simulate {
            interval_ms,
            count,
            publish_secs,
            engine,
            output,
        } => {
            simulate(interval_ms, count, publish_secs, &engine, &output).await?;
        }
        Commands::Generate {
            count,
            output,
            max_duration,
            seed,
        } => {
            generate(count, &output, max_duration, seed).await?;
        }
    }

    Ok(())
}

/// Engine, emitter and runtime wired to the configured sinks, plus the
/// dashboard projection fed from the same notification stream.
struct Pipeline {
    runtime: Runtime,
    emitter: Arc<ChangeNotificationEmitter>,
    projection: Arc<DashboardProjection>,
    feeder: JoinHandle<()>,
}

impl Pipeline {
    async fn build(engine: &EngineArgs, output: &OutputArgs) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
        let mut sinks = output.sinks().await?;
        sinks.push(Arc::new(ChannelSink::new(tx)));

        let projection = Arc::new(DashboardProjection::new());
        let feeder = {
            let projection = projection.clone();
            tokio::spawn(async move {
                while let Some(notification) = rx.recv().await {
                    projection.apply(&notification);
                }
            })
        };

        let emitter = Arc::new(ChangeNotificationEmitter::new(sinks));
        let runtime = Runtime::new(
            Arc::new(Engine::new(engine.engine_config())),
            emitter.clone(),
            output.runtime_config(engine.partitions),
        );

        if let Some(checkpoint) = runtime.recover()? {
            info!(
                cities = checkpoint.cities.len(),
                log_offset = ?checkpoint.log_offset,
                saved_at = %checkpoint.saved_at,
                "Recovered from checkpoint"
            );
        }

        Ok(Self {
            runtime,
            emitter,
            projection,
            feeder,
        })
    }

    async fn finish(self, dispatcher: Dispatcher) -> Result<()> {
        let summary = dispatcher.shutdown().await?;
        let stats = self.emitter.stats();

        // The channel sink lives inside the emitter; dropping every handle
        // closes it and lets the feeder drain.
        drop(self.runtime);
        drop(self.emitter);
        if let Err(e) = self.feeder.await {
            warn!(error = %e, "Dashboard feeder failed");
        }

        let snapshot = self.projection.snapshot();
        info!(
            dispatched = summary.dispatched,
            malformed = summary.malformed,
            already_applied = summary.already_applied,
            delivered = stats.delivered,
            failed = stats.failed,
            superseded = stats.superseded,
            "Pipeline finished"
        );
        info!(
            active_rides = snapshot.active_rides,
            average_duration = snapshot.average_duration,
            top_cities = %serde_json::to_string(&snapshot.top_cities)?,
            "Dashboard snapshot"
        );
        Ok(())
    }
}

/// Replays an event log from a local file path or over HTTP.
#[tracing::instrument(skip(engine, output), fields(source = %source))]
async fn process(source: &str, engine: &EngineArgs, output: &OutputArgs) -> Result<()> {
    let bytes = EventSource::parse(source).read().await?;
    let pipeline = Pipeline::build(engine, output).await?;

    let mut dispatcher = pipeline.runtime.start();
    for decoded in decode_log(&bytes) {
        dispatcher.dispatch_decoded(decoded).await?;
    }

    pipeline.finish(dispatcher).await
}

/// Generates events on an interval and pushes them through the runtime,
/// logging a dashboard snapshot every `publish_secs`.
#[tracing::instrument(skip(engine, output), fields(interval_ms, count, publish_secs))]
async fn simulate(
    interval_ms: u64,
    count: u64,
    publish_secs: u64,
    engine: &EngineArgs,
    output: &OutputArgs,
) -> Result<()> {
    let pipeline = Pipeline::build(engine, output).await?;

    let (snapshots, mut snapshot_rx) = broadcast::channel(16);
    let publisher = spawn_publisher(
        pipeline.projection.clone(),
        Duration::from_secs(publish_secs.max(1)),
        snapshots,
    );
    let reporter = tokio::spawn(async move {
        while let Ok(snapshot) = snapshot_rx.recv().await {
            info!(
                active_rides = snapshot.active_rides,
                average_duration = snapshot.average_duration,
                top_cities = snapshot.top_cities.len(),
                "Dashboard snapshot"
            );
        }
    });

    if count == 0 {
        info!(interval_ms, "Generating infinitely. Press Ctrl+C to stop.");
    } else {
        info!(count, interval_ms, "Starting simulation");
    }

    // Continue offsets after whatever a recovered checkpoint already covers.
    let mut offset = pipeline
        .runtime
        .engine()
        .snapshot()
        .values()
        .filter_map(|state| state.last_offset)
        .max()
        .map_or(0, |last| last + 1);

    let mut generator = RideEventGenerator::default();
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    let mut dispatcher = pipeline.runtime.start();
    let mut generated = 0u64;

    loop {
        if count > 0 && generated >= count {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                let event = generator.next_event();
                info!(
                    event_type = ?event.event_type,
                    city = %event.city,
                    ride_id = %event.ride_id,
                    "Sent event"
                );
                dispatcher.dispatch(SequencedEvent::new(offset, event)).await?;
                offset += 1;
                generated += 1;
            }
            _ = tokio::signal::ctrl_c() => {
                info!(generated, "Interrupted, shutting down");
                break;
            }
        }
    }

    publisher.abort();
    reporter.abort();
    pipeline.finish(dispatcher).await
}

/// Writes `count` generated events to a file or stdout.
#[tracing::instrument(fields(count, output))]
async fn generate(count: u64, output: &str, max_duration: u32, seed: Option<u64>) -> Result<()> {
    let cities = ride_pulse::generator::DEFAULT_CITIES
        .iter()
        .map(|c| c.to_string())
        .collect();
    let mut generator = match seed {
        Some(seed) => RideEventGenerator::seeded(cities, max_duration, seed),
        None => RideEventGenerator::new(cities, max_duration),
    };

    let mut lines = String::new();
    for _ in 0..count {
        lines.push_str(&encode_event(&generator.next_event())?);
        lines.push('\n');
    }

    if output == "-" {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(lines.as_bytes()).await?;
        stdout.flush().await?;
    } else {
        tokio::fs::write(output, lines)
            .await
            .with_context(|| format!("writing {output}"))?;
        info!(count, output, "Event log written");
    }
    Ok(())
}
