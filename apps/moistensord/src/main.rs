use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use moist_ingest::{FanOut, Ingestor, JsonLogSink, PacketSink, RetryPolicy, SharedRegistry};
use moist_registry::DeviceRegistry;

mod logger;
mod source;

use logger::RawLineLog;

#[derive(Parser, Debug)]
#[command(name = "moistensord", version, about = "Moistensor telemetry ingestion daemon")]
struct Args {
    /// Telemetry line source
    #[arg(long, value_enum, default_value_t = Source::Serial)]
    source: Source,

    /// Serial port path
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial baud rate
    #[arg(long, default_value_t = 115200)]
    baud: u32,

    /// Seconds between synthetic frames from the debug source
    #[arg(long, default_value_t = 5)]
    debug_interval: u64,

    /// Append every raw line, timestamped, to this file
    #[arg(long)]
    raw_log: Option<PathBuf>,

    /// Registry snapshot file; restored at startup when present
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Seconds between periodic snapshots
    #[arg(long, default_value_t = 60)]
    snapshot_every: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Source {
    Serial,
    Debug,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let args = Args::parse();
    info!("moistensord starting");

    let mut registry = DeviceRegistry::new();
    if let Some(path) = &args.snapshot {
        if path.exists() {
            let bytes = fs::read(path)
                .with_context(|| format!("reading snapshot: {}", path.display()))?;
            registry
                .restore(&bytes)
                .with_context(|| format!("restoring snapshot: {}", path.display()))?;
            info!(devices = registry.device_count(), "registry restored from snapshot");
        }
    }
    let registry: SharedRegistry = Arc::new(RwLock::new(registry));

    let sinks: Vec<Arc<dyn PacketSink>> = vec![Arc::new(JsonLogSink)];
    let (fanout_tx, _dispatcher) = FanOut::spawn(sinks, RetryPolicy::default(), 64);
    let ingestor = Ingestor::new(Arc::clone(&registry), fanout_tx);

    let mut raw_log = args.raw_log.as_ref().map(RawLineLog::open).transpose()?;

    let (line_tx, mut line_rx) = mpsc::channel::<String>(64);
    match args.source {
        Source::Serial => source::spawn_serial_reader(args.port.clone(), args.baud, line_tx),
        Source::Debug => {
            let _ = source::spawn_debug_source(args.debug_interval, line_tx);
        }
    }

    if let Some(path) = args.snapshot.clone() {
        let registry = Arc::clone(&registry);
        let every = Duration::from_secs(args.snapshot_every.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                write_snapshot(&registry, &path);
            }
        });
    }

    loop {
        tokio::select! {
            maybe_line = line_rx.recv() => match maybe_line {
                Some(line) => {
                    if let Some(log) = raw_log.as_mut() {
                        if let Err(e) = log.append(&line) {
                            warn!(error = %e, "raw log append failed");
                        }
                    }
                    let packet = ingestor.ingest(&line);
                    if !packet.is_error() {
                        debug!(device = ?packet.device(), "packet recorded");
                    }
                }
                None => {
                    warn!("line source closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    if let Some(path) = &args.snapshot {
        write_snapshot(&registry, path);
    }
    log_overview(&registry);
    info!("moistensord stopped");
    Ok(())
}

fn write_snapshot(registry: &SharedRegistry, path: &Path) {
    let bytes = match registry.read() {
        Ok(guard) => match guard.snapshot() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "snapshot encode failed");
                return;
            }
        },
        Err(_) => {
            error!("registry lock poisoned, snapshot skipped");
            return;
        }
    };
    if let Err(e) = fs::write(path, &bytes) {
        error!(error = %e, path = %path.display(), "snapshot write failed");
    } else {
        debug!(path = %path.display(), bytes = bytes.len(), "snapshot written");
    }
}

fn log_overview(registry: &SharedRegistry) {
    let Ok(guard) = registry.read() else {
        error!("registry lock poisoned, overview unavailable");
        return;
    };
    for row in guard.overview() {
        info!(
            device = %row.device,
            moisture = ?row.latest_measurement.as_ref().map(|m| m.moisture),
            calibration = ?row.latest_calibration.as_ref().map(|c| (c.dry, c.wet)),
            "device overview"
        );
    }
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
