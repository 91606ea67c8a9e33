//! # Vehicle Supervisor
//!
//! Runs one supervised session against the in-process simulated vehicle.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (first argument, else `config/default.toml`, else defaults)
//!    - Set up logging with a tracing subscriber
//!    - Wait for the vehicle to announce itself
//!
//! 2. **Session**
//!    - Heartbeat, telemetry and command workers run until the session
//!      duration elapses, the vehicle disappears or Ctrl+C is pressed
//!
//! 3. **Graceful Shutdown**
//!    - Request exit, drain channels sink-to-source, join every worker
//!
//! Setup failures print `ERROR: ...` and exit with status 1.
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- config/default.toml
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vehicle_supervisor::config::{Config, LoggingConfig};
use vehicle_supervisor::error::SupervisorError;
use vehicle_supervisor::supervisor::Supervisor;
use vehicle_supervisor::transport::sim::{SimPose, SimulatedVehicle};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("ERROR: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = load_config(std::env::args().nth(1))?;
    let _log_guard = init_logging(&config.logging).context("cannot initialise logging")?;

    info!("Vehicle Supervisor v{} starting...", env!("CARGO_PKG_VERSION"));

    let link = Arc::new(SimulatedVehicle::new(SimPose::default()));
    let supervisor = Supervisor::new(config, link);
    supervisor.connect().await?;

    info!("Press Ctrl+C to exit");
    let report = supervisor.run().await?;
    info!(
        "Session ended ({}): {} liveness updates, {} directives",
        report.reason, report.liveness_updates, report.directives
    );
    Ok(())
}

fn load_config(path: Option<String>) -> Result<Config> {
    match path {
        Some(path) => {
            Config::load(&path).with_context(|| format!("cannot load configuration from {}", path))
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("cannot load configuration from {}", DEFAULT_CONFIG_PATH)),
        None => Ok(Config::default()),
    }
}

/// Terminal output always; a daily-rolling file too when `log_dir` is set.
///
/// `RUST_LOG` overrides the configured level.
fn init_logging(config: &LoggingConfig) -> std::result::Result<Option<WorkerGuard>, SupervisorError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| SupervisorError::Logging(e.to_string()))?;

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("vehicle-supervisor")
                .filename_suffix("log")
                .build(dir)
                .map_err(|e| SupervisorError::Logging(e.to_string()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| SupervisorError::Logging(e.to_string()))?;

    Ok(guard)
}
