//! # Otto Drive
//!
//! Drive a small autonomous car from accelerometer telemetry and a camera.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Parse command line, load TOML configuration
//!    - Set up logging (stdout, plus rolling files when configured)
//!    - Open the serial link (live) or the telemetry replay file (dry-run)
//!
//! 2. **Main Loop**
//!    - read telemetry -> fuse -> preprocess frame -> predict -> encode -> dispatch
//!    - Stage faults are logged and the next cycle starts
//!    - Ctrl+C or end of telemetry stops the loop
//!
//! 3. **Graceful Shutdown**
//!    - Flush the actuator channel and cycle records
//!    - Release serial, file and camera handles
//!
//! Run a dry run against recorded telemetry:
//! ```bash
//! cargo run --release -- --dry-run --telemetry data/test_data.csv
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::io::BufReader;
use tokio::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use otto_drive::actuator::ActuatorChannel;
use otto_drive::config::{Config, LoggingConfig, Mode};
use otto_drive::control::ControlLoop;
use otto_drive::fusion::StateFusion;
use otto_drive::predictor::ConstantPredictor;
use otto_drive::serial::CarSerial;
use otto_drive::telemetry::{CycleRecorder, LineSource, TelemetryReader, TelemetrySource};
use otto_drive::vision::{BlankFrameSource, FramePreprocessor, FrameSource, StillFrameSource};

/// Configuration file used when `--config` is not given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Log file name prefix inside `logging.dir`
const LOG_FILE_PREFIX: &str = "otto-drive.log";

#[derive(Parser, Debug)]
#[command(name = "otto-drive")]
#[command(about = "Fuse accelerometer telemetry with a steering model and drive the car", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Replay telemetry from a file and suppress actuator writes
    #[arg(long, conflicts_with = "live")]
    dry_run: bool,

    /// Use the serial device for telemetry and commands
    #[arg(long)]
    live: bool,

    /// Telemetry replay file (dry-run)
    #[arg(long, value_name = "PATH")]
    telemetry: Option<String>,
}

/// Load the configuration and apply command line overrides.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("Failed to load config {}", DEFAULT_CONFIG_PATH))?,
        None => Config::default(),
    };

    apply_overrides(&mut config, args);
    config.validate().context("Invalid configuration after overrides")?;
    Ok(config)
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if args.dry_run {
        config.mode = Mode::DryRun;
    } else if args.live {
        config.mode = Mode::Live;
    }
    if let Some(path) = &args.telemetry {
        config.replay.telemetry_path = path.clone();
    }
}

/// Set up tracing. The returned guard must live until exit so buffered log
/// lines reach the file.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

fn open_frame_source(config: &Config) -> Result<Box<dyn FrameSource>> {
    match &config.camera.still_image {
        Some(path) => {
            let source = StillFrameSource::open(path)
                .with_context(|| format!("Failed to open still frame {}", path))?;
            Ok(Box::new(source))
        }
        None => {
            info!(
                "No camera frame source configured, using blank {}x{} frames",
                config.camera.width, config.camera.height
            );
            Ok(Box::new(BlankFrameSource::new(
                config.camera.width,
                config.camera.height,
            )))
        }
    }
}

/// Main entry point for Otto Drive
///
/// # Errors
///
/// Returns error if:
/// - Configuration cannot be loaded or is invalid
/// - Serial device or telemetry file cannot be opened
/// - The telemetry source fails while driving
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let _log_guard = init_logging(&config.logging);

    info!("Otto Drive v{} starting in {} mode...", env!("CARGO_PKG_VERSION"), config.mode);

    let (source, actuator): (Box<dyn TelemetrySource>, ActuatorChannel) = match config.mode {
        Mode::Live => {
            let serial = CarSerial::open(&config.serial.port, config.serial.baud_rate)?;
            info!("Car serial port opened at: {}", serial.device_path());
            let (lines, port) = serial.split();
            let source: Box<dyn TelemetrySource> = Box::new(lines);
            (source, ActuatorChannel::live(Box::new(port)))
        }
        Mode::DryRun => {
            let path = &config.replay.telemetry_path;
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open telemetry replay {}", path))?;
            info!("Replaying telemetry from {}", path);
            let source: Box<dyn TelemetrySource> = Box::new(LineSource::new(BufReader::new(file)));
            (source, ActuatorChannel::DryRun)
        }
    };

    let telemetry = TelemetryReader::new(source, config.fusion.gravity);
    let frames = open_frame_source(&config)?;
    let predictor = Box::new(ConstantPredictor::new(config.predictor.constant));

    let mut control = ControlLoop::new(telemetry, frames, predictor, actuator)
        .with_fusion(StateFusion::new().with_max_speed(config.fusion.max_speed))
        .with_preprocessor(FramePreprocessor::new(
            config.camera.crop_margin,
            config.camera.crop_size,
        ))
        .with_time_step(config.fusion.time_step)
        .with_cycle_period(config.control.cycle_period_ms.map(Duration::from_millis))
        .with_status_interval(config.control.status_interval_cycles);

    if config.recorder.enabled {
        control = control.with_recorder(CycleRecorder::new(&config.recorder)?);
    }

    info!("Press Ctrl+C to exit");

    let stats = control
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, shutting down...");
        })
        .await?;

    info!(
        "Total cycles: {} ({} completed, {} dispatched, {} faults)",
        stats.cycles,
        stats.completed,
        stats.dispatched,
        stats.faults()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let args = Args::try_parse_from(["otto-drive"]).unwrap();
        assert!(args.config.is_none());
        assert!(!args.dry_run);
        assert!(!args.live);
        assert!(args.telemetry.is_none());
    }

    #[test]
    fn test_dry_run_and_live_conflict() {
        assert!(Args::try_parse_from(["otto-drive", "--dry-run", "--live"]).is_err());
    }

    #[test]
    fn test_overrides_applied() {
        let args = Args::try_parse_from([
            "otto-drive",
            "--live",
            "--telemetry",
            "runs/lap1.csv",
        ])
        .unwrap();
        let mut config = Config::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.mode, Mode::Live);
        assert_eq!(config.replay.telemetry_path, "runs/lap1.csv");
    }

    #[test]
    fn test_no_overrides_keeps_file_mode() {
        let args = Args::try_parse_from(["otto-drive"]).unwrap();
        let mut config = Config::default();
        config.mode = Mode::Live;
        apply_overrides(&mut config, &args);
        assert_eq!(config.mode, Mode::Live);
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"mode = \"live\"\n[serial]\nport = \"/dev/ttyUSB1\"\n").unwrap();
        file.flush().unwrap();

        let path = file.path().to_string_lossy().to_string();
        let args = Args::try_parse_from(["otto-drive", "--config", &path, "--dry-run"]).unwrap();
        let config = load_config(&args).unwrap();

        assert_eq!(config.mode, Mode::DryRun);
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
    }
}
