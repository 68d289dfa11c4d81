//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; missing values take the defaults
//! below. See `config/default.toml` for an annotated example.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{DriveError, Result};
use crate::fusion::TimeStep;

/// Operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Serial device for telemetry and commands
    Live,
    /// Telemetry replayed from a file, commands suppressed
    #[default]
    DryRun,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Live => f.write_str("live"),
            Mode::DryRun => f.write_str("dry-run"),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub mode: Mode,
    pub serial: SerialConfig,
    pub replay: ReplayConfig,
    pub camera: CameraConfig,
    pub fusion: FusionConfig,
    pub predictor: PredictorConfig,
    #[serde(rename = "loop")]
    pub control: LoopConfig,
    pub recorder: RecorderConfig,
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// Dry-run telemetry replay configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ReplayConfig {
    #[serde(default = "default_telemetry_path")]
    pub telemetry_path: String,
}

/// Camera frame configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// Still image replayed every cycle; blank frames when unset
    #[serde(default)]
    pub still_image: Option<String>,

    #[serde(default = "default_frame_width")]
    pub width: u32,

    #[serde(default = "default_frame_height")]
    pub height: u32,

    #[serde(default = "default_crop_margin")]
    pub crop_margin: u32,

    #[serde(default = "default_crop_size")]
    pub crop_size: u32,
}

/// State fusion configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FusionConfig {
    #[serde(default = "default_gravity")]
    pub gravity: f32,

    #[serde(default)]
    pub time_step: TimeStep,

    #[serde(default)]
    pub max_speed: Option<f32>,
}

/// Predictor configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PredictorConfig {
    #[serde(default = "default_constant_prediction")]
    pub constant: f32,
}

/// Control loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoopConfig {
    /// Fixed cycle period; unthrottled when unset
    #[serde(default)]
    pub cycle_period_ms: Option<u64>,

    #[serde(default = "default_status_interval_cycles")]
    pub status_interval_cycles: u64,
}

/// Cycle recorder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecorderConfig {
    #[serde(default = "default_recorder_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily-rolling log files; stdout only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud_rate() -> u32 { 9600 }

fn default_telemetry_path() -> String { "data/test_data.csv".to_string() }

fn default_frame_width() -> u32 { 160 }
fn default_frame_height() -> u32 { 120 }
fn default_crop_margin() -> u32 { 20 }
fn default_crop_size() -> u32 { 120 }

fn default_gravity() -> f32 { 1.0 }

fn default_constant_prediction() -> f32 { 0.5 }

fn default_status_interval_cycles() -> u64 { 100 }

fn default_recorder_enabled() -> bool { false }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            telemetry_path: default_telemetry_path(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            still_image: None,
            width: default_frame_width(),
            height: default_frame_height(),
            crop_margin: default_crop_margin(),
            crop_size: default_crop_size(),
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            gravity: default_gravity(),
            time_step: TimeStep::default(),
            max_speed: None,
        }
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            constant: default_constant_prediction(),
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            cycle_period_ms: None,
            status_interval_cycles: default_status_interval_cycles(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: default_recorder_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> DriveError {
    DriveError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use otto_drive::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        match self.mode {
            Mode::Live => {
                if self.serial.port.is_empty() {
                    return Err(invalid("serial port cannot be empty in live mode"));
                }
            }
            Mode::DryRun => {
                if self.replay.telemetry_path.is_empty() {
                    return Err(invalid("replay telemetry_path cannot be empty in dry-run mode"));
                }
            }
        }

        // Validate baud rate
        if ![9600, 19200, 38400, 57600, 115200].contains(&self.serial.baud_rate) {
            return Err(invalid("baud_rate must be one of: 9600, 19200, 38400, 57600, 115200"));
        }

        // Validate crop against the configured frame size
        if self.camera.crop_size == 0 {
            return Err(invalid("crop_size must be greater than 0"));
        }

        let min_width = self
            .camera
            .crop_margin
            .checked_mul(2)
            .and_then(|margins| margins.checked_add(self.camera.crop_size))
            .ok_or_else(|| invalid("crop_size + 2 * crop_margin overflows"))?;

        if self.camera.still_image.is_none() {
            if self.camera.width < min_width || self.camera.height < self.camera.crop_size {
                return Err(invalid(format!(
                    "camera frame {}x{} is smaller than the crop requires ({}x{})",
                    self.camera.width, self.camera.height, min_width, self.camera.crop_size
                )));
            }
        }

        if !self.fusion.gravity.is_finite() {
            return Err(invalid("gravity must be a finite number"));
        }

        if let Some(max_speed) = self.fusion.max_speed {
            if !max_speed.is_finite() || max_speed <= 0.0 {
                return Err(invalid("max_speed must be a positive number"));
            }
        }

        if !self.predictor.constant.is_finite() {
            return Err(invalid("predictor constant must be a finite number"));
        }

        if let Some(period) = self.control.cycle_period_ms {
            if period == 0 || period > 10000 {
                return Err(invalid("cycle_period_ms must be between 1 and 10000"));
            }
        }

        if self.control.status_interval_cycles == 0 {
            return Err(invalid("status_interval_cycles must be greater than 0"));
        }

        // Validate recorder
        if self.recorder.enabled && self.recorder.log_dir.is_empty() {
            return Err(invalid("recorder log_dir cannot be empty when enabled"));
        }

        if self.recorder.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.recorder.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if let Some(dir) = &self.logging.dir {
            if dir.is_empty() {
                return Err(invalid("logging dir cannot be empty when set"));
            }
        }

        Ok(())
    }
}
