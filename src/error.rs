//! # Error Types
//!
//! Custom error types for Otto Drive using `thiserror`.
//!
//! The first four variants are the cycle-local faults of the control loop:
//! they are caught at the loop boundary, logged, and the next cycle starts.
//! The rest only surface at startup (resource acquisition, configuration).

use std::fmt;

use thiserror::Error;

/// Main error type for Otto Drive
#[derive(Debug, Error)]
pub enum DriveError {
    /// Telemetry line could not be parsed into an acceleration triple
    #[error("Telemetry parse error: {reason} (line: {line:?})")]
    TelemetryParse { line: String, reason: String },

    /// Telemetry source failed while reading a line
    #[error("Telemetry read error: {0}")]
    TelemetryIo(std::io::Error),

    /// Camera frame is too small for the square crop
    #[error("Frame shape error: got {width}x{height}, need at least {min_width}x{min_height}")]
    FrameShape {
        width: u32,
        height: u32,
        min_width: u32,
        min_height: u32,
    },

    /// Predictor failed or produced an unusable value
    #[error("Inference error: {0}")]
    Inference(String),

    /// Write to the actuator channel failed
    #[error("Actuator I/O error: {0}")]
    ActuatorIo(std::io::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// No serial device could be opened
    #[error("Serial port not found (tried: {0})")]
    SerialPortNotFound(String),

    /// Image loading errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Cycle record serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Otto Drive
pub type Result<T> = std::result::Result<T, DriveError>;

/// Stage of a control cycle, used to label faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleStage {
    Reading,
    Fusing,
    Preprocessing,
    Predicting,
    Encoding,
    Dispatching,
}

impl CycleStage {
    /// Lowercase stage name as it appears in logs.
    pub fn name(&self) -> &'static str {
        match self {
            CycleStage::Reading => "reading",
            CycleStage::Fusing => "fusing",
            CycleStage::Preprocessing => "preprocessing",
            CycleStage::Predicting => "predicting",
            CycleStage::Encoding => "encoding",
            CycleStage::Dispatching => "dispatching",
        }
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stage failure caught at the control loop boundary.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {error}")]
pub struct CycleFault {
    pub stage: CycleStage,
    #[source]
    pub error: DriveError,
}

impl CycleFault {
    pub fn new(stage: CycleStage, error: DriveError) -> Self {
        Self { stage, error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_parse_message_contains_line() {
        let err = DriveError::TelemetryParse {
            line: "abc,0.0".to_string(),
            reason: "expected at least 3 fields, got 2".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc,0.0"));
        assert!(msg.contains("at least 3 fields"));
    }

    #[test]
    fn test_frame_shape_message() {
        let err = DriveError::FrameShape {
            width: 160,
            height: 119,
            min_width: 160,
            min_height: 120,
        };
        assert_eq!(
            err.to_string(),
            "Frame shape error: got 160x119, need at least 160x120"
        );
    }

    #[test]
    fn test_cycle_fault_display_names_stage() {
        let fault = CycleFault::new(
            CycleStage::Dispatching,
            DriveError::ActuatorIo(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device gone",
            )),
        );
        let msg = fault.to_string();
        assert!(msg.starts_with("dispatching stage failed"));
        assert!(msg.contains("device gone"));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(CycleStage::Reading.to_string(), "reading");
        assert_eq!(CycleStage::Preprocessing.name(), "preprocessing");
    }
}
