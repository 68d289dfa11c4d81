//! # Telemetry Sample
//!
//! Parsing of a single telemetry line into a 3-axis acceleration sample.
//!
//! ## Line Format
//!
//! ```text
//! a0,a1,a2[,extra...]
//! ```
//!
//! At least three comma-separated floating point fields. Every field must
//! parse, but only the first three are used. The vertical axis (index 2) has
//! gravity subtracted so a car at rest reads `(0, 0, 0)`.

use nalgebra::Vector3;

use crate::error::{DriveError, Result};

/// Minimum number of fields in a telemetry line
pub const MIN_FIELDS: usize = 3;

/// Gravity in the accelerometer's native units (g)
pub const DEFAULT_GRAVITY: f32 = 1.0;

/// One gravity-compensated acceleration sample.
///
/// Immutable once parsed; consumed by fusion in the same cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    accel: Vector3<f32>,
}

impl TelemetrySample {
    /// Creates a sample from already-compensated components.
    #[must_use]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            accel: Vector3::new(x, y, z),
        }
    }

    /// Parses a telemetry line and subtracts `gravity` from axis 2.
    ///
    /// # Errors
    ///
    /// Returns `DriveError::TelemetryParse` if the line has fewer than
    /// [`MIN_FIELDS`] fields or any field is not a finite number.
    ///
    /// # Examples
    ///
    /// ```
    /// use otto_drive::telemetry::TelemetrySample;
    ///
    /// let sample = TelemetrySample::parse("0.0,0.0,1.0", 1.0)?;
    /// assert_eq!(sample.as_array(), [0.0, 0.0, 0.0]);
    /// # Ok::<(), otto_drive::error::DriveError>(())
    /// ```
    pub fn parse(line: &str, gravity: f32) -> Result<Self> {
        let trimmed = line.trim();
        let fields: Vec<&str> = trimmed.split(',').collect();

        if fields.len() < MIN_FIELDS {
            return Err(DriveError::TelemetryParse {
                line: trimmed.to_string(),
                reason: format!(
                    "expected at least {} fields, got {}",
                    MIN_FIELDS,
                    fields.len()
                ),
            });
        }

        let mut values = Vec::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            let value = field.trim().parse::<f32>().map_err(|e| DriveError::TelemetryParse {
                line: trimmed.to_string(),
                reason: format!("field {} ({:?}) is not a number: {}", index, field, e),
            })?;
            if !value.is_finite() {
                return Err(DriveError::TelemetryParse {
                    line: trimmed.to_string(),
                    reason: format!("field {} ({:?}) is not finite", index, field),
                });
            }
            values.push(value);
        }

        Ok(Self::new(values[0], values[1], values[2] - gravity))
    }

    /// Acceleration vector
    #[must_use]
    pub fn accel(&self) -> &Vector3<f32> {
        &self.accel
    }

    /// Components as a plain array (x, y, z)
    #[must_use]
    pub fn as_array(&self) -> [f32; 3] {
        [self.accel.x, self.accel.y, self.accel.z]
    }

    /// Euclidean norm of the acceleration
    #[must_use]
    pub fn magnitude(&self) -> f32 {
        self.accel.norm()
    }
}
