//! # Command Encoder
//!
//! Encodes a steering prediction into the actuator's ASCII command.
//!
//! ## Wire Format
//!
//! ```text
//! {steer},{direction},{speed},{elapsed_ms}
//! 127,1,255,12345
//! ```
//!
//! - `steer`: 0-255, full left to full right
//! - `direction`: 0 = reverse, 1 = forward
//! - `speed`: 0 = brake, 255 = full throttle
//! - `elapsed_ms`: milliseconds since the loop started
//!
//! No trailing newline. The receiver delimits commands by write boundary.

use std::fmt;
use tracing::warn;

/// Direction values
pub const DIRECTION_REVERSE: u8 = 0;
pub const DIRECTION_FORWARD: u8 = 1;

/// Speed values
pub const SPEED_BRAKE: u8 = 0;
pub const SPEED_FULL_THROTTLE: u8 = 255;

/// One encoded actuator command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SteeringCommand {
    pub steer: u8,
    pub direction: u8,
    pub speed: u8,
    pub elapsed_ms: u64,
}

impl SteeringCommand {
    /// Wire bytes of the command
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for SteeringCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.steer, self.direction, self.speed, self.elapsed_ms
        )
    }
}

/// Rescale a raw prediction to a steering byte.
///
/// `255 - round(255 * prediction)`, clamped to 0-255. NaN encodes as 0;
/// the control loop rejects non-finite predictions before encoding.
///
/// # Examples
///
/// ```
/// use otto_drive::command::steer_byte;
///
/// assert_eq!(steer_byte(0.0), 255);
/// assert_eq!(steer_byte(1.0), 0);
/// assert_eq!(steer_byte(0.5), 127);
/// assert_eq!(steer_byte(-2.0), 255); // clamped
/// ```
pub fn steer_byte(prediction: f32) -> u8 {
    let raw = 255.0 - (255.0 * prediction).round();
    if !(0.0..=255.0).contains(&raw) {
        warn!(
            "Steering {} out of range for prediction {}, clamping",
            raw, prediction
        );
    }
    // NaN survives clamp; `as` maps it to 0
    raw.clamp(0.0, 255.0) as u8
}

/// Encode a prediction into a forward, full-throttle command.
///
/// # Examples
///
/// ```
/// use otto_drive::command::encode;
///
/// assert_eq!(encode(0.0, 0).to_string(), "255,1,255,0");
/// assert_eq!(encode(1.0, 12345).to_string(), "0,1,255,12345");
/// ```
pub fn encode(prediction: f32, elapsed_ms: u64) -> SteeringCommand {
    SteeringCommand {
        steer: steer_byte(prediction),
        direction: DIRECTION_FORWARD,
        speed: SPEED_FULL_THROTTLE,
        elapsed_ms,
    }
}
