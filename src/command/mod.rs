//! # Steering Command Module
//!
//! ASCII wire protocol to the car's motor controller.
//!
//! This module handles:
//! - Rescaling a raw prediction into a steering byte
//! - Formatting `steer,direction,speed,elapsed_ms` command strings

pub mod encoder;

pub use encoder::{
    encode, steer_byte, SteeringCommand, DIRECTION_FORWARD, DIRECTION_REVERSE, SPEED_BRAKE,
    SPEED_FULL_THROTTLE,
};
