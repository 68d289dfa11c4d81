//! # Otto Drive Library
//!
//! Drive a small autonomous car by fusing accelerometer telemetry with a
//! vision-based steering prediction.
//!
//! Each control cycle reads one telemetry line, integrates it into a
//! velocity estimate, preprocesses a camera frame, asks the predictor for a
//! steering value, and writes an ASCII command to the car over serial.

pub mod actuator;
pub mod command;
pub mod config;
pub mod control;
pub mod error;
pub mod fusion;
pub mod predictor;
pub mod serial;
pub mod telemetry;
pub mod vision;
