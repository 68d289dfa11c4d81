//! # Telemetry Module
//!
//! Accelerometer telemetry coming in, cycle records going out.
//!
//! This module handles:
//! - Parsing `a0,a1,a2[,...]` lines into gravity-compensated samples
//! - Reading one line per cycle from a file, serial port, or buffer
//! - Recording completed cycles as JSONL (JSON Lines)
//! - Rotating record files (max N records per file, last M files kept)

pub mod reader;
pub mod recorder;
pub mod sample;

pub use reader::{LineSource, TelemetryReader, TelemetrySource};
pub use recorder::{CycleRecord, CycleRecorder};
pub use sample::{TelemetrySample, DEFAULT_GRAVITY, MIN_FIELDS};
