//! # Vision Module
//!
//! Camera frame hand-off to the predictor.
//!
//! This module handles:
//! - The frame source port (camera drivers live outside this crate)
//! - Cropping frames to a square and resizing to the model input
//! - Reordering pixels to channel-first RGB

pub mod frame;
pub mod preprocess;

pub use frame::{BlankFrameSource, FramePixels, FrameSource, StillFrameSource};
pub use preprocess::{FramePreprocessor, MODEL_INPUT_CHANNELS, MODEL_INPUT_SIZE};
