//! # Predictor Module
//!
//! Narrow interface to the steering model.
//!
//! The control loop knows only the contract: two scalar features plus a
//! 3×64×64 channel-first frame in, one steering value out. The inference
//! engine behind it is swapped independently of the loop.

use tracing::debug;

use crate::error::{DriveError, Result};
use crate::fusion::FeatureVector;
use crate::vision::{FramePixels, FramePreprocessor};

/// Default constant prediction (straight ahead after rescaling)
pub const DEFAULT_CONSTANT_PREDICTION: f32 = 0.5;

/// Steering model
#[cfg_attr(test, mockall::automock)]
pub trait Predictor: Send {
    /// Predict a raw steering value.
    ///
    /// # Errors
    ///
    /// Returns `DriveError::Inference` if the model cannot produce a value.
    fn predict(&mut self, features: &FeatureVector, frame: &FramePixels) -> Result<f32>;
}

/// Check the frame matches the model input shape.
pub fn check_input_shape(frame: &FramePixels) -> Result<()> {
    let expected = FramePreprocessor::output_shape();
    if frame.shape() != expected {
        return Err(DriveError::Inference(format!(
            "frame shape {:?} does not match model input {:?}",
            frame.shape(),
            expected
        )));
    }
    Ok(())
}

/// Always predicts the same value. Used for dry runs and bench setup.
#[derive(Debug, Clone, Copy)]
pub struct ConstantPredictor {
    value: f32,
}

impl Default for ConstantPredictor {
    fn default() -> Self {
        Self::new(DEFAULT_CONSTANT_PREDICTION)
    }
}

impl ConstantPredictor {
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl Predictor for ConstantPredictor {
    fn predict(&mut self, features: &FeatureVector, frame: &FramePixels) -> Result<f32> {
        check_input_shape(frame)?;
        debug!(
            "Constant prediction {} (speed {:.3}, accel {:.3})",
            self.value, features.speed, features.accel_magnitude
        );
        Ok(self.value)
    }
}
