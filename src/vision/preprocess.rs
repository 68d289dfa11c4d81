//! # Frame Preprocessor
//!
//! Turns a raw camera frame into the fixed model input.
//!
//! ## Transform
//!
//! 1. Drop `crop_margin` columns from each horizontal edge and take the
//!    largest centred square that fits, so the side is
//!    `min(width - 2 * crop_margin, height)`. `crop_size` is the smallest
//!    side accepted.
//! 2. Resize to 64×64 with a Catmull-Rom (bicubic) filter.
//! 3. Reorder to channel-first RGB.
//!
//! With the defaults (margin 20, crop 120) a 160×120 camera frame is the
//! minimum accepted size.

use image::imageops::{self, FilterType};
use image::RgbImage;

use super::frame::FramePixels;
use crate::error::{DriveError, Result};

/// Model input width and height
pub const MODEL_INPUT_SIZE: u32 = 64;

/// Model input channels (RGB)
pub const MODEL_INPUT_CHANNELS: usize = 3;

/// Default columns removed from each horizontal edge
pub const DEFAULT_CROP_MARGIN: u32 = 20;

/// Default side of the square crop
pub const DEFAULT_CROP_SIZE: u32 = 120;

/// Crop/resize/reorder contract for the predictor input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePreprocessor {
    crop_margin: u32,
    crop_size: u32,
}

impl Default for FramePreprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_CROP_MARGIN, DEFAULT_CROP_SIZE)
    }
}

impl FramePreprocessor {
    #[must_use]
    pub fn new(crop_margin: u32, crop_size: u32) -> Self {
        Self {
            crop_margin,
            crop_size: crop_size.max(1),
        }
    }

    /// Smallest accepted frame `(width, height)`. Saturates at `u32::MAX`.
    #[must_use]
    pub fn min_dimensions(&self) -> (u32, u32) {
        let width = self
            .crop_margin
            .saturating_mul(2)
            .saturating_add(self.crop_size);
        (width, self.crop_size)
    }

    /// Side of the square cropped from a `width`x`height` frame
    #[must_use]
    pub fn crop_side(&self, width: u32, height: u32) -> u32 {
        width
            .saturating_sub(self.crop_margin.saturating_mul(2))
            .min(height)
    }

    /// Expected output shape `(channels, height, width)`
    #[must_use]
    pub fn output_shape() -> (usize, usize, usize) {
        (
            MODEL_INPUT_CHANNELS,
            MODEL_INPUT_SIZE as usize,
            MODEL_INPUT_SIZE as usize,
        )
    }

    /// Crop, resize and reorder one frame.
    ///
    /// # Errors
    ///
    /// Returns `DriveError::FrameShape` if the frame is narrower or shorter
    /// than [`min_dimensions`](Self::min_dimensions).
    pub fn process(&self, frame: &RgbImage) -> Result<FramePixels> {
        let (width, height) = frame.dimensions();
        let (min_width, min_height) = self.min_dimensions();

        if width < min_width || height < min_height {
            return Err(DriveError::FrameShape {
                width,
                height,
                min_width,
                min_height,
            });
        }

        let side = self.crop_side(width, height);
        let x = (width - side) / 2;
        let y = (height - side) / 2;
        let square = imageops::crop_imm(frame, x, y, side, side).to_image();

        let resized = imageops::resize(
            &square,
            MODEL_INPUT_SIZE,
            MODEL_INPUT_SIZE,
            FilterType::CatmullRom,
        );

        Ok(FramePixels::from_rgb(&resized))
    }
}
