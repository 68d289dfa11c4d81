//! Frame types and the frame source port.

use image::{Rgb, RgbImage};
use std::path::Path;
use tracing::info;

use crate::error::Result;

/// Source of raw RGB camera frames, called once per cycle.
pub trait FrameSource: Send {
    fn capture(&mut self) -> Result<RgbImage>;
}

/// Replays the same still image every cycle.
pub struct StillFrameSource {
    frame: RgbImage,
}

impl StillFrameSource {
    /// Load the still image from disk.
    ///
    /// # Errors
    ///
    /// Returns `Image` if the file is missing or cannot be decoded.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let frame = image::open(path.as_ref())?.to_rgb8();
        info!(
            "Loaded still frame {} ({}x{})",
            path.as_ref().display(),
            frame.width(),
            frame.height()
        );
        Ok(Self { frame })
    }

    pub fn from_image(frame: RgbImage) -> Self {
        Self { frame }
    }
}

impl FrameSource for StillFrameSource {
    fn capture(&mut self) -> Result<RgbImage> {
        Ok(self.frame.clone())
    }
}

/// Uniform mid-grey frames of a fixed size, used when no camera is wired up.
pub struct BlankFrameSource {
    width: u32,
    height: u32,
}

impl BlankFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl FrameSource for BlankFrameSource {
    fn capture(&mut self) -> Result<RgbImage> {
        Ok(RgbImage::from_pixel(self.width, self.height, Rgb([128, 128, 128])))
    }
}

/// Channel-first RGB pixel buffer (3 × height × width).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePixels {
    data: Vec<u8>,
    channels: usize,
    height: usize,
    width: usize,
}

impl FramePixels {
    /// Reorder an interleaved RGB image into channel-first planes.
    pub fn from_rgb(image: &RgbImage) -> Self {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let plane = width * height;
        let mut data = vec![0u8; 3 * plane];

        for (x, y, pixel) in image.enumerate_pixels() {
            let offset = y as usize * width + x as usize;
            for c in 0..3 {
                data[c * plane + offset] = pixel[c];
            }
        }

        Self {
            data,
            channels: 3,
            height,
            width,
        }
    }

    /// `(channels, height, width)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.channels, self.height, self.width)
    }

    pub fn get(&self, channel: usize, y: usize, x: usize) -> Option<u8> {
        if channel >= self.channels || y >= self.height || x >= self.width {
            return None;
        }
        self.data
            .get(channel * self.height * self.width + y * self.width + x)
            .copied()
    }

    /// One channel plane, row-major
    pub fn plane(&self, channel: usize) -> Option<&[u8]> {
        let plane = self.height * self.width;
        self.data.get(channel * plane..(channel + 1) * plane)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
