use anyhow::{Context, Result};
use image::{imageops, RgbImage};
use ndarray::Array4;

use crate::frame::FrameView;

/// Converts BGRA frames into model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess a BGRA frame into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Swizzle BGRA to RGB, dropping padding and alpha
    /// 2. Resize to target dimensions
    /// 3. Convert to float in [0, 1], laid out as NCHW
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, frame: &FrameView<'_>) -> Result<Array4<f32>> {
        let _span = tracing::debug_span!("preprocess").entered();

        let mut rgb = Vec::with_capacity(frame.width as usize * frame.height as usize * 3);
        for y in 0..frame.height {
            for bgra in frame.row(y).chunks_exact(4) {
                rgb.extend_from_slice(&[bgra[2], bgra[1], bgra[0]]);
            }
        }
        let image = RgbImage::from_raw(frame.width, frame.height, rgb).context("Frame has no pixels")?;

        // Triangle keeps this cheap; the model is robust to mild softening.
        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                &image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            image
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }

        Ok(tensor)
    }
}
