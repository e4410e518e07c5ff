use anyhow::Result;
use image::{ImageBuffer, Luma};

use crate::config::Quality;
use crate::frame::FrameView;

/// Single channel f32 image used for mask filtering.
pub type MatteImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Per-pixel foreground probability: 0.0 = background, 1.0 = foreground.
///
/// Row-major, no padding. Dimensions are whatever the provider produced until
/// the mask post-processor rescales it to the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Matte {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl Matte {
    /// `None` if `values` does not hold exactly `width * height` entries.
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Option<Self> {
        if values.len() != width as usize * height as usize {
            return None;
        }
        Some(Self { width, height, values })
    }

    /// 8-bit probabilities, 255 = foreground.
    pub fn from_luma8(width: u32, height: u32, values: &[u8]) -> Option<Self> {
        Self::new(width, height, values.iter().map(|&v| v as f32 / 255.0).collect())
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            values: vec![value; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[y as usize * self.width as usize + x as usize]
    }

    /// Force every value into [0, 1]; NaN becomes background.
    pub fn clamp_unit(&mut self) {
        for v in &mut self.values {
            *v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        }
    }

    pub fn into_image(self) -> MatteImage {
        // Length was validated on construction.
        ImageBuffer::from_raw(self.width, self.height, self.values)
            .unwrap_or_else(|| ImageBuffer::new(0, 0))
    }

    pub fn from_image(image: MatteImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            values: image.into_raw(),
        }
    }
}

/// External segmentation capability.
/// Allows swapping between different backends (RVM, platform frameworks, fakes)
pub trait SegmentationProvider: Send {
    /// Produce a foreground probability mask for one BGRA frame.
    ///
    /// The mask may be at any resolution; it is rescaled to the frame later.
    fn segment(&mut self, frame: &FrameView<'_>) -> Result<Matte>;

    /// Drop temporal/recurrent state carried between calls.
    fn reset_state(&mut self) {
        // Default implementation: no-op for stateless providers
    }

    /// Switch operating point. Called at configuration time, never per frame.
    fn set_quality(&mut self, quality: Quality) {
        let _ = quality;
    }

    /// Provider name for logs
    fn name(&self) -> &str {
        "segmentation"
    }
}
