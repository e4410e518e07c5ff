//! Background generation and mask-weighted blending.
//!
//! Every mode produces a background exactly the size of the frame, then the
//! frame is blended over it with the mask as weight (1 = original pixel,
//! 0 = background). Output is written straight into a pooled buffer.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, RgbaImage};

use crate::config::BackgroundMode;
use crate::error::{FilterError, Result};
use crate::frame::{FrameView, BYTES_PER_PIXEL};
use crate::pool::PooledBuffer;
use crate::segmentation::Matte;

/// Blur radii above this are computed on a downscaled copy.
const DOWNSCALE_BLUR_RADIUS: u32 = 8;
const MAX_BLUR_DOWNSCALE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeParams {
    pub mode: BackgroundMode,
    pub blur_radius: u32,
    /// BGRA
    pub color: [u8; 4],
    /// Render the mask itself instead of the composite.
    pub show_mask: bool,
}

enum Background {
    Uniform([u8; 4]),
    /// Frame-sized BGRA bytes stored in an `Rgba` container
    Image(RgbaImage),
}

#[derive(Default)]
pub struct Compositor {
    /// Replacement image, already swizzled to BGRA
    image: Option<RgbaImage>,
    /// `image` scaled to the last frame extent it was used at
    scaled: Option<RgbaImage>,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an RGBA image for [`BackgroundMode::Image`], or remove it.
    pub fn set_background_image(&mut self, image: Option<RgbaImage>) {
        self.image = image.map(|mut image| {
            for pixel in image.pixels_mut() {
                pixel.0.swap(0, 2);
            }
            image
        });
        self.scaled = None;
    }

    /// Drop extent-dependent caches after a resize.
    pub fn invalidate(&mut self) {
        self.scaled = None;
    }

    pub fn composite(
        &mut self,
        frame: &PooledBuffer,
        mask: &Matte,
        params: &CompositeParams,
        out: &mut PooledBuffer,
    ) -> Result<()> {
        let _span = tracing::debug_span!("composite", mode = ?params.mode).entered();

        if frame.generation() != out.generation() {
            return Err(FilterError::Composite(format!(
                "frame epoch {} and output epoch {} differ",
                frame.generation().epoch,
                out.generation().epoch
            )));
        }
        let (width, height) = (frame.width(), frame.height());
        if mask.dimensions() != (width, height) {
            return Err(FilterError::Composite(format!(
                "mask is {}x{}, frame is {}x{}",
                mask.width(),
                mask.height(),
                width,
                height
            )));
        }

        if params.show_mask {
            render_mask(mask, out);
            return Ok(());
        }

        let view = frame.view();
        let background = match params.mode {
            BackgroundMode::Color => Background::Uniform(params.color),
            BackgroundMode::Transparent => Background::Uniform([0, 0, 0, 0]),
            BackgroundMode::Image if self.image.is_some() => Background::Image(self.scaled_image(width, height)?),
            BackgroundMode::Blur | BackgroundMode::Image => {
                Background::Image(blurred_background(&view, params.blur_radius)?)
            }
        };

        blend(&view, mask, &background, out);

        if let Background::Image(image) = background {
            if params.mode == BackgroundMode::Image && self.image.is_some() {
                self.scaled = Some(image);
            }
        }
        Ok(())
    }

    /// Replacement image stretched to the frame extent, from cache when possible.
    fn scaled_image(&mut self, width: u32, height: u32) -> Result<RgbaImage> {
        if let Some(scaled) = self.scaled.take() {
            if scaled.dimensions() == (width, height) {
                return Ok(scaled);
            }
        }
        let source = self
            .image
            .as_ref()
            .ok_or_else(|| FilterError::Composite("no background image".to_string()))?;
        let scaled = imageops::resize(source, width, height, FilterType::Triangle);
        if scaled.dimensions() != (width, height) {
            return Err(FilterError::Composite("background image scaling produced no output".to_string()));
        }
        Ok(scaled)
    }
}

/// Frame blurred by `radius`, same extent as the frame.
///
/// Large radii blur a downscaled copy and scale back up, which is visually
/// equivalent for a background and keeps the cost flat.
fn blurred_background(frame: &FrameView<'_>, radius: u32) -> Result<RgbaImage> {
    let (width, height) = (frame.width, frame.height);
    let packed: RgbaImage = ImageBuffer::from_raw(width, height, frame.to_packed())
        .ok_or_else(|| FilterError::Composite("frame could not be wrapped for blurring".to_string()))?;

    let factor = (radius / DOWNSCALE_BLUR_RADIUS).clamp(1, MAX_BLUR_DOWNSCALE);
    let sigma = radius as f32 / factor as f32;
    let blurred = if factor > 1 {
        let small = imageops::resize(
            &packed,
            (width / factor).max(1),
            (height / factor).max(1),
            FilterType::Triangle,
        );
        let small = imageops::blur(&small, sigma);
        imageops::resize(&small, width, height, FilterType::Triangle)
    } else {
        imageops::blur(&packed, sigma)
    };

    // Crop back to the frame extent in case the filter grew it.
    let blurred = if blurred.dimensions() != (width, height) {
        if blurred.width() < width || blurred.height() < height {
            return Err(FilterError::Composite("blur produced no output".to_string()));
        }
        imageops::crop_imm(&blurred, 0, 0, width, height).to_image()
    } else {
        blurred
    };
    Ok(blurred)
}

fn blend(frame: &FrameView<'_>, mask: &Matte, background: &Background, out: &mut PooledBuffer) {
    for y in 0..frame.height {
        let row = frame.row(y);
        for x in 0..frame.width {
            let m = mask.get(x, y);
            let i = x as usize * BYTES_PER_PIXEL;
            let fg = &row[i..i + BYTES_PER_PIXEL];
            let bg = match background {
                Background::Uniform(color) => *color,
                Background::Image(image) => image.get_pixel(x, y).0,
            };
            let dst = out.pixel_mut(x, y);
            for c in 0..BYTES_PER_PIXEL {
                let v = fg[c] as f32 * m + bg[c] as f32 * (1.0 - m);
                dst[c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Opaque grayscale view of the mask.
fn render_mask(mask: &Matte, out: &mut PooledBuffer) {
    for y in 0..mask.height() {
        for x in 0..mask.width() {
            let v = (mask.get(x, y) * 255.0).round().clamp(0.0, 255.0) as u8;
            out.pixel_mut(x, y).copy_from_slice(&[v, v, v, 255]);
        }
    }
}
