//! Mask post-processing: rescale, edge smoothing, threshold, refinement,
//! temporal smoothing. Stages always run in that order.
//!
//! The processor owns the Previous Mask State. [`MaskPostProcessor::process`]
//! only reads it; the filter stores the new mask with
//! [`MaskPostProcessor::commit`] once the frame has been composited, so a
//! skipped frame never feeds the next blend.

use image::imageops::{self, FilterType};

use crate::config::FilterConfig;
use crate::segmentation::Matte;

/// Smoothing radii at or below this are treated as off.
pub const MIN_EDGE_SMOOTHING: f32 = 0.1;

/// Default threshold; the threshold stage is skipped at this value.
pub const NEUTRAL_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskParams {
    pub edge_smoothing: f32,
    pub threshold: f32,
    pub edge_refinement: bool,
    /// EMA weight of the previous mask, `None` when temporal smoothing is off.
    pub temporal_factor: Option<f32>,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self::from(&FilterConfig::default())
    }
}

impl From<&FilterConfig> for MaskParams {
    fn from(config: &FilterConfig) -> Self {
        Self {
            edge_smoothing: config.edge_smoothing,
            threshold: config.mask_threshold,
            edge_refinement: config.edge_refinement,
            temporal_factor: config.temporal_alpha(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MaskPostProcessor {
    previous: Option<Matte>,
}

impl MaskPostProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn a raw provider mask into a frame-sized mask ready for compositing.
    pub fn process(&self, raw: Matte, width: u32, height: u32, params: &MaskParams) -> Matte {
        let _span = tracing::debug_span!("mask").entered();

        let mut mask = rescale(raw, width, height);
        if params.edge_smoothing > MIN_EDGE_SMOOTHING {
            mask = smooth_edges(mask, params.edge_smoothing);
        }
        if (params.threshold - NEUTRAL_THRESHOLD).abs() > f32::EPSILON {
            apply_threshold(&mut mask, params.threshold);
        }
        if params.edge_refinement {
            refine_edges(&mut mask);
        }
        if let (Some(alpha), Some(previous)) = (params.temporal_factor, self.previous.as_ref()) {
            if previous.dimensions() == mask.dimensions() {
                blend_temporal(&mut mask, previous, alpha);
            }
        }
        mask
    }

    /// Keep `mask` as the Previous Mask State for the next frame.
    pub fn commit(&mut self, mask: Matte) {
        self.previous = Some(mask);
    }

    pub fn previous(&self) -> Option<&Matte> {
        self.previous.as_ref()
    }

    /// Forget temporal history (reset, resize, re-enable).
    pub fn invalidate(&mut self) {
        self.previous = None;
    }
}

/// Stretch to exactly `width` x `height`, X and Y scaled independently.
fn rescale(raw: Matte, width: u32, height: u32) -> Matte {
    if raw.dimensions() == (width, height) {
        return raw;
    }
    let resized = imageops::resize(&raw.into_image(), width, height, FilterType::Triangle);
    let mut mask = Matte::from_image(resized);
    mask.clamp_unit();
    mask
}

/// Gaussian low-pass over the mask only.
fn smooth_edges(mask: Matte, radius: f32) -> Matte {
    let blurred = imageops::blur(&mask.into_image(), radius);
    let mut mask = Matte::from_image(blurred);
    mask.clamp_unit();
    mask
}

/// Values below `threshold` drop to 0. Values at or above it move toward 1 by
/// the threshold fraction of their remaining distance: `v + t * (1 - v)`.
fn apply_threshold(mask: &mut Matte, threshold: f32) {
    for v in mask.values_mut() {
        *v = if *v < threshold {
            0.0
        } else {
            (*v + threshold * (1.0 - *v)).clamp(0.0, 1.0)
        };
    }
}

/// Smoothstep: steeper transition band, same 0.5 boundary.
fn refine_edges(mask: &mut Matte) {
    for v in mask.values_mut() {
        let x = *v;
        *v = (x * x * (3.0 - 2.0 * x)).clamp(0.0, 1.0);
    }
}

/// `(1 - alpha) * current + alpha * previous`
fn blend_temporal(mask: &mut Matte, previous: &Matte, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    for (current, &prev) in mask.values_mut().iter_mut().zip(previous.values()) {
        *current = ((1.0 - alpha) * *current + alpha * prev).clamp(0.0, 1.0);
    }
}
