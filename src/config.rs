//! Filter settings as the host stores them.
//!
//! Field names double as the host's setting keys. Values are clamped by
//! [`FilterConfig::sanitize`] before the filter ever reads them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const BLUR_RADIUS_RANGE: (u32, u32) = (5, 50);
pub const EDGE_SMOOTHING_RANGE: (f32, f32) = (0.0, 5.0);
pub const UNIT_RANGE: (f32, f32) = (0.0, 1.0);

/// Segmentation accuracy/latency operating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// ~60 fps, rough edges
    Fast,
    /// ~30 fps
    #[default]
    Balanced,
    /// ~15 fps, best edges
    Accurate,
}

impl Quality {
    /// Square model input edge in pixels.
    pub fn input_edge(self) -> u32 {
        match self {
            Quality::Fast => 256,
            Quality::Balanced => 512,
            Quality::Accurate => 768,
        }
    }

    /// Ratio at which a recurrent model runs its internal feature maps.
    pub fn downsample_ratio(self) -> f32 {
        match self {
            Quality::Fast | Quality::Balanced => 0.25,
            Quality::Accurate => 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundMode {
    #[default]
    Blur,
    /// Solid color, e.g. for chroma keying downstream
    Color,
    /// Zero color and zero alpha, for compositing by the host
    Transparent,
    /// Still image, falls back to blur when none is loaded
    Image,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub enabled: bool,
    pub quality: Quality,
    pub background_mode: BackgroundMode,
    pub blur_radius: u32,
    pub edge_smoothing: f32,
    pub mask_threshold: f32,
    pub temporal_smoothing: bool,
    pub temporal_factor: f32,
    pub edge_refinement: bool,
    /// 0xRRGGBB
    pub background_color: u32,
    pub show_mask: bool,
    pub performance_info: bool,
    pub background_image: Option<PathBuf>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: Quality::Balanced,
            background_mode: BackgroundMode::Blur,
            blur_radius: 20,
            edge_smoothing: 1.0,
            mask_threshold: 0.5,
            temporal_smoothing: true,
            temporal_factor: 0.8,
            edge_refinement: false,
            background_color: 0x00FF00,
            show_mask: false,
            performance_info: false,
            background_image: None,
        }
    }
}

impl FilterConfig {
    /// Parse a host settings object. Unknown keys are ignored, missing keys
    /// take defaults, out-of-range values are clamped.
    pub fn from_settings(settings: serde_json::Value) -> serde_json::Result<Self> {
        let config: FilterConfig = serde_json::from_value(settings)?;
        Ok(config.sanitize())
    }

    pub fn sanitize(mut self) -> Self {
        let defaults = Self::default();

        self.blur_radius = self.blur_radius.clamp(BLUR_RADIUS_RANGE.0, BLUR_RADIUS_RANGE.1);
        self.edge_smoothing = clamp_finite(self.edge_smoothing, EDGE_SMOOTHING_RANGE, defaults.edge_smoothing);
        self.mask_threshold = clamp_finite(self.mask_threshold, UNIT_RANGE, defaults.mask_threshold);
        self.temporal_factor = clamp_finite(self.temporal_factor, UNIT_RANGE, defaults.temporal_factor);
        self.background_color &= 0x00FF_FFFF;
        self
    }

    /// Background color as BGRA bytes at full opacity.
    pub fn background_bgra(&self) -> [u8; 4] {
        let [_, r, g, b] = self.background_color.to_be_bytes();
        [b, g, r, 255]
    }

    /// Temporal factor if temporal smoothing is on.
    pub fn temporal_alpha(&self) -> Option<f32> {
        self.temporal_smoothing.then_some(self.temporal_factor)
    }
}

fn clamp_finite(value: f32, (min, max): (f32, f32), fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}
