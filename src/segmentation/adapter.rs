use crate::config::Quality;
use crate::error::{FilterError, Result};
use crate::frame::FrameView;

use super::types::{Matte, SegmentationProvider};

/// Stable call contract around a [`SegmentationProvider`].
///
/// One synchronous call per frame. The provider's cross-call state belongs to
/// this adapter (and so to one filter instance); `&mut self` keeps calls
/// strictly sequential.
pub struct SegmentationAdapter {
    provider: Box<dyn SegmentationProvider>,
    quality: Quality,
    /// Frames segmented since the last reset
    sequence: u64,
}

impl SegmentationAdapter {
    pub fn new(mut provider: Box<dyn SegmentationProvider>, quality: Quality) -> Self {
        provider.set_quality(quality);
        tracing::info!("Segmentation provider '{}' at {:?} quality", provider.name(), quality);
        Self {
            provider,
            quality,
            sequence: 0,
        }
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Frames segmented since creation or the last reset.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Select a new operating point. Provider state from the old one is dropped.
    pub fn set_quality(&mut self, quality: Quality) {
        if quality == self.quality {
            return;
        }
        tracing::info!("Segmentation quality {:?} -> {:?}", self.quality, quality);
        self.quality = quality;
        self.provider.set_quality(quality);
        self.reset();
    }

    pub fn reset(&mut self) {
        tracing::debug!("Resetting segmentation state after {} frame(s)", self.sequence);
        self.provider.reset_state();
        self.sequence = 0;
    }

    pub fn segment(&mut self, frame: &FrameView<'_>) -> Result<Matte> {
        let _span = tracing::debug_span!("segment", seq = self.sequence).entered();

        let mut matte = self
            .provider
            .segment(frame)
            .map_err(|e| FilterError::Segmentation(format!("{:#}", e)))?;

        if matte.is_empty() || matte.width() == 0 || matte.height() == 0 {
            return Err(FilterError::Segmentation("provider returned no results".to_string()));
        }
        matte.clamp_unit();
        self.sequence += 1;
        Ok(matte)
    }
}
