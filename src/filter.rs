//! The filter instance and the host boundary it satisfies.
//!
//! The host calls `on_tick` then `on_render` on its render thread, once per
//! frame, never concurrently; `update_config` is serialized with both. Any
//! per-frame failure turns into [`RenderOutput::Passthrough`].

use std::path::Path;
use std::time::Instant;

use crate::bridge::{self, RenderTexture, SourceTexture};
use crate::compositor::{CompositeParams, Compositor};
use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::lifecycle::{ResourceLifecycle, TickOutcome};
use crate::mask::{MaskParams, MaskPostProcessor};
use crate::metrics::FrameMetrics;
use crate::properties::{self, Property};
use crate::segmentation::{SegmentationAdapter, SegmentationProvider};

/// Log performance every this many processed frames when enabled.
const PERFORMANCE_LOG_INTERVAL: u64 = 30;

/// What the host should draw for this frame.
pub enum RenderOutput<'a> {
    /// The processed frame.
    Processed(&'a RenderTexture),
    /// Draw the upstream source unmodified.
    Passthrough,
}

impl RenderOutput<'_> {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, RenderOutput::Passthrough)
    }
}

/// Lifecycle hooks a host media application drives.
///
/// `create` and `destroy` map to construction and `Drop` of the implementor.
pub trait VideoFilter {
    fn name() -> &'static str
    where
        Self: Sized;

    fn default_config() -> FilterConfig
    where
        Self: Sized;

    fn describe_properties() -> Vec<Property>
    where
        Self: Sized;

    fn update_config(&mut self, config: FilterConfig);

    /// Dimension and resource check. Always precedes `on_render` in a frame.
    fn on_tick(&mut self, target_width: u32, target_height: u32);

    fn on_render(&mut self, source: &dyn SourceTexture) -> RenderOutput<'_>;
}

/// Counts consecutive failures so only the first of a streak logs loudly.
#[derive(Debug, Default)]
struct FailureStreak {
    count: u64,
}

impl FailureStreak {
    fn record(&mut self, err: &FilterError) {
        self.count += 1;
        if self.count == 1 {
            tracing::warn!(kind = err.kind(), "Skipping frame: {}", err);
        } else {
            tracing::debug!(kind = err.kind(), streak = self.count, "Skipping frame: {}", err);
        }
    }

    fn recover(&mut self) {
        if self.count > 0 {
            tracing::info!("Processing recovered after {} skipped frame(s)", self.count);
            self.count = 0;
        }
    }
}

/// Background removal filter for one video stream.
pub struct BackgroundRemovalFilter {
    config: FilterConfig,
    mask_params: MaskParams,
    composite_params: CompositeParams,
    lifecycle: ResourceLifecycle,
    segmenter: SegmentationAdapter,
    post: MaskPostProcessor,
    compositor: Compositor,
    metrics: FrameMetrics,
    failures: FailureStreak,
}

impl BackgroundRemovalFilter {
    pub fn create(config: FilterConfig, provider: Box<dyn SegmentationProvider>) -> Self {
        let config = config.sanitize();
        let segmenter = SegmentationAdapter::new(provider, config.quality);
        let background_image = config.background_image.clone();
        let mut filter = Self {
            mask_params: MaskParams::from(&config),
            composite_params: composite_params(&config),
            config,
            lifecycle: ResourceLifecycle::new(),
            segmenter,
            post: MaskPostProcessor::new(),
            compositor: Compositor::new(),
            metrics: FrameMetrics::new(),
            failures: FailureStreak::default(),
        };
        filter.load_background_image(background_image.as_deref());
        filter
    }

    /// Tear the instance down, releasing every sized resource.
    pub fn destroy(mut self) {
        self.lifecycle.release();
        tracing::info!("Filter destroyed after {} processed frame(s)", self.metrics.frame_count());
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn metrics(&self) -> &FrameMetrics {
        &self.metrics
    }

    pub fn lifecycle(&self) -> &ResourceLifecycle {
        &self.lifecycle
    }

    pub fn mask_state(&self) -> &MaskPostProcessor {
        &self.post
    }

    /// Drop all temporal state and metrics; resources are kept.
    pub fn reset(&mut self) {
        self.segmenter.reset();
        self.post.invalidate();
        self.metrics.reset();
    }

    fn load_background_image(&mut self, path: Option<&Path>) {
        let image = path.and_then(|path| match image::open(path) {
            Ok(image) => {
                tracing::info!("Loaded background image {}", path.display());
                Some(image.to_rgba8())
            }
            Err(e) => {
                tracing::warn!("Failed to load background image {}: {}", path.display(), e);
                None
            }
        });
        self.compositor.set_background_image(image);
    }

    /// One frame through capture, segmentation, post-processing, compositing
    /// and writeback. Pooled buffers are released on every return path.
    fn process_frame(&mut self, source: &dyn SourceTexture) -> Result<()> {
        let Some(resources) = self.lifecycle.ready_mut() else {
            return Err(FilterError::Capture("resources not ready".to_string()));
        };

        let frame = bridge::capture(source, &mut resources.staging, &resources.pool)?;

        let started = Instant::now();
        let raw = self.segmenter.segment(&frame.view())?;
        let mask = self.post.process(raw, frame.width(), frame.height(), &self.mask_params);

        let mut output = resources
            .pool
            .acquire()
            .ok_or_else(|| FilterError::Composite("no output buffer available".to_string()))?;
        self.compositor
            .composite(&frame, &mask, &self.composite_params, &mut output)?;
        self.metrics.record(started.elapsed());

        bridge::writeback(&output, &mut resources.render_target)?;
        self.post.commit(mask);
        Ok(())
    }

    fn log_performance(&self) {
        let count = self.metrics.frame_count();
        if self.config.performance_info && count > 0 && count % PERFORMANCE_LOG_INTERVAL == 0 {
            tracing::info!(
                "Frame {}: last={:.1}ms, avg={:.1}ms",
                count,
                self.metrics.last_ms(),
                self.metrics.average_ms()
            );
        }
    }
}

impl VideoFilter for BackgroundRemovalFilter {
    fn name() -> &'static str {
        "Background Removal"
    }

    fn default_config() -> FilterConfig {
        FilterConfig::default()
    }

    fn describe_properties() -> Vec<Property> {
        properties::describe_properties()
    }

    fn update_config(&mut self, config: FilterConfig) {
        let config = config.sanitize();

        if config.enabled && !self.config.enabled {
            tracing::debug!("Filter re-enabled, dropping temporal state");
            self.segmenter.reset();
            self.post.invalidate();
        }
        self.segmenter.set_quality(config.quality);
        if config.background_image != self.config.background_image {
            self.load_background_image(config.background_image.as_deref());
        }

        self.mask_params = MaskParams::from(&config);
        self.composite_params = composite_params(&config);
        self.config = config;
    }

    fn on_tick(&mut self, target_width: u32, target_height: u32) {
        match self.lifecycle.tick(target_width, target_height) {
            TickOutcome::Recreated(generation) => {
                tracing::debug!("Resolution now {}x{}, clearing temporal state", generation.width, generation.height);
                self.post.invalidate();
                self.compositor.invalidate();
            }
            TickOutcome::NotReady | TickOutcome::Unchanged | TickOutcome::AllocationFailed => {}
        }
    }

    fn on_render(&mut self, source: &dyn SourceTexture) -> RenderOutput<'_> {
        if !self.config.enabled {
            return RenderOutput::Passthrough;
        }
        if self.lifecycle.ready().is_none() {
            tracing::trace!("Target not ready, passing through");
            return RenderOutput::Passthrough;
        }

        if let Err(e) = self.process_frame(source) {
            self.failures.record(&e);
            return RenderOutput::Passthrough;
        }
        self.failures.recover();
        self.log_performance();

        match self.lifecycle.ready() {
            Some(resources) => RenderOutput::Processed(&resources.render_target),
            None => RenderOutput::Passthrough,
        }
    }
}

impl Drop for BackgroundRemovalFilter {
    fn drop(&mut self) {
        self.lifecycle.release();
    }
}

fn composite_params(config: &FilterConfig) -> CompositeParams {
    CompositeParams {
        mode: config.background_mode,
        blur_radius: config.blur_radius,
        color: config.background_bgra(),
        show_mask: config.show_mask,
    }
}
