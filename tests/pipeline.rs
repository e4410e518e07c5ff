use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use bgremoval::{
    BackgroundMode, BackgroundRemovalFilter, CpuTexture, FilterConfig, FrameView, Matte, RenderOutput,
    SegmentationProvider, SourceTexture, StagedFrame, VideoFilter,
};

/// What the fake provider does on its next call.
#[derive(Clone)]
enum Script {
    /// Mask of constant value at the given size
    Mask(u32, u32, f32),
    Fail,
    Empty,
}

#[derive(Default)]
struct CallLog {
    calls: AtomicUsize,
    resets: AtomicUsize,
    last_frame_size: Mutex<Option<(u32, u32)>>,
}

/// Deterministic stand-in for a segmentation model.
struct FakeProvider {
    script: Arc<Mutex<Script>>,
    log: Arc<CallLog>,
}

impl SegmentationProvider for FakeProvider {
    fn segment(&mut self, frame: &FrameView<'_>) -> anyhow::Result<Matte> {
        self.log.calls.fetch_add(1, Ordering::SeqCst);
        *self.log.last_frame_size.lock().unwrap() = Some((frame.width, frame.height));
        match self.script.lock().unwrap().clone() {
            Script::Mask(w, h, v) => Ok(Matte::filled(w, h, v)),
            Script::Fail => Err(anyhow!("injected failure")),
            Script::Empty => Ok(Matte::filled(0, 0, 0.0)),
        }
    }

    fn reset_state(&mut self) {
        self.log.resets.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    filter: BackgroundRemovalFilter,
    script: Arc<Mutex<Script>>,
    log: Arc<CallLog>,
}

impl Harness {
    fn new(config: FilterConfig, script: Script) -> Self {
        let script = Arc::new(Mutex::new(script));
        let log = Arc::new(CallLog::default());
        let provider = FakeProvider {
            script: Arc::clone(&script),
            log: Arc::clone(&log),
        };
        Self {
            filter: BackgroundRemovalFilter::create(config, Box::new(provider)),
            script,
            log,
        }
    }

    fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    /// One host frame cycle: tick, then render. Returns the packed output,
    /// or `None` on pass-through.
    fn frame(&mut self, source: &dyn SourceTexture) -> Option<Vec<u8>> {
        self.filter.on_tick(source.width(), source.height());
        match self.filter.on_render(source) {
            RenderOutput::Processed(texture) => Some(texture.view().to_packed()),
            RenderOutput::Passthrough => None,
        }
    }

    fn outstanding(&self) -> usize {
        self.filter
            .lifecycle()
            .ready()
            .map(|r| r.pool.outstanding())
            .unwrap_or(0)
    }
}

fn config(mode: BackgroundMode) -> FilterConfig {
    FilterConfig {
        background_mode: mode,
        edge_smoothing: 0.0,
        ..FilterConfig::default()
    }
}

/// Source whose staging can be switched off to simulate GPU readback failure.
struct FlakySource {
    inner: CpuTexture,
    stageable: bool,
}

impl SourceTexture for FlakySource {
    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
    }

    fn stage(&self) -> Option<StagedFrame<'_>> {
        if self.stageable {
            self.inner.stage()
        } else {
            None
        }
    }
}

#[test]
fn solid_color_mode_with_empty_mask_is_uniform_red() {
    let mut config = config(BackgroundMode::Color);
    config.background_color = 0xFF0000;
    let mut harness = Harness::new(config, Script::Mask(16, 12, 0.0));

    let source = CpuTexture::filled(32, 24, [10, 200, 30, 255]);
    let output = harness.frame(&source).expect("frame should be processed");
    assert_eq!(output.len(), 32 * 24 * 4);
    assert!(output.chunks_exact(4).all(|px| px == [0, 0, 255, 255]));
}

#[test]
fn transparent_mode_with_full_mask_reproduces_input() {
    let mut harness = Harness::new(config(BackgroundMode::Transparent), Script::Mask(8, 8, 1.0));
    let data: Vec<u8> = (0..20 * 10 * 4).map(|i| (i % 251) as u8).collect();
    let source = CpuTexture::from_bgra(20, 10, 80, data).unwrap();

    let output = harness.frame(&source).expect("frame should be processed");
    assert_eq!(output, source.view().to_packed());
}

#[test]
fn segmentation_failure_burst_passes_through() {
    let mut harness = Harness::new(config(BackgroundMode::Blur), Script::Mask(16, 16, 0.7));
    let source = CpuTexture::filled(16, 16, [50, 60, 70, 255]);

    assert!(harness.frame(&source).is_some());
    let before = harness.filter.mask_state().previous().cloned();
    assert!(before.is_some());

    harness.set_script(Script::Fail);
    for _ in 0..10 {
        assert!(harness.frame(&source).is_none());
        assert_eq!(harness.outstanding(), 0);
    }
    assert_eq!(harness.filter.mask_state().previous().cloned(), before);
    assert_eq!(harness.filter.metrics().frame_count(), 1);

    harness.set_script(Script::Mask(16, 16, 0.7));
    assert!(harness.frame(&source).is_some());
    assert_eq!(harness.outstanding(), 0);
}

#[test]
fn empty_mask_is_treated_as_failure() {
    let mut harness = Harness::new(config(BackgroundMode::Blur), Script::Empty);
    let source = CpuTexture::filled(8, 8, [1, 2, 3, 255]);
    assert!(harness.frame(&source).is_none());
    assert!(harness.filter.mask_state().previous().is_none());
    assert_eq!(harness.outstanding(), 0);
}

#[test]
fn resolution_ramp_recreates_once_and_clears_temporal_state() {
    let mut harness = Harness::new(config(BackgroundMode::Color), Script::Mask(64, 48, 1.0));
    let small = CpuTexture::filled(640, 480, [1, 1, 1, 255]);
    let large = CpuTexture::filled(1920, 1080, [2, 2, 2, 255]);

    for _ in 0..3 {
        assert!(harness.frame(&small).is_some());
    }
    assert_eq!(harness.filter.lifecycle().recreations(), 1);
    assert_eq!(harness.filter.mask_state().previous().unwrap().dimensions(), (640, 480));

    // Tick alone switches generation and drops the 640x480 history.
    harness.filter.on_tick(1920, 1080);
    assert_eq!(harness.filter.lifecycle().recreations(), 2);
    assert!(harness.filter.mask_state().previous().is_none());

    match harness.filter.on_render(&large) {
        RenderOutput::Processed(texture) => {
            assert_eq!((texture.width(), texture.height()), (1920, 1080));
            assert_eq!(texture.generation().epoch, 2);
        }
        RenderOutput::Passthrough => panic!("frame after resize should be processed"),
    }
    for _ in 0..2 {
        assert!(harness.frame(&large).is_some());
    }
    assert_eq!(harness.filter.lifecycle().recreations(), 2);
    assert_eq!(*harness.log.last_frame_size.lock().unwrap(), Some((1920, 1080)));
    assert_eq!(harness.filter.mask_state().previous().unwrap().dimensions(), (1920, 1080));

    let resources = harness.filter.lifecycle().ready().unwrap();
    assert_eq!(resources.pool.generation(), resources.generation);
    assert_eq!(resources.pool.outstanding(), 0);
}

#[test]
fn source_that_disagrees_with_tick_is_skipped() {
    let mut harness = Harness::new(config(BackgroundMode::Blur), Script::Mask(4, 4, 1.0));
    harness.filter.on_tick(32, 32);
    let wrong = CpuTexture::filled(16, 16, [0, 0, 0, 255]);
    assert!(harness.filter.on_render(&wrong).is_passthrough());
    assert_eq!(harness.log.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn zero_sized_target_passes_through() {
    let mut harness = Harness::new(config(BackgroundMode::Blur), Script::Mask(4, 4, 1.0));
    let source = CpuTexture::filled(16, 16, [0, 0, 0, 255]);
    assert!(harness.frame(&source).is_some());

    harness.filter.on_tick(0, 0);
    assert!(harness.filter.on_render(&source).is_passthrough());
    assert_eq!(harness.filter.lifecycle().recreations(), 1);
}

#[test]
fn capture_failure_skips_without_segmenting() {
    let mut harness = Harness::new(config(BackgroundMode::Blur), Script::Mask(4, 4, 1.0));
    let mut source = FlakySource {
        inner: CpuTexture::filled(16, 16, [9, 9, 9, 255]),
        stageable: false,
    };
    assert!(harness.frame(&source).is_none());
    assert_eq!(harness.log.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.outstanding(), 0);

    source.stageable = true;
    assert!(harness.frame(&source).is_some());
}

#[test]
fn disabled_filter_passes_through_and_reenable_resets() {
    let mut harness = Harness::new(config(BackgroundMode::Blur), Script::Mask(4, 4, 1.0));
    let source = CpuTexture::filled(16, 16, [9, 9, 9, 255]);
    assert!(harness.frame(&source).is_some());

    let mut disabled = harness.filter.config().clone();
    disabled.enabled = false;
    harness.filter.update_config(disabled.clone());
    assert!(harness.frame(&source).is_none());
    assert_eq!(harness.log.calls.load(Ordering::SeqCst), 1);

    disabled.enabled = true;
    harness.filter.update_config(disabled);
    assert_eq!(harness.log.resets.load(Ordering::SeqCst), 1);
    assert!(harness.filter.mask_state().previous().is_none());
    assert!(harness.frame(&source).is_some());
}

#[test]
fn temporal_smoothing_blends_successive_frames() {
    let mut config = config(BackgroundMode::Color);
    config.background_color = 0x000000;
    config.temporal_factor = 0.5;
    let mut harness = Harness::new(config, Script::Mask(4, 4, 1.0));
    let source = CpuTexture::filled(4, 4, [200, 200, 200, 255]);

    assert!(harness.frame(&source).is_some());
    harness.set_script(Script::Mask(4, 4, 0.0));
    let output = harness.frame(&source).unwrap();
    // Half of 200 over black.
    assert!(output.chunks_exact(4).all(|px| px[..3] == [100, 100, 100]));
}

#[test]
fn metrics_count_processed_frames_only() {
    let mut harness = Harness::new(config(BackgroundMode::Transparent), Script::Mask(4, 4, 1.0));
    let source = CpuTexture::filled(8, 8, [0, 0, 0, 255]);
    for _ in 0..4 {
        harness.frame(&source);
    }
    harness.set_script(Script::Fail);
    harness.frame(&source);
    let metrics = harness.filter.metrics();
    assert_eq!(metrics.frame_count(), 4);
    assert!(metrics.average() <= metrics.total());

    harness.filter.reset();
    assert_eq!(harness.filter.metrics().frame_count(), 0);
}

#[test]
fn property_schema_and_defaults_are_exposed() {
    let defaults = BackgroundRemovalFilter::default_config();
    assert!(defaults.enabled);
    assert_eq!(defaults.blur_radius, 20);
    assert_eq!(defaults.background_color, 0x00FF00);
    let properties = BackgroundRemovalFilter::describe_properties();
    assert!(properties.iter().any(|p| p.key == "temporal_factor"));
}

#[test]
fn missing_background_image_falls_back_to_blur() {
    let mut config = config(BackgroundMode::Image);
    config.background_image = Some("/nonexistent/background.png".into());
    let mut image_harness = Harness::new(config, Script::Mask(4, 4, 0.0));
    let mut blur_harness = Harness::new(self::config(BackgroundMode::Blur), Script::Mask(4, 4, 0.0));

    let data: Vec<u8> = (0..16 * 16 * 4).map(|i| (i * 7 % 256) as u8).collect();
    let source = CpuTexture::from_bgra(16, 16, 64, data).unwrap();
    let from_image_mode = image_harness.frame(&source).unwrap();
    let from_blur_mode = blur_harness.frame(&source).unwrap();
    assert_eq!(from_image_mode, from_blur_mode);
}

#[test]
fn raised_threshold_pushes_confident_foreground_toward_source() {
    let mut config = config(BackgroundMode::Color);
    config.background_color = 0x000000;
    config.mask_threshold = 0.7;
    let mut harness = Harness::new(config, Script::Mask(8, 8, 0.8));
    let source = CpuTexture::filled(8, 8, [200, 200, 200, 255]);

    let output = harness.frame(&source).expect("frame should be processed");
    // An unthresholded 0.8 mask over black would give 160.
    assert!(
        output.chunks_exact(4).all(|px| px[..3].iter().all(|&c| c > 176)),
        "first pixel {:?}",
        &output[..4]
    );
    let committed = harness.filter.mask_state().previous().unwrap();
    assert!(committed.values().iter().all(|&v| v > 0.9));
}

#[test]
fn exhausted_output_pool_passes_through_and_keeps_temporal_state() {
    let mut harness = Harness::new(config(BackgroundMode::Blur), Script::Mask(8, 8, 0.6));
    let source = CpuTexture::filled(16, 16, [40, 80, 120, 255]);
    assert!(harness.frame(&source).is_some());
    let before = harness.filter.mask_state().previous().cloned();
    assert!(before.is_some());

    // Capture takes the last free buffer, so the output acquire fails.
    let held: Vec<_> = {
        let pool = &harness.filter.lifecycle().ready().unwrap().pool;
        (0..pool.capacity() - 1).filter_map(|_| pool.acquire()).collect()
    };
    assert_eq!(harness.outstanding(), held.len());

    harness.set_script(Script::Mask(8, 8, 0.2));
    assert!(harness.frame(&source).is_none());
    assert_eq!(harness.outstanding(), held.len());
    assert_eq!(harness.filter.mask_state().previous().cloned(), before);
    assert_eq!(harness.filter.metrics().frame_count(), 1);

    drop(held);
    assert_eq!(harness.outstanding(), 0);
    assert!(harness.frame(&source).is_some());
    assert_eq!(harness.filter.metrics().frame_count(), 2);
}
