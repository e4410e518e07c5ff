//! Real-time background removal for a single video stream.
//!
//! A host drives [`BackgroundRemovalFilter`] once per frame: `on_tick` keeps
//! sized resources matched to the target resolution, `on_render` captures the
//! frame, asks a [`SegmentationProvider`] for a foreground mask, cleans the
//! mask up and composites the subject over the configured background.
//! Failures never escape a frame; they show up as pass-through output.

pub mod bridge;
pub mod compositor;
pub mod config;
pub mod error;
pub mod filter;
pub mod frame;
pub mod lifecycle;
pub mod mask;
pub mod metrics;
pub mod pool;
pub mod properties;
pub mod segmentation;

pub use bridge::{CpuTexture, RenderTexture, SourceTexture, StagedFrame};
pub use config::{BackgroundMode, FilterConfig, Quality};
pub use error::{FilterError, Result};
pub use filter::{BackgroundRemovalFilter, RenderOutput, VideoFilter};
pub use frame::{FrameView, Generation};
pub use metrics::FrameMetrics;
pub use segmentation::{Matte, SegmentationProvider};
