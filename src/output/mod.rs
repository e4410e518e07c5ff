mod loopback;

pub use loopback::V4L2Output;

use anyhow::Result;
use bgremoval::FrameView;

/// Trait for output destinations
pub trait OutputSink {
    /// Write a BGRA frame to the output
    fn write_frame(&mut self, frame: &FrameView<'_>) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);
}
