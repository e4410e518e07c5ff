mod v4l_capture;

pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use bgremoval::CpuTexture;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single frame as an opaque BGRA texture
    fn capture_frame(&mut self) -> Result<CpuTexture>;

    /// Get the requested resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}
