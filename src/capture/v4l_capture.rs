use super::CaptureSource;
use anyhow::{Context, Result};
use bgremoval::CpuTexture;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    pub fn new(device_index: u32, width: u32, height: u32, fps: u32) -> Result<Self> {
        tracing::info!(
            "Initializing webcam {} at {}x{}@{}",
            device_index,
            width,
            height,
            fps
        );

        let index = CameraIndex::Index(device_index);
        let format = CameraFormat::new(Resolution::new(width, height), FrameFormat::YUYV, fps);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let mut camera = Camera::new(index, requested)
            .context("Failed to open camera")?;

        camera.open_stream()
            .context("Failed to open camera stream")?;

        let actual = camera.resolution();
        tracing::info!(
            "Webcam initialized at {}x{}",
            actual.width(),
            actual.height()
        );

        Ok(Self {
            camera,
            width,
            height,
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<CpuTexture> {
        let frame = self
            .camera
            .frame()
            .context("Failed to capture frame")?;

        let decoded = frame.decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        // The camera may deliver a different size than requested; the
        // filter follows whatever arrives.
        Ok(CpuTexture::from_rgb_image(&decoded))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
