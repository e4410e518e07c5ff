use super::OutputSink;
use anyhow::{Context, Result};
use bgremoval::FrameView;
use image::{imageops, RgbImage};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        // Announce the frame format so readers of the loopback device agree on it
        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let format = Format::new(width, height, FourCC::new(b"YUYV"));
        let applied = Output::set_format(&device, &format)
            .context("Failed to set YUYV output format")?;
        if applied.width != width || applied.height != height {
            anyhow::bail!(
                "Device accepted {}x{} instead of {}x{}",
                applied.width,
                applied.height,
                width,
                height
            );
        }

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            file,
            width,
            height,
        })
    }

    /// Drop alpha and swizzle BGRA rows into a packed RGB image
    fn bgra_to_rgb(frame: &FrameView<'_>) -> RgbImage {
        let mut rgb = RgbImage::new(frame.width, frame.height);
        for (x, y, pixel) in rgb.enumerate_pixels_mut() {
            let [b, g, r, _] = frame.pixel(x, y);
            *pixel = image::Rgb([r, g, b]);
        }
        rgb
    }

    /// Convert RGB frame to YUV422 (YUYV) format
    /// v4l2loopback typically expects YUYV format
    fn rgb_to_yuyv(rgb_image: &RgbImage) -> Vec<u8> {
        let (width, height) = rgb_image.dimensions();
        let mut yuyv = Vec::with_capacity((width * height * 2) as usize);

        for y in 0..height {
            for x in (0..width).step_by(2) {
                let pixel1 = rgb_image.get_pixel(x, y);
                let pixel2 = if x + 1 < width {
                    rgb_image.get_pixel(x + 1, y)
                } else {
                    pixel1
                };

                let (y1, u1, v1) = rgb_to_yuv(pixel1[0], pixel1[1], pixel1[2]);
                let (y2, u2, v2) = rgb_to_yuv(pixel2[0], pixel2[1], pixel2[2]);

                // Average U and V for the pair of pixels
                let u = ((u1 as u16 + u2 as u16) / 2) as u8;
                let v = ((v1 as u16 + v2 as u16) / 2) as u8;

                // YUYV format: Y0 U Y1 V
                yuyv.extend_from_slice(&[y1, u, y2, v]);
            }
        }

        yuyv
    }
}

/// Convert RGB to YUV color space (BT.601)
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &FrameView<'_>) -> Result<()> {
        let rgb = Self::bgra_to_rgb(frame);

        // Resize frame if needed
        let rgb = if rgb.dimensions() != (self.width, self.height) {
            imageops::resize(&rgb, self.width, self.height, imageops::FilterType::Triangle)
        } else {
            rgb
        };

        let yuyv_data = Self::rgb_to_yuyv(&rgb);

        self.file
            .write_all(&yuyv_data)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
