//! Moves frames between the host's render side and pooled CPU buffers.
//!
//! Capture: source texture -> staging surface -> pooled buffer.
//! Writeback: pooled buffer -> render texture handed back to the host.
//! Both are skip-don't-block: any failure drops the frame, nothing retries.

use image::RgbImage;

use crate::error::{FilterError, Result};
use crate::frame::{aligned_stride, copy_rows, FrameView, Generation, BYTES_PER_PIXEL};
use crate::pool::{BufferPool, PooledBuffer};

/// Mapped rows of a source texture.
pub struct StagedFrame<'a> {
    pub data: &'a [u8],
    pub stride: usize,
}

/// Upstream render target for the current frame.
pub trait SourceTexture {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Map the texture for CPU reads. `None` if it cannot be staged this frame.
    fn stage(&self) -> Option<StagedFrame<'_>>;
}

/// A BGRA texture living in CPU memory.
///
/// Used by the webcam host and by tests as the upstream source.
#[derive(Debug, Clone)]
pub struct CpuTexture {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl CpuTexture {
    /// Wrap BGRA rows with the given stride. `None` if `data` is too short.
    pub fn from_bgra(width: u32, height: u32, stride: usize, data: Vec<u8>) -> Option<Self> {
        if stride < width as usize * BYTES_PER_PIXEL || data.len() < stride * height as usize {
            return None;
        }
        Some(Self { width, height, stride, data })
    }

    /// Uniform texture of one BGRA color.
    pub fn filled(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let data = bgra.repeat(width as usize * height as usize);
        Self {
            width,
            height,
            stride: width as usize * BYTES_PER_PIXEL,
            data,
        }
    }

    /// Swizzle a decoded RGB camera frame into opaque BGRA.
    pub fn from_rgb_image(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let mut data = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
        for pixel in image.pixels() {
            data.extend_from_slice(&[pixel[2], pixel[1], pixel[0], 255]);
        }
        Self {
            width,
            height,
            stride: width as usize * BYTES_PER_PIXEL,
            data,
        }
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            width: self.width,
            height: self.height,
            stride: self.stride,
            data: &self.data,
        }
    }
}

impl SourceTexture for CpuTexture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn stage(&self) -> Option<StagedFrame<'_>> {
        Some(StagedFrame {
            data: &self.data,
            stride: self.stride,
        })
    }
}

/// Generation-sized BGRA surface with aligned rows.
#[derive(Debug)]
pub struct Surface {
    generation: Generation,
    stride: usize,
    data: Vec<u8>,
}

impl Surface {
    pub(crate) fn allocate(generation: Generation) -> Result<Self> {
        let stride = aligned_stride(generation.width);
        let len = stride
            .checked_mul(generation.height as usize)
            .ok_or_else(|| FilterError::Allocation("surface size overflows".to_string()))?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| FilterError::Allocation(format!("{} byte surface: {}", len, e)))?;
        data.resize(len, 0);
        Ok(Self { generation, stride, data })
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn width(&self) -> u32 {
        self.generation.width
    }

    pub fn height(&self) -> u32 {
        self.generation.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            width: self.generation.width,
            height: self.generation.height,
            stride: self.stride,
            data: &self.data,
        }
    }
}

/// CPU-readable copy of the upstream frame.
pub type StagingSurface = Surface;

/// Output texture handed to the host after a processed frame.
pub type RenderTexture = Surface;

/// Stage `source` and copy it into a freshly acquired pooled buffer.
pub fn capture(
    source: &dyn SourceTexture,
    staging: &mut StagingSurface,
    pool: &BufferPool,
) -> Result<PooledBuffer> {
    let (width, height) = staging.generation.dimensions();
    if source.width() != width || source.height() != height {
        return Err(FilterError::Capture(format!(
            "source is {}x{}, resources are {}x{}",
            source.width(),
            source.height(),
            width,
            height
        )));
    }

    let staged = source
        .stage()
        .ok_or_else(|| FilterError::Capture("render target cannot be staged".to_string()))?;
    let min_len = (height as usize - 1) * staged.stride + width as usize * BYTES_PER_PIXEL;
    if staged.stride < width as usize * BYTES_PER_PIXEL || staged.data.len() < min_len {
        return Err(FilterError::Capture(format!(
            "staged frame too small: {} bytes, stride {}",
            staged.data.len(),
            staged.stride
        )));
    }
    copy_rows(staged.data, staged.stride, &mut staging.data, staging.stride, height as usize);

    let mut buffer = pool
        .acquire()
        .ok_or_else(|| FilterError::Capture("no pooled buffer available".to_string()))?;
    if buffer.generation() != staging.generation {
        return Err(FilterError::Capture("pool and staging surface disagree on generation".to_string()));
    }
    let dst_stride = buffer.stride();
    copy_rows(&staging.data, staging.stride, buffer.as_bytes_mut(), dst_stride, height as usize);
    Ok(buffer)
}

/// Copy a processed buffer into the render texture.
pub fn writeback(buffer: &PooledBuffer, target: &mut RenderTexture) -> Result<()> {
    if buffer.generation() != target.generation {
        return Err(FilterError::Writeback(format!(
            "buffer epoch {} does not match render target epoch {}",
            buffer.generation().epoch,
            target.generation.epoch
        )));
    }
    let rows = target.generation.height as usize;
    let target_stride = target.stride;
    copy_rows(buffer.as_bytes(), buffer.stride(), &mut target.data, target_stride, rows);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unmappable;

    impl SourceTexture for Unmappable {
        fn width(&self) -> u32 {
            4
        }

        fn height(&self) -> u32 {
            2
        }

        fn stage(&self) -> Option<StagedFrame<'_>> {
            None
        }
    }

    fn generation() -> Generation {
        Generation { epoch: 7, width: 4, height: 2 }
    }

    #[test]
    fn capture_then_writeback_preserves_pixels() {
        let generation = generation();
        let pool = BufferPool::create(generation, 3).unwrap();
        let mut staging = StagingSurface::allocate(generation).unwrap();
        let mut target = RenderTexture::allocate(generation).unwrap();

        // Tight source rows (16 bytes) against 64 byte aligned destinations.
        let data: Vec<u8> = (0..32).collect();
        let source = CpuTexture::from_bgra(4, 2, 16, data).unwrap();

        let buffer = capture(&source, &mut staging, &pool).unwrap();
        assert_eq!(buffer.view().pixel(3, 1), [28, 29, 30, 31]);
        writeback(&buffer, &mut target).unwrap();
        assert_eq!(target.view().to_packed(), source.view().to_packed());
    }

    #[test]
    fn capture_fails_when_staging_is_impossible() {
        let generation = generation();
        let pool = BufferPool::create(generation, 3).unwrap();
        let mut staging = StagingSurface::allocate(generation).unwrap();
        let err = capture(&Unmappable, &mut staging, &pool).err().unwrap();
        assert!(matches!(err, FilterError::Capture(_)));
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn capture_fails_when_pool_is_exhausted() {
        let generation = generation();
        let pool = BufferPool::create(generation, 3).unwrap();
        let mut staging = StagingSurface::allocate(generation).unwrap();
        let held: Vec<_> = (0..3).filter_map(|_| pool.acquire()).collect();
        let source = CpuTexture::filled(4, 2, [1, 2, 3, 4]);
        assert!(capture(&source, &mut staging, &pool).is_err());
        drop(held);
        assert!(capture(&source, &mut staging, &pool).is_ok());
    }

    #[test]
    fn capture_rejects_mismatched_source() {
        let generation = generation();
        let pool = BufferPool::create(generation, 3).unwrap();
        let mut staging = StagingSurface::allocate(generation).unwrap();
        let source = CpuTexture::filled(8, 2, [0, 0, 0, 255]);
        assert!(capture(&source, &mut staging, &pool).is_err());
    }

    #[test]
    fn writeback_rejects_stale_generation() {
        let old = generation();
        let new = Generation { epoch: 8, ..old };
        let pool = BufferPool::create(old, 3).unwrap();
        let mut target = RenderTexture::allocate(new).unwrap();
        let buffer = pool.acquire().unwrap();
        let err = writeback(&buffer, &mut target).err().unwrap();
        assert!(matches!(err, FilterError::Writeback(_)));
    }
}
