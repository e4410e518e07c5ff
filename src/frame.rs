//! Pixel layout shared by every sized resource.
//!
//! Frames are 32-bit interleaved BGRA. Rows may be padded, so every buffer
//! carries its own stride and readers never assume `width * 4`.

/// Bytes per BGRA pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Row alignment used for pooled buffers and staging surfaces
pub const ROW_ALIGNMENT: usize = 64;

/// Largest edge the platform will allocate a surface for
pub const MAX_SURFACE_DIMENSION: u32 = 16384;

/// Row stride for a BGRA surface of the given width, padded to [`ROW_ALIGNMENT`].
pub fn aligned_stride(width: u32) -> usize {
    let tight = width as usize * BYTES_PER_PIXEL;
    tight.div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT
}

/// The (width, height) epoch that all live sized resources belong to.
///
/// `epoch` increases on every successful recreation, so two generations with
/// the same dimensions are still distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    pub epoch: u64,
    pub width: u32,
    pub height: u32,
}

impl Generation {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Borrowed BGRA frame with explicit row stride.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub data: &'a [u8],
}

impl<'a> FrameView<'a> {
    /// Visible bytes of row `y`, without padding.
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * BYTES_PER_PIXEL]
    }

    /// BGRA bytes of the pixel at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = y as usize * self.stride + x as usize * BYTES_PER_PIXEL;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Copy the visible pixels into a tightly packed vector.
    pub fn to_packed(&self) -> Vec<u8> {
        let mut packed = Vec::with_capacity(self.width as usize * self.height as usize * BYTES_PER_PIXEL);
        for y in 0..self.height {
            packed.extend_from_slice(self.row(y));
        }
        packed
    }
}

/// Copy `rows` rows between buffers of possibly different strides.
///
/// Each row copies the lesser of the two strides, so padding on either side
/// is never read past or written past. A final row shorter than its stride
/// (common for mapped surfaces) is copied up to its actual length.
pub fn copy_rows(src: &[u8], src_stride: usize, dst: &mut [u8], dst_stride: usize, rows: usize) {
    let row_bytes = src_stride.min(dst_stride);
    for row in 0..rows {
        let s = row * src_stride;
        let d = row * dst_stride;
        if s >= src.len() || d >= dst.len() {
            break;
        }
        let n = row_bytes.min(src.len() - s).min(dst.len() - d);
        dst[d..d + n].copy_from_slice(&src[s..s + n]);
    }
}
