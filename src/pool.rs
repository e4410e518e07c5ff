//! Fixed-capacity pool of BGRA buffers for one resource generation.
//!
//! A pool is never resized. On a dimension change the owner destroys it and
//! creates a new one; buffers still in flight keep the old pool's shared
//! state alive and are freed when dropped, never handed out again.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

use crate::error::{FilterError, Result};
use crate::frame::{aligned_stride, FrameView, Generation, BYTES_PER_PIXEL, MAX_SURFACE_DIMENSION};

/// Capture, segmentation output and composite output must never wait on each other.
pub const MIN_POOL_CAPACITY: usize = 3;

struct PoolShared {
    generation: Generation,
    stride: usize,
    capacity: usize,
    free: ArrayQueue<Vec<u8>>,
    outstanding: AtomicUsize,
}

pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    /// Allocate `capacity` buffers (at least [`MIN_POOL_CAPACITY`]) up front.
    pub fn create(generation: Generation, capacity: usize) -> Result<Self> {
        let (width, height) = generation.dimensions();
        if width == 0 || height == 0 {
            return Err(FilterError::Allocation(format!("empty surface {}x{}", width, height)));
        }
        if width > MAX_SURFACE_DIMENSION || height > MAX_SURFACE_DIMENSION {
            return Err(FilterError::Allocation(format!(
                "{}x{} exceeds the {} pixel surface limit",
                width, height, MAX_SURFACE_DIMENSION
            )));
        }

        let capacity = capacity.max(MIN_POOL_CAPACITY);
        let stride = aligned_stride(width);
        let len = stride
            .checked_mul(height as usize)
            .ok_or_else(|| FilterError::Allocation(format!("{}x{} overflows", width, height)))?;

        let free = ArrayQueue::new(capacity);
        for _ in 0..capacity {
            let mut buffer = Vec::new();
            buffer
                .try_reserve_exact(len)
                .map_err(|e| FilterError::Allocation(format!("{} byte buffer: {}", len, e)))?;
            buffer.resize(len, 0);
            // Queue was sized for exactly `capacity` entries.
            let _ = free.push(buffer);
        }

        tracing::debug!(
            "Created buffer pool {}x{} (epoch {}), {} buffers, stride {}",
            width,
            height,
            generation.epoch,
            capacity,
            stride
        );

        Ok(Self {
            shared: Arc::new(PoolShared {
                generation,
                stride,
                capacity,
                free,
                outstanding: AtomicUsize::new(0),
            }),
        })
    }

    /// Take a buffer, or `None` if every buffer is in flight.
    pub fn acquire(&self) -> Option<PooledBuffer> {
        let data = self.shared.free.pop()?;
        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        Some(PooledBuffer {
            data,
            shared: Arc::clone(&self.shared),
        })
    }

    pub fn generation(&self) -> Generation {
        self.shared.generation
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn stride(&self) -> usize {
        self.shared.stride
    }

    /// Buffers currently acquired and not yet released.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    /// Tear the pool down. Returns how many buffers were still in flight.
    pub fn destroy(self) -> usize {
        let in_flight = self.outstanding();
        if in_flight > 0 {
            tracing::warn!(
                "Destroying pool {}x{} with {} buffer(s) in flight",
                self.shared.generation.width,
                self.shared.generation.height,
                in_flight
            );
        }
        while self.shared.free.pop().is_some() {}
        in_flight
    }
}

/// Exclusively owned pool buffer. Released back to its pool on drop, on
/// every exit path.
pub struct PooledBuffer {
    data: Vec<u8>,
    shared: Arc<PoolShared>,
}

impl PooledBuffer {
    pub fn generation(&self) -> Generation {
        self.shared.generation
    }

    pub fn width(&self) -> u32 {
        self.shared.generation.width
    }

    pub fn height(&self) -> u32 {
        self.shared.generation.height
    }

    pub fn stride(&self) -> usize {
        self.shared.stride
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            width: self.width(),
            height: self.height(),
            stride: self.stride(),
            data: &self.data,
        }
    }

    /// Mutable BGRA pixel at (x, y).
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let i = y as usize * self.shared.stride + x as usize * BYTES_PER_PIXEL;
        &mut self.data[i..i + BYTES_PER_PIXEL]
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
        // Full only if the pool was destroyed and refilled, which never happens.
        let _ = self.shared.free.push(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generation(width: u32, height: u32) -> Generation {
        Generation { epoch: 1, width, height }
    }

    #[test]
    fn capacity_has_a_floor() {
        let pool = BufferPool::create(generation(8, 8), 1).unwrap();
        assert_eq!(pool.capacity(), MIN_POOL_CAPACITY);
    }

    #[test]
    fn outstanding_never_exceeds_capacity() {
        let pool = BufferPool::create(generation(8, 4), 3).unwrap();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        assert_eq!(pool.outstanding(), 3);

        drop(b);
        assert_eq!(pool.outstanding(), 2);
        let d = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());

        drop((a, c, d));
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn buffers_are_sized_for_generation() {
        let pool = BufferPool::create(generation(17, 3), 3).unwrap();
        let buffer = pool.acquire().unwrap();
        assert_eq!(buffer.stride(), 128);
        assert_eq!(buffer.as_bytes().len(), 128 * 3);
        assert_eq!(buffer.generation(), pool.generation());
    }

    #[test]
    fn oversized_surface_is_an_allocation_error() {
        let err = BufferPool::create(generation(MAX_SURFACE_DIMENSION + 1, 2), 3).err().unwrap();
        assert!(matches!(err, FilterError::Allocation(_)));
        assert!(BufferPool::create(generation(0, 10), 3).is_err());
    }

    #[test]
    fn release_after_destroy_does_not_panic() {
        let pool = BufferPool::create(generation(4, 4), 3).unwrap();
        let stale = pool.acquire().unwrap();
        assert_eq!(pool.destroy(), 1);
        assert_eq!(stale.width(), 4);
        drop(stale);
    }
}
