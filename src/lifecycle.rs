//! Resize state machine: `Uninitialized -> Ready(w,h) -> Ready(w',h') -> ...`
//!
//! Driven once per tick with the upstream target's dimensions. A change
//! destroys every sized resource of the old generation before allocating the
//! new one, so at most one generation is ever live.

use crate::bridge::{RenderTexture, StagingSurface};
use crate::error::Result;
use crate::frame::Generation;
use crate::pool::{BufferPool, MIN_POOL_CAPACITY};

/// Everything whose size follows the target resolution.
pub struct SizedResources {
    pub generation: Generation,
    pub pool: BufferPool,
    pub staging: StagingSurface,
    pub render_target: RenderTexture,
}

impl SizedResources {
    fn allocate(generation: Generation) -> Result<Self> {
        let render_target = RenderTexture::allocate(generation)?;
        let staging = StagingSurface::allocate(generation)?;
        let pool = BufferPool::create(generation, MIN_POOL_CAPACITY)?;
        Ok(Self {
            generation,
            pool,
            staging,
            render_target,
        })
    }

    fn teardown(self) {
        let (width, height) = self.generation.dimensions();
        let in_flight = self.pool.destroy();
        tracing::debug!(
            "Released {}x{} resources (epoch {}, {} buffer(s) in flight)",
            width,
            height,
            self.generation.epoch,
            in_flight
        );
    }
}

pub enum LifecycleState {
    Uninitialized,
    Ready(SizedResources),
}

/// What a tick did to the sized resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Zero-sized target; render will pass through.
    NotReady,
    Unchanged,
    /// A new generation was created. Temporal state must be cleared.
    Recreated(Generation),
    /// Allocation failed; retried on the next tick.
    AllocationFailed,
}

pub struct ResourceLifecycle {
    state: LifecycleState,
    target_ready: bool,
    next_epoch: u64,
    recreations: u64,
    failed_dimensions: Option<(u32, u32)>,
}

impl Default for ResourceLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceLifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            target_ready: false,
            next_epoch: 1,
            recreations: 0,
            failed_dimensions: None,
        }
    }

    pub fn tick(&mut self, width: u32, height: u32) -> TickOutcome {
        if width == 0 || height == 0 {
            self.target_ready = false;
            return TickOutcome::NotReady;
        }
        self.target_ready = true;

        if let LifecycleState::Ready(resources) = &self.state {
            if resources.generation.dimensions() == (width, height) {
                return TickOutcome::Unchanged;
            }
        }

        if let LifecycleState::Ready(old) = std::mem::replace(&mut self.state, LifecycleState::Uninitialized) {
            old.teardown();
        }

        let generation = Generation {
            epoch: self.next_epoch,
            width,
            height,
        };
        match SizedResources::allocate(generation) {
            Ok(resources) => {
                tracing::info!("Allocated resources for {}x{} (epoch {})", width, height, generation.epoch);
                self.next_epoch += 1;
                self.recreations += 1;
                self.failed_dimensions = None;
                self.state = LifecycleState::Ready(resources);
                TickOutcome::Recreated(generation)
            }
            Err(e) => {
                if self.failed_dimensions != Some((width, height)) {
                    tracing::warn!("Failed to allocate {}x{} resources: {}", width, height, e);
                } else {
                    tracing::debug!("Still unable to allocate {}x{} resources: {}", width, height, e);
                }
                self.failed_dimensions = Some((width, height));
                TickOutcome::AllocationFailed
            }
        }
    }

    /// Live resources, if the target is ready and allocation succeeded.
    pub fn ready(&self) -> Option<&SizedResources> {
        match &self.state {
            LifecycleState::Ready(resources) if self.target_ready => Some(resources),
            _ => None,
        }
    }

    pub fn ready_mut(&mut self) -> Option<&mut SizedResources> {
        match &mut self.state {
            LifecycleState::Ready(resources) if self.target_ready => Some(resources),
            _ => None,
        }
    }

    pub fn generation(&self) -> Option<Generation> {
        match &self.state {
            LifecycleState::Ready(resources) => Some(resources.generation),
            LifecycleState::Uninitialized => None,
        }
    }

    /// Number of successful (re)allocations since creation.
    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    /// Release everything; the next tick starts from `Uninitialized`.
    pub fn release(&mut self) {
        if let LifecycleState::Ready(old) = std::mem::replace(&mut self.state, LifecycleState::Uninitialized) {
            old.teardown();
        }
        self.target_ready = false;
    }
}
