//! Compiled-in engine configuration.
//!
//! The engine has no command line or config files; every knob lives here.
//! `RUST_LOG` is the only runtime setting (see [`crate::init_logging`]).

use std::time::Duration;

use crate::{Error, Result};

/// Minimum number of swap images requested from the surface.
pub const MIN_SWAP_IMAGES: u32 = 3;

/// Number of per-frame synchronization slots on the render thread.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Capacity of each frame arena in bytes.
pub const ARENA_SIZE: usize = 1024 * 1024;

/// Capacity of the ready and free handoff queues.
pub const HANDOFF_CAPACITY: usize = 4;

/// Number of frame contexts cycled between producer and render thread.
pub const FRAME_POOL_SIZE: usize = 3;

/// Upper bound on waiting for a frame slot's fence.
pub const FENCE_TIMEOUT: Duration = Duration::from_secs(1);

/// How long the render thread blocks on an empty ready queue before rechecking
/// the running flag.
pub const RENDER_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Consecutive swap target rebuild failures tolerated before the render
/// thread gives up.
pub const MAX_RECREATE_FAILURES: u32 = 8;

/// SPIR-V module holding both `vertexMain` and `fragmentMain`.
pub const SHADER_PATH: &str = "shaders/triangle.spv";

pub const WINDOW_TITLE: &str = "relay";
pub const WINDOW_WIDTH: u32 = 800;
pub const WINDOW_HEIGHT: u32 = 600;

/// Frame pipelining parameters bundled for the harness and scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameConfig {
    pub arena_size: usize,
    pub pool_size: usize,
    pub handoff_capacity: usize,
    pub frames_in_flight: usize,
    pub min_swap_images: u32,
    pub fence_timeout: Duration,
    pub poll_interval: Duration,
    pub max_recreate_failures: u32,
    /// Prefer MAILBOX over FIFO when the surface supports it.
    pub prefer_mailbox: bool,
    pub enable_validation: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            arena_size: ARENA_SIZE,
            pool_size: FRAME_POOL_SIZE,
            handoff_capacity: HANDOFF_CAPACITY,
            frames_in_flight: FRAMES_IN_FLIGHT,
            min_swap_images: MIN_SWAP_IMAGES,
            fence_timeout: FENCE_TIMEOUT,
            poll_interval: RENDER_POLL_INTERVAL,
            max_recreate_failures: MAX_RECREATE_FAILURES,
            prefer_mailbox: false,
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl FrameConfig {
    /// Reject combinations the frame pipeline cannot run with.
    ///
    /// Every pooled context must fit in either queue at once, otherwise the
    /// shutdown drain could not hold them all.
    pub fn validate(&self) -> Result<()> {
        if self.arena_size == 0 {
            return Err(Error::Config("arena_size must be non-zero".into()));
        }
        if self.pool_size == 0 {
            return Err(Error::Config("pool_size must be non-zero".into()));
        }
        if self.frames_in_flight == 0 {
            return Err(Error::Config("frames_in_flight must be non-zero".into()));
        }
        if self.pool_size > self.handoff_capacity {
            return Err(Error::Config(format!(
                "pool_size ({}) exceeds handoff_capacity ({})",
                self.pool_size, self.handoff_capacity
            )));
        }
        if self.fence_timeout.is_zero() {
            return Err(Error::Config("fence_timeout must be non-zero".into()));
        }
        Ok(())
    }
}
