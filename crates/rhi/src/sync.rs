//! Synchronization primitives for Vulkan.
//!
//! This module provides RAII wrappers for Vulkan synchronization objects:
//! - [`Semaphore`] - GPU-to-GPU synchronization (acquire → render → present)
//! - [`Fence`] - GPU-to-CPU synchronization (host waits before reusing a frame slot)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use relay_rhi::device::Device;
//! use relay_rhi::sync::{Semaphore, Fence};
//!
//! # fn example(device: Arc<Device>) -> Result<(), relay_rhi::RhiError> {
//! let image_acquired = Semaphore::new(device.clone())?;
//!
//! // Created signaled so the first frame does not block
//! let frame_finished = Fence::new(device.clone(), true)?;
//!
//! frame_finished.wait(Duration::from_secs(1))?;
//! frame_finished.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan semaphore wrapper.
///
/// Created unsignaled. Destroyed on drop; the owner must make sure no queue
/// operation still references it (see [`crate::teardown::TeardownGuard`]).
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new binary semaphore.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        // SAFETY: the device is valid for as long as `device` is held.
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: the handle was created from this device and is destroyed once.
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence, optionally already signaled.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        // SAFETY: the device is valid for as long as `device` is held.
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` expires.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FenceTimeout`] when the deadline passes, and
    /// [`RhiError::VulkanError`] for any other failure (e.g. device lost).
    pub fn wait(&self, timeout: Duration) -> RhiResult<()> {
        let fences = [self.fence];
        // SAFETY: the fence belongs to this device.
        let result = unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout_nanos(timeout))
        };
        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RhiError::FenceTimeout(timeout)),
            Err(e) => Err(e.into()),
        }
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be pending on any queue when this is called.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        // SAFETY: callers only reset after a successful wait.
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        // SAFETY: the handle was created from this device and is destroyed once.
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Converts a wait duration to the nanosecond count Vulkan expects,
/// saturating instead of wrapping for very long waits.
fn timeout_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_nanos() {
        assert_eq!(timeout_nanos(Duration::from_secs(1)), 1_000_000_000);
        assert_eq!(timeout_nanos(Duration::ZERO), 0);
        assert_eq!(timeout_nanos(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_sync_primitives_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
    }
}
