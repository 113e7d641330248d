//! Command pool and command buffer management.
//!
//! - [`CommandPool`] manages VkCommandPool creation and command buffer allocation
//! - [`CommandBuffer`] wraps VkCommandBuffer with the handful of commands a
//!   frame needs: barriers, dynamic rendering, pipeline binding, dynamic
//!   state and draws
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use relay_rhi::device::Device;
//! use relay_rhi::command::{CommandPool, CommandBuffer};
//!
//! # fn example(device: Arc<Device>) -> Result<(), relay_rhi::RhiError> {
//! let pool = CommandPool::new(device.clone(), device.queue_family())?;
//! let cmd = CommandBuffer::new(device.clone(), &pool)?;
//!
//! cmd.begin()?;
//! // ... record rendering commands ...
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan command pool wrapper.
///
/// Created with `RESET_COMMAND_BUFFER` so each frame slot can reset its own
/// buffer without touching the others.
///
/// # Thread Safety
///
/// Command pools are not thread-safe. The pool and every buffer allocated
/// from it stay on the render thread.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a new command pool for the specified queue family.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        // SAFETY: the device is valid for as long as `device` is held.
        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        info!(
            "Command pool created for queue family {}",
            queue_family_index
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocates `count` primary command buffers.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        // SAFETY: the pool belongs to this device.
        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };
        Ok(buffers)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // SAFETY: buffers from this pool are no longer pending once the owner's
        // teardown guard has idled the device; they are freed with the pool.
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        info!(
            "Command pool destroyed for queue family {}",
            self.queue_family_index
        );
    }
}

/// Vulkan command buffer wrapper.
///
/// Does NOT own the underlying VkCommandBuffer handle; it is freed when the
/// owning [`CommandPool`] is destroyed.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Allocates one primary command buffer from `pool`.
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let buffer = pool.allocate_command_buffers(1)?[0];
        Ok(Self { device, buffer })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Begins recording for a single submission.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        // SAFETY: the buffer is in the initial state (fresh or reset).
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }

        Ok(())
    }

    pub fn end(&self) -> RhiResult<()> {
        // SAFETY: the buffer is recording.
        unsafe {
            self.device.handle().end_command_buffer(self.buffer)?;
        }

        Ok(())
    }

    /// Resets the buffer to the initial state. It must not be pending.
    pub fn reset(&self) -> RhiResult<()> {
        // SAFETY: callers reset only after the slot fence has signaled.
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
        }

        Ok(())
    }

    // =========================================================================
    // Dynamic Rendering (Vulkan 1.3)
    // =========================================================================

    pub fn begin_rendering(&self, rendering_info: &vk::RenderingInfo<'_>) {
        // SAFETY: the buffer is recording and outside any rendering scope.
        unsafe {
            self.device
                .handle()
                .cmd_begin_rendering(self.buffer, rendering_info);
        }
    }

    pub fn end_rendering(&self) {
        // SAFETY: paired with `begin_rendering`.
        unsafe {
            self.device.handle().cmd_end_rendering(self.buffer);
        }
    }

    // =========================================================================
    // Pipeline & Dynamic State
    // =========================================================================

    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        // SAFETY: the buffer is recording and the pipeline is alive.
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    pub fn set_viewport(&self, viewport: &vk::Viewport) {
        // SAFETY: the buffer is recording.
        unsafe {
            self.device
                .handle()
                .cmd_set_viewport(self.buffer, 0, std::slice::from_ref(viewport));
        }
    }

    pub fn set_scissor(&self, scissor: &vk::Rect2D) {
        // SAFETY: the buffer is recording.
        unsafe {
            self.device
                .handle()
                .cmd_set_scissor(self.buffer, 0, std::slice::from_ref(scissor));
        }
    }

    // =========================================================================
    // Drawing Commands
    // =========================================================================

    /// Issues a non-indexed draw command.
    pub fn draw(
        &self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        // SAFETY: the buffer is recording inside a rendering scope with a
        // graphics pipeline bound.
        unsafe {
            self.device.handle().cmd_draw(
                self.buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Records image layout transitions with synchronization2.
    pub fn image_barriers(&self, barriers: &[vk::ImageMemoryBarrier2<'_>]) {
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(barriers);

        // SAFETY: the buffer is recording and every barrier names a live image.
        unsafe {
            self.device
                .handle()
                .cmd_pipeline_barrier2(self.buffer, &dependency_info);
        }
    }
}
