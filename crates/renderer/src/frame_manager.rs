//! Frames-in-flight bookkeeping.
//!
//! This module provides the [`FrameManager`], a small ring of
//! [`FrameSyncSlot`]s. Each slot carries the command buffer and
//! synchronization objects for one frame the GPU may still be working on:
//!
//! 1. While the GPU renders frame N, the CPU records frame N+1 into the other slot
//! 2. A slot is not re-recorded before its fence from the previous lap signals
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on frame_finished (host waits for the previous use of this slot)
//! 2. Acquire swap image (signals image_acquired)
//! 3. Reset frame_finished, record the command buffer
//! 4. Submit:
//!    - wait image_acquired at COLOR_ATTACHMENT_OUTPUT
//!    - signal the swap image's render-done semaphore
//!    - signal frame_finished
//! 5. Present (waits on render-done)
//! ```
//!
//! Render-done semaphores belong to the swap images, not to the slots, so a
//! semaphore is never re-signaled while a present may still wait on it.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::{debug, info};

use relay_rhi::RhiResult;
use relay_rhi::command::{CommandBuffer, CommandPool};
use relay_rhi::device::Device;
use relay_rhi::sync::{Fence, Semaphore};

/// Command buffer and synchronization objects for one frame in flight.
pub struct FrameSyncSlot {
    command_buffer: CommandBuffer,
    /// Armed by acquire; signals once the swap image may be written.
    image_acquired: Semaphore,
    /// Signaled when the slot's last submission completes.
    frame_finished: Fence,
}

impl FrameSyncSlot {
    fn new(device: Arc<Device>, command_pool: &CommandPool) -> RhiResult<Self> {
        let command_buffer = CommandBuffer::new(device.clone(), command_pool)?;
        let image_acquired = Semaphore::new(device.clone())?;
        // Signaled so the first wait on each slot returns immediately
        let frame_finished = Fence::new(device, true)?;

        Ok(Self {
            command_buffer,
            image_acquired,
            frame_finished,
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }
}

/// Ring of frame slots.
///
/// # Thread Safety
///
/// Lives on the render thread with the rest of the renderer.
pub struct FrameManager {
    device: Arc<Device>,
    slots: Vec<FrameSyncSlot>,
    frame_counter: u64,
}

impl FrameManager {
    /// Creates `frames_in_flight` slots.
    ///
    /// # Errors
    ///
    /// Returns an error if any command buffer or sync object cannot be created.
    pub fn new(
        device: Arc<Device>,
        command_pool: &CommandPool,
        frames_in_flight: usize,
    ) -> RhiResult<Self> {
        let mut slots = Vec::with_capacity(frames_in_flight);

        for i in 0..frames_in_flight {
            slots.push(FrameSyncSlot::new(device.clone(), command_pool)?);
            debug!("Created frame slot {}", i);
        }

        info!(
            "Frame manager created with {} frames in flight",
            frames_in_flight
        );

        Ok(Self {
            device,
            slots,
            frame_counter: 0,
        })
    }

    /// Slot used by the current logical frame.
    #[inline]
    pub fn current(&self) -> &FrameSyncSlot {
        &self.slots[self.current_index()]
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        slot_index(self.frame_counter, self.slots.len())
    }

    /// Number of logical frames advanced so far, skipped ones included.
    #[inline]
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }
}

/// The per-frame operations the scheduler drives.
///
/// [`FrameManager`] is the Vulkan implementation. The ordering rules live in
/// [`crate::scheduler::FrameScheduler`], which only sees this trait.
pub trait FrameSlots {
    /// Blocks until the current slot's previous submission has completed.
    ///
    /// # Errors
    ///
    /// Returns [`relay_rhi::RhiError::FenceTimeout`] if the GPU does not
    /// finish within `timeout`.
    fn wait_for_frame(&self, timeout: Duration) -> RhiResult<()>;

    /// Semaphore the next acquire must arm for the current slot.
    fn image_acquired(&self) -> vk::Semaphore;

    /// Resets the current slot for recording. Call only once a swap image
    /// has been acquired, so the fence is re-signaled by this frame's submit.
    fn begin_frame(&self) -> RhiResult<()>;

    fn end_frame(&self) -> RhiResult<()>;

    /// Submits the current slot's work, signaling `render_done` and the
    /// slot fence.
    fn submit(&self, render_done: vk::Semaphore) -> RhiResult<()>;

    /// Advances to the next logical frame.
    fn next_frame(&mut self);
}

impl FrameSlots for FrameManager {
    fn wait_for_frame(&self, timeout: Duration) -> RhiResult<()> {
        self.current().frame_finished.wait(timeout)
    }

    fn image_acquired(&self) -> vk::Semaphore {
        self.current().image_acquired.handle()
    }

    fn begin_frame(&self) -> RhiResult<()> {
        let slot = self.current();
        slot.frame_finished.reset()?;
        slot.command_buffer.reset()?;
        slot.command_buffer.begin()?;
        Ok(())
    }

    fn end_frame(&self) -> RhiResult<()> {
        self.current().command_buffer.end()
    }

    /// Waits on `image_acquired` before color output, signals `render_done`
    /// once all commands complete and the slot fence with it.
    fn submit(&self, render_done: vk::Semaphore) -> RhiResult<()> {
        let slot = self.current();

        let wait_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(slot.image_acquired.handle())
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
        let command_infos =
            [vk::CommandBufferSubmitInfo::default().command_buffer(slot.command_buffer.handle())];
        let signal_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(render_done)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];

        let submit_info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait_infos)
            .command_buffer_infos(&command_infos)
            .signal_semaphore_infos(&signal_infos);

        // SAFETY: the command buffer was recorded by begin/end_frame, the
        // acquire armed `image_acquired`, and the fence was reset in
        // begin_frame.
        unsafe {
            self.device
                .submit2(&[submit_info], slot.frame_finished.handle())
        }
    }

    fn next_frame(&mut self) {
        self.frame_counter += 1;
    }
}

fn slot_index(frame_counter: u64, slots: usize) -> usize {
    (frame_counter % slots as u64) as usize
}
