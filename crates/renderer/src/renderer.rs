//! Frame scheduler.
//!
//! This module provides the [`Renderer`], which owns every Vulkan object of
//! the engine and turns one [`FrameContext`] into one presented image.
//!
//! # Resource Destruction Order
//!
//! Fields drop in declaration order:
//! 1. The teardown guard waits for the device to go idle
//! 2. Frame slots, command pool, pipeline and layout
//! 3. Swap images, then the surface
//! 4. The device, then the instance
//! 5. The window, which must outlive its surface

use std::sync::Arc;

use tracing::{debug, info};
use winit::window::Window as WinitWindow;

use relay_core::FrameConfig;
use relay_core::config::SHADER_PATH;
use relay_platform::{Surface, Window};
use relay_rhi::command::{CommandBuffer, CommandPool};
use relay_rhi::device::Device;
use relay_rhi::instance::Instance;
use relay_rhi::physical_device::{GpuInfo, select_physical_device};
use relay_rhi::pipeline::{
    ColorBlendAttachment, CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use relay_rhi::rendering::{
    ColorAttachment, RenderingInfoBundle, full_scissor, full_viewport, to_color_attachment,
    to_present,
};
use relay_rhi::shader::{FRAGMENT_ENTRY, ShaderModule, VERTEX_ENTRY, read_shader_file};
use relay_rhi::swapchain::{RenderTarget, SwapState, Swapchain, SwapchainConfig, VulkanSurface};
use relay_rhi::teardown::TeardownGuard;
use relay_rhi::{RhiError, vk};

use crate::error::RenderResult;
use crate::frame::{DrawCommand, FrameContext};
use crate::frame_manager::FrameManager;
use crate::harness::FrameConsumer;
use crate::scheduler::{FrameOutcome, FrameScheduler};

/// Vertices of the triangle generated by the vertex shader.
const TRIANGLE_VERTICES: u32 = 3;

/// Main renderer that manages all Vulkan resources.
pub struct Renderer {
    _teardown: TeardownGuard<Device>,
    scheduler: FrameScheduler<VulkanSurface, FrameManager>,
    _command_pool: CommandPool,
    pipeline: Pipeline,
    _pipeline_layout: PipelineLayout,
    _surface: Surface,
    device: Arc<Device>,
    instance: Instance,
    _window: Arc<WinitWindow>,
}

impl Renderer {
    /// Creates a renderer presenting to `window`.
    ///
    /// Runs the whole bootstrap: instance, surface, GPU selection, device,
    /// swap images, shader and pipeline, frame slots.
    ///
    /// # Errors
    ///
    /// Any setup failure, including a window with no drawable area.
    pub fn new(window: &Window, config: &FrameConfig) -> RenderResult<Self> {
        config.validate()?;

        let size = window.drawable_size();
        info!("Initializing renderer ({}x{})", size.x, size.y);

        let extensions = window.required_extensions()?;
        let instance = Instance::new(&extensions, config.enable_validation)?;

        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let gpu = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &gpu)?;

        let backend = VulkanSurface::new(&instance, device.clone(), surface.handle());
        let swapchain = Swapchain::new(
            backend,
            size,
            SwapchainConfig {
                min_image_count: config.min_swap_images,
                prefer_mailbox: config.prefer_mailbox,
            },
        )?;
        if swapchain.state() == SwapState::Uninitialized {
            return Err(RhiError::SwapchainError(format!(
                "window has no drawable area ({}x{})",
                size.x, size.y
            ))
            .into());
        }

        let (pipeline, pipeline_layout) = Self::create_pipeline(&device, swapchain.format())?;

        let command_pool = CommandPool::new(device.clone(), device.queue_family())?;
        let frames = FrameManager::new(device.clone(), &command_pool, config.frames_in_flight)?;

        info!(
            "Renderer initialized: {} swap images, {} frames in flight",
            swapchain.image_count(),
            frames.frames_in_flight()
        );

        Ok(Self {
            _teardown: TeardownGuard::new(device.clone()),
            scheduler: FrameScheduler::new(swapchain, frames, device.queue(), size, config),
            _command_pool: command_pool,
            pipeline,
            _pipeline_layout: pipeline_layout,
            _surface: surface,
            device,
            instance,
            _window: window.inner_arc(),
        })
    }

    fn create_pipeline(
        device: &Arc<Device>,
        color_format: vk::Format,
    ) -> RenderResult<(Pipeline, PipelineLayout)> {
        let bytes = read_shader_file(SHADER_PATH)?;
        let module = ShaderModule::from_bytes(device.clone(), &bytes)?;

        let layout = PipelineLayout::new(device.clone())?;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_stage(&module, VERTEX_ENTRY)
            .fragment_stage(&module, FRAGMENT_ENTRY)
            .cull_mode(CullMode::Back)
            .front_face(FrontFace::Clockwise)
            .color_blend_attachment(ColorBlendAttachment::alpha_blend())
            .color_attachment_format(color_format)
            .build(device.clone(), &layout)?;

        debug!("Pipeline created for {:?}", color_format);
        Ok((pipeline, layout))
    }

    /// Draws and presents one frame.
    ///
    /// Out-of-date or zero-area swap images are rebuilt at the packet's
    /// drawable size and the frame is skipped. A frame without a packet is
    /// skipped too.
    ///
    /// # Errors
    ///
    /// Fence timeouts, submission failures, unexpected driver results and
    /// repeated recreation failures are fatal.
    pub fn draw(&mut self, frame: &FrameContext) -> RenderResult<FrameOutcome> {
        let Some(packet) = frame.packet() else {
            debug!("Frame context {} carries no packet, skipping", frame.id());
            return Ok(FrameOutcome::Skipped);
        };

        let pipeline = self.pipeline.handle();
        let commands = frame.commands();
        self.scheduler
            .run_frame(packet.drawable_size, |frames, swapchain, target| {
                record_frame(
                    frames.current().command_buffer(),
                    pipeline,
                    swapchain,
                    target,
                    commands,
                );
            })
    }

    /// Returns the current swap image extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.scheduler.swapchain().extent()
    }

    /// Returns the swap image format.
    pub fn format(&self) -> vk::Format {
        self.scheduler.swapchain().format()
    }

    pub fn frame_counter(&self) -> u64 {
        self.scheduler.slots().frame_counter()
    }

    pub fn gpu(&self) -> &GpuInfo {
        self.device.gpu()
    }

    pub fn has_validation(&self) -> bool {
        self.instance.has_validation()
    }
}

impl FrameConsumer<FrameContext> for Renderer {
    fn consume(&mut self, frame: &mut FrameContext) -> RenderResult<()> {
        self.draw(frame).map(|_| ())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        info!(
            "Renderer shutting down after {} frames",
            self.frame_counter()
        );
    }
}

/// Records the built-in triangle and the packet's draws into `target`.
fn record_frame(
    cmd: &CommandBuffer,
    pipeline: vk::Pipeline,
    swapchain: &Swapchain<VulkanSurface>,
    target: &RenderTarget,
    commands: &[DrawCommand],
) {
    cmd.image_barriers(&[to_color_attachment(swapchain.base_barrier())]);

    let rendering = RenderingInfoBundle::new(ColorAttachment::new(target.view), target.extent);
    cmd.begin_rendering(&rendering.info());

    cmd.bind_graphics_pipeline(pipeline);
    cmd.set_viewport(&full_viewport(target.extent));
    cmd.set_scissor(&full_scissor(target.extent));

    cmd.draw(TRIANGLE_VERTICES, 1, 0, 0);
    for command in commands {
        cmd.draw(
            command.vertex_count,
            command.instance_count,
            command.first_vertex,
            0,
        );
    }

    cmd.end_rendering();

    cmd.image_barriers(&[to_present(swapchain.base_barrier())]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_is_send() {
        // Built on the main thread, driven on the render thread
        fn assert_send<T: Send>() {}
        assert_send::<Renderer>();
    }
}
