//! Graphics pipeline creation for dynamic rendering.
//!
//! - [`PipelineLayout`] wraps VkPipelineLayout
//! - [`Pipeline`] wraps VkPipeline
//! - [`GraphicsPipelineBuilder`] configures the fixed-function state
//!
//! Pipelines target Vulkan 1.3 dynamic rendering, so no render pass is
//! involved: the builder records the color attachment format instead.
//! Vertices are generated in the shader, so there is no vertex input state.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use relay_rhi::device::Device;
//! use relay_rhi::pipeline::{ColorBlendAttachment, CullMode, FrontFace, GraphicsPipelineBuilder, PipelineLayout};
//! use relay_rhi::shader::{ShaderModule, VERTEX_ENTRY, FRAGMENT_ENTRY};
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>, module: &ShaderModule) -> Result<(), relay_rhi::RhiError> {
//! let layout = PipelineLayout::new(device.clone())?;
//! let pipeline = GraphicsPipelineBuilder::new()
//!     .vertex_stage(module, VERTEX_ENTRY)
//!     .fragment_stage(module, FRAGMENT_ENTRY)
//!     .cull_mode(CullMode::Back)
//!     .front_face(FrontFace::Clockwise)
//!     .color_blend_attachment(ColorBlendAttachment::alpha_blend())
//!     .color_attachment_format(vk::Format::B8G8R8A8_SRGB)
//!     .build(device, &layout)?;
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{ShaderModule, ShaderStage};

/// Vulkan pipeline layout wrapper. The frame engine binds no descriptors
/// or push constants, so the layout is empty.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default();

        // SAFETY: the device is valid for as long as `device` is held.
        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!("Created empty pipeline layout");

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        // SAFETY: the layout was created from this device and is destroyed once.
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// Vulkan graphics pipeline wrapper.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    fn create_graphics_internal(
        device: Arc<Device>,
        create_info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> RhiResult<Self> {
        // SAFETY: every pointer in `create_info` refers to builder-owned data
        // that outlives the call.
        let pipelines = unsafe {
            device.handle().create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(create_info),
                None,
            )
        }
        .map_err(|(_, result)| {
            RhiError::PipelineError(format!("Failed to create graphics pipeline: {:?}", result))
        })?;

        info!("Graphics pipeline created");

        Ok(Self {
            device,
            pipeline: pipelines[0],
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // SAFETY: the pipeline is no longer bound by pending work once the
        // owner's teardown guard has idled the device.
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("Graphics pipeline destroyed");
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Winding order of front-facing triangles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Color blend attachment configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color_blend_factor: vk::BlendFactor,
    pub dst_color_blend_factor: vk::BlendFactor,
    pub src_alpha_blend_factor: vk::BlendFactor,
    pub dst_alpha_blend_factor: vk::BlendFactor,
    pub color_write_mask: vk::ColorComponentFlags,
}

impl Default for ColorBlendAttachment {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_blend_factor: vk::BlendFactor::ONE,
            dst_color_blend_factor: vk::BlendFactor::ZERO,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }
}

impl ColorBlendAttachment {
    /// Standard alpha blending: `src * src_alpha + dst * (1 - src_alpha)`.
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }

    pub fn to_vk(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: self.blend_enable.into(),
            src_color_blend_factor: self.src_color_blend_factor,
            dst_color_blend_factor: self.dst_color_blend_factor,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: self.src_alpha_blend_factor,
            dst_alpha_blend_factor: self.dst_alpha_blend_factor,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: self.color_write_mask,
        }
    }
}

/// Builder for graphics pipelines used with dynamic rendering.
///
/// Defaults: triangle list, fill, back-face culling, counter-clockwise front
/// face, no blending, one sample, dynamic viewport and scissor.
pub struct GraphicsPipelineBuilder<'a> {
    vertex: Option<(&'a ShaderModule, &'a CStr)>,
    fragment: Option<(&'a ShaderModule, &'a CStr)>,
    cull_mode: CullMode,
    front_face: FrontFace,
    color_blend_attachment: ColorBlendAttachment,
    color_attachment_format: Option<vk::Format>,
    dynamic_states: Vec<vk::DynamicState>,
}

impl Default for GraphicsPipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new() -> Self {
        Self {
            vertex: None,
            fragment: None,
            cull_mode: CullMode::default(),
            front_face: FrontFace::default(),
            color_blend_attachment: ColorBlendAttachment::default(),
            color_attachment_format: None,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }

    pub fn vertex_stage(mut self, module: &'a ShaderModule, entry_point: &'a CStr) -> Self {
        self.vertex = Some((module, entry_point));
        self
    }

    pub fn fragment_stage(mut self, module: &'a ShaderModule, entry_point: &'a CStr) -> Self {
        self.fragment = Some((module, entry_point));
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn front_face(mut self, face: FrontFace) -> Self {
        self.front_face = face;
        self
    }

    pub fn color_blend_attachment(mut self, attachment: ColorBlendAttachment) -> Self {
        self.color_blend_attachment = attachment;
        self
    }

    pub fn color_attachment_format(mut self, format: vk::Format) -> Self {
        self.color_attachment_format = Some(format);
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if a shader stage or the color
    /// format is missing, or if the driver rejects the pipeline.
    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        let (vertex_module, vertex_entry) = self
            .vertex
            .ok_or_else(|| RhiError::PipelineError("Vertex stage is required".to_string()))?;
        let (fragment_module, fragment_entry) = self
            .fragment
            .ok_or_else(|| RhiError::PipelineError("Fragment stage is required".to_string()))?;
        let color_format = self.color_attachment_format.ok_or_else(|| {
            RhiError::PipelineError("Color attachment format is required".to_string())
        })?;

        let shader_stages = [
            vertex_module.stage_create_info(ShaderStage::Vertex, vertex_entry),
            fragment_module.stage_create_info(ShaderStage::Fragment, fragment_entry),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default();

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic; only the counts matter here
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(self.front_face.to_vk())
            .line_width(1.0);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [self.color_blend_attachment.to_vk()];
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&self.dynamic_states);

        let color_formats = [color_format];
        let mut rendering_info =
            vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .push_next(&mut rendering_info);

        Pipeline::create_graphics_internal(device, &pipeline_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cull_mode_to_vk() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Front.to_vk(), vk::CullModeFlags::FRONT);
        assert_eq!(CullMode::Back.to_vk(), vk::CullModeFlags::BACK);
    }

    #[test]
    fn test_front_face_to_vk() {
        assert_eq!(
            FrontFace::Clockwise.to_vk(),
            vk::FrontFace::CLOCKWISE
        );
        assert_eq!(
            FrontFace::CounterClockwise.to_vk(),
            vk::FrontFace::COUNTER_CLOCKWISE
        );
    }

    #[test]
    fn test_alpha_blend_state() {
        let state = ColorBlendAttachment::alpha_blend().to_vk();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            state.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_default_blend_is_disabled() {
        let state = ColorBlendAttachment::default().to_vk();
        assert_eq!(state.blend_enable, vk::FALSE);
    }

    #[test]
    fn test_builder_defaults() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.cull_mode, CullMode::Back);
        assert_eq!(builder.front_face, FrontFace::CounterClockwise);
        assert!(builder.dynamic_states.contains(&vk::DynamicState::VIEWPORT));
        assert!(builder.dynamic_states.contains(&vk::DynamicState::SCISSOR));
        assert!(builder.color_attachment_format.is_none());
    }
}
