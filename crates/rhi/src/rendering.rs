//! Dynamic rendering helpers (Vulkan 1.3).
//!
//! - [`ColorAttachment`] describes the swap image written by a frame
//! - [`RenderingInfoBundle`] keeps `VkRenderingInfo` and the attachment data
//!   it points to alive together
//! - [`to_color_attachment`] / [`to_present`] fill in the two layout
//!   transitions every frame performs on its swap image
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use relay_rhi::rendering::{ColorAttachment, RenderingInfoBundle};
//! use relay_rhi::command::CommandBuffer;
//!
//! # fn example(color_view: vk::ImageView, extent: vk::Extent2D, cmd: &CommandBuffer) {
//! let bundle = RenderingInfoBundle::new(ColorAttachment::new(color_view), extent);
//! cmd.begin_rendering(&bundle.info());
//! // ... draw commands ...
//! cmd.end_rendering();
//! # }
//! ```

use ash::vk;

/// Color attachment for dynamic rendering.
///
/// Defaults: `COLOR_ATTACHMENT_OPTIMAL`, clear on load, store, cleared to
/// opaque black.
#[derive(Clone, Copy)]
pub struct ColorAttachment {
    pub image_view: vk::ImageView,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_color: [f32; 4],
}

impl ColorAttachment {
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            })
    }
}

impl std::fmt::Debug for ColorAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorAttachment")
            .field("image_view", &self.image_view)
            .field("load_op", &self.load_op)
            .field("store_op", &self.store_op)
            .field("clear_color", &self.clear_color)
            .finish()
    }
}

/// `VkRenderingInfo` with its backing attachment array.
pub struct RenderingInfoBundle {
    color_attachments: [vk::RenderingAttachmentInfo<'static>; 1],
    render_area: vk::Rect2D,
}

impl RenderingInfoBundle {
    /// Renders into `color` over the whole of `extent`.
    pub fn new(color: ColorAttachment, extent: vk::Extent2D) -> Self {
        Self {
            color_attachments: [color.to_rendering_attachment_info()],
            render_area: full_scissor(extent),
        }
    }

    /// Returns the `VkRenderingInfo` referencing this bundle's data.
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments)
    }

    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }
}

/// Viewport covering `extent` with the standard depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering `extent`.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Completes a swap image barrier for the transition into rendering.
///
/// The previous contents are discarded (`UNDEFINED`). The source stage is
/// the one the image-acquired semaphore is waited at, so the transition is
/// ordered after presentation has released the image.
pub fn to_color_attachment(barrier: vk::ImageMemoryBarrier2<'_>) -> vk::ImageMemoryBarrier2<'_> {
    barrier
        .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags2::NONE)
        .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
}

/// Completes a swap image barrier for the transition to presentation.
pub fn to_present(barrier: vk::ImageMemoryBarrier2<'_>) -> vk::ImageMemoryBarrier2<'_> {
    barrier
        .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE)
        .dst_access_mask(vk::AccessFlags2::NONE)
        .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_color_attachment_clears_to_black() {
        let view = vk::ImageView::from_raw(42);
        let info = ColorAttachment::new(view).to_rendering_attachment_info();

        assert_eq!(info.image_view, view);
        assert_eq!(info.image_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(info.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(info.store_op, vk::AttachmentStoreOp::STORE);
        // SAFETY: the clear value was written through the float32 member.
        let color = unsafe { info.clear_value.color.float32 };
        assert_eq!(color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_bundle_covers_extent() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let bundle = RenderingInfoBundle::new(ColorAttachment::new(vk::ImageView::null()), extent);
        let info = bundle.info();

        assert_eq!(info.render_area.extent, extent);
        assert_eq!(info.layer_count, 1);
        assert_eq!(info.color_attachment_count, 1);
    }

    #[test]
    fn test_full_viewport() {
        let viewport = full_viewport(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.max_depth, 1.0);
    }

    #[test]
    fn test_layout_transitions() {
        let base = vk::ImageMemoryBarrier2::default().image(vk::Image::from_raw(7));

        let to_color = to_color_attachment(base);
        assert_eq!(to_color.image, vk::Image::from_raw(7));
        assert_eq!(to_color.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(
            to_color.new_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );

        let present = to_present(base);
        assert_eq!(
            present.old_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(present.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(
            present.src_access_mask,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
        );
    }
}
