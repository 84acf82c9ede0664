//! Command pools and command lists.
//!
//! # Overview
//!
//! - [`CommandPool`] wraps a `VkCommandPool` for the graphics family.
//! - [`CommandList`] owns one pool and one primary command buffer. Resetting
//!   the whole pool on [`begin`](CommandRecorder::begin) is the cheapest way
//!   to recycle a ring slot's recording memory.
//!
//! Layout transitions are expressed with the backend-neutral
//! [`TargetState`] and translated to image barriers here.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::backend::CommandRecorder;
use crate::buffer::Buffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::DepthImage;
use crate::pipeline::GraphicsPipeline;
use crate::types::{ClearValues, CopyRegion, ScissorRect, TargetState, Viewport};
use crate::vulkan::{VulkanBackBuffer, VulkanDevice};

/// Vulkan command pool.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Creates a pool for `queue_family_index`.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };
        Ok(Self { device, pool })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocates one primary command buffer.
    pub fn allocate_command_buffer(&self) -> RhiResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::InvalidUsage("driver returned no command buffer".to_string()))
    }

    /// Returns every buffer of the pool to the initial state.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?;
        }
        Ok(())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
    }
}

/// A primary command buffer with its own pool.
pub struct CommandList {
    device: Arc<Device>,
    pool: CommandPool,
    buffer: vk::CommandBuffer,
    label: String,
    recording: bool,
}

impl CommandList {
    pub fn new(device: Arc<Device>, label: &str) -> RhiResult<Self> {
        let family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let pool = CommandPool::new(device.clone(), family)?;
        let buffer = pool.allocate_command_buffer()?;

        debug!("Created command list '{}'", label);

        Ok(Self {
            device,
            pool,
            buffer,
            label: label.to_string(),
            recording: false,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    fn image_barrier(
        &self,
        image: vk::Image,
        aspect_mask: vk::ImageAspectFlags,
        from: TargetState,
        to: TargetState,
    ) {
        let barrier = transition_barrier(from, to);
        let image_barrier = vk::ImageMemoryBarrier::default()
            .old_layout(barrier.old_layout)
            .new_layout(barrier.new_layout)
            .src_access_mask(barrier.src_access)
            .dst_access_mask(barrier.dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_mask)
                    .level_count(1)
                    .layer_count(1),
            );

        unsafe {
            self.device.handle().cmd_pipeline_barrier(
                self.buffer,
                barrier.src_stage,
                barrier.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(&image_barrier),
            );
        }
    }
}

/// Vulkan layout of a logical target state.
pub fn image_layout(state: TargetState) -> vk::ImageLayout {
    match state {
        TargetState::Undefined => vk::ImageLayout::UNDEFINED,
        TargetState::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        TargetState::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        TargetState::DepthWrite => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
    }
}

/// Stages, access masks and layouts of one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionBarrier {
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub dst_access: vk::AccessFlags,
}

/// Barrier parameters for `from -> to`.
pub fn transition_barrier(from: TargetState, to: TargetState) -> TransitionBarrier {
    use TargetState::*;

    let (old_layout, src_stage, src_access, dst_stage, dst_access) = match (from, to) {
        // The back buffer is cleared every frame; its previous contents
        // (and the layout they were left in) can be discarded.
        (Present | Undefined, RenderTarget) => (
            vk::ImageLayout::UNDEFINED,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        (RenderTarget, Present) => (
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::AccessFlags::empty(),
        ),
        (_, DepthWrite) => (
            vk::ImageLayout::UNDEFINED,
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        _ => (
            image_layout(from),
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
        ),
    };

    TransitionBarrier {
        old_layout,
        new_layout: image_layout(to),
        src_stage,
        src_access,
        dst_stage,
        dst_access,
    }
}

impl CommandRecorder<VulkanDevice> for CommandList {
    // =========================================================================
    // Recording Control
    // =========================================================================

    fn begin(&mut self) -> RhiResult<()> {
        self.pool.reset()?;
        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }
        self.recording = true;
        Ok(())
    }

    fn end(&mut self) -> RhiResult<()> {
        if !self.recording {
            return Err(RhiError::InvalidUsage(format!(
                "command list '{}' closed without begin",
                self.label
            )));
        }
        unsafe { self.device.handle().end_command_buffer(self.buffer)? };
        self.recording = false;
        Ok(())
    }

    // =========================================================================
    // Transitions and passes
    // =========================================================================

    fn transition_back_buffer(&mut self, target: &VulkanBackBuffer, from: TargetState, to: TargetState) {
        self.image_barrier(target.image, vk::ImageAspectFlags::COLOR, from, to);
    }

    fn transition_depth(&mut self, target: &DepthImage, from: TargetState, to: TargetState) {
        self.image_barrier(target.image(), vk::ImageAspectFlags::DEPTH, from, to);
    }

    fn begin_pass(
        &mut self,
        color: &VulkanBackBuffer,
        depth: Option<&DepthImage>,
        clear: Option<&ClearValues>,
    ) {
        let load_op = if clear.is_some() {
            vk::AttachmentLoadOp::CLEAR
        } else {
            vk::AttachmentLoadOp::LOAD
        };
        let clear = clear.copied().unwrap_or(ClearValues::with_color([0.0; 4]));

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(color.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear.color,
                },
            });

        let depth_attachment = depth.map(|depth| {
            vk::RenderingAttachmentInfo::default()
                .image_view(depth.image_view())
                .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                .load_op(load_op)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: clear.depth,
                        stencil: clear.stencil,
                    },
                })
        });

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: color.extent.width,
                    height: color.extent.height,
                },
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment));
        if let Some(depth_attachment) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth_attachment);
        }

        unsafe {
            self.device
                .handle()
                .cmd_begin_rendering(self.buffer, &rendering_info);
        }
    }

    fn end_pass(&mut self) {
        unsafe { self.device.handle().cmd_end_rendering(self.buffer) };
    }

    // =========================================================================
    // Dynamic State
    // =========================================================================

    fn set_viewport(&mut self, viewport: &Viewport) {
        let viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe {
            self.device
                .handle()
                .cmd_set_viewport(self.buffer, 0, std::slice::from_ref(&viewport));
        }
    }

    fn set_scissor(&mut self, scissor: &ScissorRect) {
        let rect = vk::Rect2D {
            offset: vk::Offset2D {
                x: scissor.x,
                y: scissor.y,
            },
            extent: vk::Extent2D {
                width: scissor.width,
                height: scissor.height,
            },
        };
        unsafe {
            self.device
                .handle()
                .cmd_set_scissor(self.buffer, 0, std::slice::from_ref(&rect));
        }
    }

    // =========================================================================
    // Binding and drawing
    // =========================================================================

    fn bind_pipeline(&mut self, pipeline: &GraphicsPipeline) {
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.handle(),
            );
        }
    }

    fn bind_vertex_buffer(&mut self, buffer: &Buffer, offset: u64) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_vertex_buffers(self.buffer, 0, &[buffer.handle()], &[offset]);
        }
    }

    fn bind_index_buffer(&mut self, buffer: &Buffer, offset: u64) {
        unsafe {
            self.device.handle().cmd_bind_index_buffer(
                self.buffer,
                buffer.handle(),
                offset,
                vk::IndexType::UINT32,
            );
        }
    }

    fn bind_constants(&mut self, pipeline: &GraphicsPipeline, per_frame: u32, per_object: u32) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout(),
                0,
                &[pipeline.constant_set()],
                &[per_frame, per_object],
            );
        }
    }

    fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) {
        unsafe {
            self.device
                .handle()
                .cmd_draw_indexed(self.buffer, index_count, 1, start_index, base_vertex, 0);
        }
    }

    fn copy_buffer(&mut self, src: &Buffer, dst: &Buffer, region: CopyRegion) {
        let copy = vk::BufferCopy {
            src_offset: region.src_offset,
            dst_offset: region.dst_offset,
            size: region.size,
        };
        unsafe {
            self.device.handle().cmd_copy_buffer(
                self.buffer,
                src.handle(),
                dst.handle(),
                std::slice::from_ref(&copy),
            );
        }
    }
}

impl Drop for CommandList {
    fn drop(&mut self) {
        // Freed together with the pool.
        debug!("Destroyed command list '{}'", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_mapping() {
        assert_eq!(image_layout(TargetState::Present), vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(
            image_layout(TargetState::RenderTarget),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            image_layout(TargetState::DepthWrite),
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn test_back_buffer_write_discards_previous_layout() {
        let barrier = transition_barrier(TargetState::Present, TargetState::RenderTarget);
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.dst_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn test_present_transition_waits_on_color_output() {
        let barrier = transition_barrier(TargetState::RenderTarget, TargetState::Present);
        assert_eq!(barrier.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(barrier.src_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
    }

    #[test]
    fn test_depth_transition() {
        let barrier = transition_barrier(TargetState::Undefined, TargetState::DepthWrite);
        assert_eq!(barrier.new_layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        assert!(barrier.dst_access.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn test_command_list_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandList>();
    }
}
