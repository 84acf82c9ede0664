//! Vulkan implementation of the backend traits.
//!
//! [`VulkanDevice`] ties the wrappers of this crate together behind
//! [`GpuDevice`]: buffers come from gpu-allocator, fences are timeline
//! semaphores, command lists own their pool and the depth target is a
//! [`DepthImage`]. Back buffers are produced by [`crate::swapchain::Swapchain`].

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::backend::{GpuDevice, RenderTarget};
use crate::buffer::Buffer;
use crate::command::CommandList;
use crate::device::Device;
use crate::error::RhiResult;
use crate::image::DepthImage;
use crate::physical_device::PhysicalDeviceInfo;
use crate::pipeline::GraphicsPipeline;
use crate::sync::TimelineFence;
use crate::types::{BufferDesc, DeviceLimits, Extent2d, PipelineDesc, TextureFormat, VertexFormat};

pub struct VulkanDevice {
    device: Arc<Device>,
    adapter_name: String,
    limits: DeviceLimits,
}

impl VulkanDevice {
    pub fn new(device: Arc<Device>, physical_device: &PhysicalDeviceInfo) -> Self {
        let adapter_name = physical_device.device_name();
        info!("Using adapter '{}'", adapter_name);
        Self {
            device,
            adapter_name,
            limits: physical_device.limits(),
        }
    }

    /// The wrapped logical device.
    #[inline]
    pub fn raw(&self) -> &Arc<Device> {
        &self.device
    }
}

/// A swapchain image acquired for one frame.
///
/// The semaphores are owned by the swapchain; this is a plain handle bundle
/// valid until the image is presented.
#[derive(Debug, Clone, Copy)]
pub struct VulkanBackBuffer {
    pub index: u32,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: Extent2d,
    /// Signaled by acquisition; the frame's submission waits on it.
    pub image_available: vk::Semaphore,
    /// Signaled by the frame's submission; presentation waits on it.
    pub render_finished: vk::Semaphore,
}

impl RenderTarget for VulkanBackBuffer {
    fn extent(&self) -> Extent2d {
        self.extent
    }
}

impl GpuDevice for VulkanDevice {
    type Buffer = Buffer;
    type Fence = TimelineFence;
    type CommandList = CommandList;
    type DepthTarget = DepthImage;
    type BackBuffer = VulkanBackBuffer;
    type Pipeline = GraphicsPipeline;

    fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> RhiResult<Buffer> {
        Buffer::new(self.device.clone(), desc.label, desc.usage, desc.size)
    }

    fn create_fence(&self, label: &str) -> RhiResult<TimelineFence> {
        TimelineFence::new(self.device.clone(), label)
    }

    fn create_command_list(&self, label: &str) -> RhiResult<CommandList> {
        CommandList::new(self.device.clone(), label)
    }

    fn create_depth_target(&self, extent: Extent2d) -> RhiResult<DepthImage> {
        DepthImage::new(self.device.clone(), extent)
    }

    fn create_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> RhiResult<GraphicsPipeline> {
        GraphicsPipeline::new(self, desc)
    }

    fn submit(&self, list: &CommandList, target: Option<&VulkanBackBuffer>) -> RhiResult<()> {
        let command_buffers = [list.handle()];
        let wait_semaphores: Vec<vk::Semaphore> = target.iter().map(|t| t.image_available).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = target
            .iter()
            .map(|_| vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .collect();
        let signal_semaphores: Vec<vk::Semaphore> = target.iter().map(|t| t.render_finished).collect();

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit_graphics(std::slice::from_ref(&submit_info), vk::Fence::null())
        }
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }
}

/// Vulkan format of a texture format.
pub fn vk_format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
    }
}

/// Inverse of [`vk_format`] for the formats the renderer understands.
pub fn texture_format(format: vk::Format) -> Option<TextureFormat> {
    match format {
        vk::Format::B8G8R8A8_SRGB => Some(TextureFormat::Bgra8Srgb),
        vk::Format::B8G8R8A8_UNORM => Some(TextureFormat::Bgra8Unorm),
        vk::Format::R8G8B8A8_SRGB => Some(TextureFormat::Rgba8Srgb),
        vk::Format::R8G8B8A8_UNORM => Some(TextureFormat::Rgba8Unorm),
        vk::Format::D32_SFLOAT => Some(TextureFormat::Depth32Float),
        _ => None,
    }
}

pub fn vk_vertex_format(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::Float32x2 => vk::Format::R32G32_SFLOAT,
        VertexFormat::Float32x3 => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::Float32x4 => vk::Format::R32G32B32A32_SFLOAT,
    }
}
