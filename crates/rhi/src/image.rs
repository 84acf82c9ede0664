//! Depth attachment image.
//!
//! [`DepthImage`] is a `D32_SFLOAT` image with one mip level and one sample,
//! allocated from device-local memory. It is recreated on resize; nothing
//! else about the frame depends on its size.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, info};

use crate::backend::RenderTarget;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::types::Extent2d;

pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

pub struct DepthImage {
    device: Arc<Device>,
    image: vk::Image,
    image_view: vk::ImageView,
    allocation: Option<Allocation>,
    extent: Extent2d,
}

impl DepthImage {
    /// Creates a depth image of `extent`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidUsage`] for an empty extent, or the
    /// Vulkan/allocator error if creation fails.
    pub fn new(device: Arc<Device>, extent: Extent2d) -> RhiResult<Self> {
        if extent.is_empty() {
            return Err(RhiError::InvalidUsage(
                "Depth image dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = {
            let mut allocator = device.lock_allocator()?;
            allocator.allocate(&AllocationCreateDesc {
                name: "depth_image",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        // From here on Drop releases whatever has been created.
        let mut depth = Self {
            device,
            image,
            image_view: vk::ImageView::null(),
            allocation: Some(allocation),
            extent,
        };

        if let Some(allocation) = depth.allocation.as_ref() {
            unsafe {
                depth
                    .device
                    .handle()
                    .bind_image_memory(image, allocation.memory(), allocation.offset())?;
            }
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::DEPTH)
                    .level_count(1)
                    .layer_count(1),
            );
        depth.image_view = unsafe { depth.device.handle().create_image_view(&view_info, None)? };

        info!("Created depth image: {}", extent);

        Ok(depth)
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }
}

impl RenderTarget for DepthImage {
    fn extent(&self) -> Extent2d {
        self.extent
    }
}

impl Drop for DepthImage {
    fn drop(&mut self) {
        unsafe {
            if self.image_view != vk::ImageView::null() {
                self.device.handle().destroy_image_view(self.image_view, None);
            }
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self
                .device
                .allocator()
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free depth image memory: {:?}", e);
            }
        }

        debug!("Destroyed depth image {}", self.extent);
    }
}
