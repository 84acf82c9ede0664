//! Swapchain management for presenting rendered images.
//!
//! # Overview
//!
//! [`Swapchain`] owns the `VkSwapchainKHR`, its image views and the binary
//! semaphores that order acquisition, rendering and presentation:
//!
//! - one *acquire* semaphore per frame ring slot, reused once that slot's
//!   fence has been waited on;
//! - one *render finished* semaphore per swapchain image, since presentation
//!   of an image is what consumes it.
//!
//! It implements [`SwapChain`] for [`VulkanDevice`]. The host owns it and
//! lends it to the renderer per call.
//!
//! # Recreation
//!
//! [`SwapChain::resize`] passes the old handle as `old_swapchain` so the
//! driver can recycle resources, then destroys it. Callers must have
//! flushed the GPU first.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::backend::SwapChain;
use crate::device::{Device, map_device_lost};
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::sync::Semaphore;
use crate::types::{Extent2d, PresentStatus, TextureFormat};
use crate::vulkan::{VulkanBackBuffer, VulkanDevice, texture_format};

#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities =
            unsafe { surface_loader.get_physical_device_surface_capabilities(physical_device, surface)? };
        let formats = unsafe { surface_loader.get_physical_device_surface_formats(physical_device, surface)? };
        let present_modes =
            unsafe { surface_loader.get_physical_device_surface_present_modes(physical_device, surface)? };

        debug!(
            "Swapchain support: {} formats, {} present modes, min image count {}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Handles that change on every recreation.
struct Chain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    vsync: bool,
    chain: Chain,
    acquire_semaphores: Vec<Semaphore>,
    render_finished: Vec<Semaphore>,
}

impl Swapchain {
    /// Creates a swapchain for `surface`. The surface must outlive it.
    pub fn new(
        instance: &Instance,
        device: &VulkanDevice,
        surface: vk::SurfaceKHR,
        extent: Extent2d,
        vsync: bool,
    ) -> RhiResult<Self> {
        let device = device.raw().clone();
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let chain = create_chain(
            &device,
            &swapchain_loader,
            &surface_loader,
            surface,
            extent,
            vsync,
            vk::SwapchainKHR::null(),
        )?;
        let render_finished = (0..chain.images.len())
            .map(|_| Semaphore::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        Ok(Self {
            device,
            swapchain_loader,
            surface_loader,
            surface,
            vsync,
            chain,
            acquire_semaphores: Vec::new(),
            render_finished,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.chain.swapchain
    }

    fn acquire_semaphore(&mut self, frame_slot: usize) -> RhiResult<vk::Semaphore> {
        while self.acquire_semaphores.len() <= frame_slot {
            self.acquire_semaphores.push(Semaphore::new(self.device.clone())?);
        }
        Ok(self.acquire_semaphores[frame_slot].handle())
    }

    fn destroy_chain(&mut self) {
        destroy_image_views(&self.device, &mut self.chain.image_views);
        if self.chain.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(self.chain.swapchain, None);
            }
            self.chain.swapchain = vk::SwapchainKHR::null();
        }
    }
}

impl SwapChain<VulkanDevice> for Swapchain {
    fn extent(&self) -> Extent2d {
        Extent2d::new(self.chain.extent.width, self.chain.extent.height)
    }

    fn format(&self) -> TextureFormat {
        // Validated when the chain was created.
        texture_format(self.chain.format).unwrap_or(TextureFormat::Bgra8Unorm)
    }

    fn image_count(&self) -> usize {
        self.chain.images.len()
    }

    fn acquire(&mut self, frame_slot: usize) -> RhiResult<Option<VulkanBackBuffer>> {
        let image_available = self.acquire_semaphore(frame_slot)?;

        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.chain.swapchain,
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        };

        let index = match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    debug!("Acquired image {} from a suboptimal swapchain", index);
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Ok(None),
            Err(e) => return Err(map_device_lost(e)),
        };

        let slot = index as usize;
        Ok(Some(VulkanBackBuffer {
            index,
            image: self.chain.images[slot],
            view: self.chain.image_views[slot],
            extent: self.extent(),
            image_available,
            render_finished: self.render_finished[slot].handle(),
        }))
    }

    fn present(&mut self, back_buffer: VulkanBackBuffer) -> RhiResult<PresentStatus> {
        let swapchains = [self.chain.swapchain];
        let image_indices = [back_buffer.index];
        let wait_semaphores = [back_buffer.render_finished];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = self.device.with_queue_lock(|| unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue(), &present_info)
        });

        match result {
            Ok(false) => Ok(PresentStatus::Presented),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err(map_device_lost(e)),
        }
    }

    fn resize(&mut self, extent: Extent2d) -> RhiResult<()> {
        self.device.wait_idle()?;

        info!("Recreating swapchain for new size: {}", extent);

        destroy_image_views(&self.device, &mut self.chain.image_views);
        let old_swapchain = self.chain.swapchain;
        let chain = create_chain(
            &self.device,
            &self.swapchain_loader,
            &self.surface_loader,
            self.surface,
            extent,
            self.vsync,
            old_swapchain,
        )?;
        unsafe {
            self.swapchain_loader.destroy_swapchain(old_swapchain, None);
        }
        self.chain = chain;

        if self.render_finished.len() != self.chain.images.len() {
            self.render_finished = (0..self.chain.images.len())
                .map(|_| Semaphore::new(self.device.clone()))
                .collect::<RhiResult<Vec<_>>>()?;
        }
        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        let extent = self.chain.extent;
        let images = self.chain.images.len();
        self.destroy_chain();
        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            extent.width, extent.height, images
        );
    }
}

fn create_chain(
    device: &Device,
    swapchain_loader: &ash::khr::swapchain::Device,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    requested: Extent2d,
    vsync: bool,
    old_swapchain: vk::SwapchainKHR,
) -> RhiResult<Chain> {
    let support = SwapchainSupportDetails::query(device.physical_device(), surface, surface_loader)?;
    if !support.is_adequate() {
        return Err(RhiError::SwapchainError(
            "Inadequate swapchain support (no formats or present modes)".to_string(),
        ));
    }

    let surface_format = choose_surface_format(&support.formats)?;
    let present_mode = choose_present_mode(&support.present_modes, vsync);
    let extent = choose_extent(&support.capabilities, requested.width, requested.height);
    let image_count = determine_image_count(&support.capabilities);

    info!(
        "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
        extent.width, extent.height, surface_format.format, present_mode, image_count
    );

    let queue_families = device.queue_families();
    let (Some(graphics_family), Some(present_family)) =
        (queue_families.graphics_family, queue_families.present_family)
    else {
        return Err(RhiError::NoSuitableGpu);
    };
    let queue_family_indices = [graphics_family, present_family];
    let (sharing_mode, queue_family_indices) = if graphics_family != present_family {
        (vk::SharingMode::CONCURRENT, queue_family_indices.as_slice())
    } else {
        (vk::SharingMode::EXCLUSIVE, &[][..])
    };

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(sharing_mode)
        .queue_family_indices(queue_family_indices)
        .pre_transform(support.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(old_swapchain);

    let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };
    let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };
    let image_views = match create_image_views(device, &images, surface_format.format) {
        Ok(views) => views,
        Err(e) => {
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            return Err(e);
        }
    };

    info!("Swapchain created with {} images", images.len());

    Ok(Chain {
        swapchain,
        images,
        image_views,
        format: surface_format.format,
        extent,
    })
}

fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> RhiResult<vk::SurfaceFormatKHR> {
    let srgb = |format: vk::Format| {
        formats
            .iter()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
    };

    if let Some(format) = srgb(vk::Format::B8G8R8A8_SRGB) {
        return Ok(format);
    }
    if let Some(format) = srgb(vk::Format::B8G8R8A8_UNORM) {
        warn!("Using fallback surface format: B8G8R8A8_UNORM");
        return Ok(format);
    }

    formats
        .iter()
        .find(|f| texture_format(f.format).is_some())
        .copied()
        .ok_or_else(|| RhiError::SwapchainError("No supported 8-bit RGBA surface format".to_string()))
}

fn choose_present_mode(present_modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync {
        for mode in [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE] {
            if present_modes.contains(&mode) {
                return mode;
            }
        }
    }
    // Always available.
    vk::PresentModeKHR::FIFO
}

fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_views(device: &Device, images: &[vk::Image], format: vk::Format) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );

        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => image_views.push(view),
            Err(e) => {
                destroy_image_views(device, &mut image_views);
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create image view {}: {:?}",
                    i, e
                )));
            }
        }
    }

    Ok(image_views)
}

fn destroy_image_views(device: &Device, image_views: &mut Vec<vk::ImageView>) {
    for image_view in image_views.drain(..) {
        unsafe {
            device.handle().destroy_image_view(image_view, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = vec![
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
            surface_format(vk::Format::B8G8R8A8_UNORM),
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_choose_surface_format_fallback() {
        let formats = vec![surface_format(vk::Format::R8G8B8A8_UNORM)];
        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_surface_format_rejects_unknown() {
        let formats = vec![surface_format(vk::Format::R16G16B16A16_SFLOAT)];
        assert!(matches!(
            choose_surface_format(&formats),
            Err(RhiError::SwapchainError(_))
        ));
    }

    #[test]
    fn test_vsync_selects_fifo() {
        let modes = vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_no_vsync_prefers_mailbox() {
        let modes = vec![
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::MAILBOX);

        let modes = vec![vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 3000, 3000);
        assert_eq!((extent.width, extent.height), (2000, 2000));

        let extent = choose_extent(&capabilities, 50, 50);
        assert_eq!((extent.width, extent.height), (100, 100));

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_determine_image_count() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);

        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);

        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);
    }
}
