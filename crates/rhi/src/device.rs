//! Vulkan logical device and queue management.
//!
//! # Overview
//!
//! [`Device`] owns the `VkDevice`, its graphics and present queues and the
//! gpu-allocator instance every buffer and image allocates from. It is
//! shared as `Arc<Device>` by all Vulkan objects so none of them can outlive
//! it.
//!
//! Enabled on top of Vulkan 1.3 core:
//! - `VK_KHR_swapchain`
//! - dynamic rendering (1.3 feature)
//! - timeline semaphores (1.2 feature), backing the frame fence

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// The device is shared across threads through `Arc`. The allocator sits
/// behind a `Mutex`; queue submission is serialized by `queue_lock`.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
    queue_lock: Mutex<()>,
}

impl Device {
    /// Creates the logical device and its allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation or allocator initialization
    /// fails, or if the selected GPU lacks a required queue family.
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let queue_families = physical_device_info.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };

        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique_families()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) (graphics family {}, present family {})",
            queue_create_infos.len(),
            graphics_family,
            present_family
        );

        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);
        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features_1_2)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };
        info!("Logical device created on '{}'", physical_device_info.device_name());

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };
        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            queue_families,
            queue_lock: Mutex::new(()),
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// The allocator mutex, for callers that must not fail (drops).
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Locks the allocator, reporting a poisoned lock as an error.
    pub fn lock_allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| RhiError::InvalidUsage("GPU allocator lock poisoned".to_string()))
    }

    /// Blocks until every queue is idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits to the graphics queue.
    ///
    /// # Safety
    ///
    /// Every command buffer and semaphore referenced by `submits` must be
    /// valid, and command buffers must be in the executable state.
    pub unsafe fn submit_graphics(&self, submits: &[vk::SubmitInfo<'_>], fence: vk::Fence) -> RhiResult<()> {
        let _guard = self.queue_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submits, fence)
                .map_err(map_device_lost)?;
        }
        Ok(())
    }

    /// Runs `f` with the queue lock held, for presentation.
    pub fn with_queue_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.queue_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f()
    }
}

/// Lifts `ERROR_DEVICE_LOST` into [`RhiError::DeviceLost`].
pub fn map_device_lost(result: vk::Result) -> RhiError {
    if result == vk::Result::ERROR_DEVICE_LOST {
        RhiError::DeviceLost
    } else {
        RhiError::VulkanError(result)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // The allocator frees its memory blocks through the device, so it
            // goes first.
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: Device is Send + Sync because:
// - ash::Device is Send + Sync
// - vk::PhysicalDevice and vk::Queue are plain handles
// - the allocator is behind a Mutex and queue access behind queue_lock
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }

    #[test]
    fn test_device_lost_mapping() {
        assert!(matches!(
            map_device_lost(vk::Result::ERROR_DEVICE_LOST),
            RhiError::DeviceLost
        ));
        assert!(matches!(
            map_device_lost(vk::Result::ERROR_OUT_OF_HOST_MEMORY),
            RhiError::VulkanError(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
        ));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
