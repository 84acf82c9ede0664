//! GPU buffers backed by gpu-allocator.
//!
//! # Overview
//!
//! - [`Buffer`] wraps a `VkBuffer` and its allocation.
//! - The neutral [`BufferUsage`] decides both the Vulkan usage flags and the
//!   memory location: geometry lives in device-local memory and is filled
//!   by a copy, every other usage is host visible and stays mapped.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::device::Device;
//! use ember_rhi::buffer::Buffer;
//! use ember_rhi::{BufferUsage, GpuBuffer};
//!
//! # fn example(device: Arc<Device>) -> Result<(), ember_rhi::RhiError> {
//! let mut upload = Buffer::new(device, "upload", BufferUsage::Upload, 64)?;
//! upload.write(0, &[0u8; 64])?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::backend::GpuBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::types::BufferUsage;

/// Vulkan usage flags for a neutral buffer usage.
pub fn vk_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Geometry => {
            vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::INDEX_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST
                | vk::BufferUsageFlags::TRANSFER_SRC
        }
        BufferUsage::Constants => vk::BufferUsageFlags::UNIFORM_BUFFER,
        BufferUsage::Upload => vk::BufferUsageFlags::TRANSFER_SRC,
        BufferUsage::Readback => vk::BufferUsageFlags::TRANSFER_DST,
    }
}

/// Memory location for a neutral buffer usage.
pub fn memory_location(usage: BufferUsage) -> MemoryLocation {
    match usage {
        BufferUsage::Geometry => MemoryLocation::GpuOnly,
        BufferUsage::Constants | BufferUsage::Upload => MemoryLocation::CpuToGpu,
        BufferUsage::Readback => MemoryLocation::GpuToCpu,
    }
}

/// Vulkan buffer with allocator-managed memory.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
    label: String,
}

impl Buffer {
    /// Creates a buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero, or if buffer creation, memory
    /// allocation or binding fails.
    pub fn new(
        device: Arc<Device>,
        label: &str,
        usage: BufferUsage,
        size: vk::DeviceSize,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidUsage(format!(
                "buffer '{label}' must be larger than 0 bytes"
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(vk_usage(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device.lock_allocator().and_then(|mut allocator| {
            Ok(allocator.allocate(&AllocationCreateDesc {
                name: label,
                requirements,
                location: memory_location(usage),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        debug!("Created {} buffer '{}': {} bytes", usage.name(), label, size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
            label: label.to_string(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn mapped(&self, offset: u64, len: u64) -> RhiResult<*mut u8> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => {}
            _ => {
                return Err(RhiError::OutOfBounds {
                    offset,
                    len,
                    size: self.size,
                });
            }
        }

        let ptr = self
            .allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .ok_or_else(|| {
                RhiError::InvalidUsage(format!("buffer '{}' is not host visible", self.label))
            })?;

        // Safety: the range was checked against the allocation size above.
        Ok(unsafe { (ptr.as_ptr() as *mut u8).add(offset as usize) })
    }
}

impl GpuBuffer for Buffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let dst = self.mapped(offset, data.len() as u64)?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    fn read(&self, offset: u64, len: u64) -> RhiResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let src = self.mapped(offset, len)?;
        let mut out = vec![0u8; len as usize];
        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, out.as_mut_ptr(), out.len());
        }
        Ok(out)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self
                .device
                .allocator()
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free buffer '{}': {:?}", self.label, e);
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer '{}'", self.usage.name(), self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_usage_flags() {
        let flags = vk_usage(BufferUsage::Geometry);
        assert!(flags.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
        assert!(flags.contains(vk::BufferUsageFlags::INDEX_BUFFER));
        assert!(flags.contains(vk::BufferUsageFlags::TRANSFER_DST));
    }

    #[test]
    fn test_copy_endpoints() {
        assert!(vk_usage(BufferUsage::Upload).contains(vk::BufferUsageFlags::TRANSFER_SRC));
        assert!(vk_usage(BufferUsage::Readback).contains(vk::BufferUsageFlags::TRANSFER_DST));
        assert!(vk_usage(BufferUsage::Constants).contains(vk::BufferUsageFlags::UNIFORM_BUFFER));
    }

    #[test]
    fn test_memory_locations() {
        assert_eq!(memory_location(BufferUsage::Geometry), MemoryLocation::GpuOnly);
        assert_eq!(memory_location(BufferUsage::Constants), MemoryLocation::CpuToGpu);
        assert_eq!(memory_location(BufferUsage::Upload), MemoryLocation::CpuToGpu);
        assert_eq!(memory_location(BufferUsage::Readback), MemoryLocation::GpuToCpu);
    }

    #[test]
    fn test_buffer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Buffer>();
    }
}
