//! Descriptor set layout and pool for the constant arena.
//!
//! The scene pipeline uses one set with two dynamic uniform buffers, both
//! pointing into the per-frame constant arena:
//!
//! | set | binding | contents            |
//! |-----|---------|---------------------|
//! | 0   | 0       | per-frame constants |
//! | 0   | 1       | per-object constants|
//!
//! The descriptor is written once; each draw selects its slices through
//! dynamic offsets, so nothing here changes per frame.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Binding of the per-frame constants in set 0.
pub const PER_FRAME_BINDING: u32 = 0;
/// Binding of the per-object constants in set 0.
pub const PER_OBJECT_BINDING: u32 = 1;

/// Descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn new(device: Arc<Device>, bindings: &[vk::DescriptorSetLayoutBinding]) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!("Created descriptor set layout with {} binding(s)", bindings.len());

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool wrapper. Sets are released with the pool.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    pub fn new(device: Arc<Device>, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!("Created descriptor pool: max_sets={}", max_sets);

        Ok(Self { device, pool })
    }

    /// Allocates one set per layout.
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Layout bindings of the constant set.
pub fn constant_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
    [
        dynamic_uniform_binding(PER_FRAME_BINDING, stages),
        dynamic_uniform_binding(PER_OBJECT_BINDING, stages),
    ]
}

#[inline]
fn dynamic_uniform_binding(binding: u32, stage_flags: vk::ShaderStageFlags) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
        .descriptor_count(1)
        .stage_flags(stage_flags)
}

/// Points both constant bindings of `set` at `arena`.
///
/// `per_frame_size` and `per_object_size` are the ranges visible through
/// each binding; the dynamic offset supplies the start.
pub fn write_constant_set(
    device: &Device,
    set: vk::DescriptorSet,
    arena: vk::Buffer,
    per_frame_size: u64,
    per_object_size: u64,
) {
    let per_frame = [vk::DescriptorBufferInfo::default()
        .buffer(arena)
        .offset(0)
        .range(per_frame_size)];
    let per_object = [vk::DescriptorBufferInfo::default()
        .buffer(arena)
        .offset(0)
        .range(per_object_size)];

    let writes = [
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(PER_FRAME_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
            .buffer_info(&per_frame),
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(PER_OBJECT_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
            .buffer_info(&per_object),
    ];

    unsafe {
        device.handle().update_descriptor_sets(&writes, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_bindings_are_dynamic_uniforms() {
        let bindings = constant_bindings();
        assert_eq!(bindings[0].binding, PER_FRAME_BINDING);
        assert_eq!(bindings[1].binding, PER_OBJECT_BINDING);
        for binding in &bindings {
            assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC);
            assert_eq!(binding.descriptor_count, 1);
            assert!(binding.stage_flags.contains(vk::ShaderStageFlags::VERTEX));
        }
    }
}
