//! Graphics pipeline for the scene pass.
//!
//! # Overview
//!
//! - [`PipelineLayout`] wraps `VkPipelineLayout`.
//! - [`RasterState`] holds the fixed-function knobs; its default is the
//!   scene pass. Viewport and scissor are dynamic.
//! - [`GraphicsPipeline`] is the object handed to the renderer. It owns the
//!   constant descriptor set (see [`crate::descriptor`]) together with the
//!   layout and pipeline, so binding constants only needs dynamic offsets.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::descriptor::{self, DescriptorPool, DescriptorSetLayout};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{ShaderModule, ShaderStage};
use crate::types::PipelineDesc;
use crate::vulkan::{VulkanDevice, vk_format, vk_vertex_format};

pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(device: Arc<Device>, descriptor_set_layouts: &[vk::DescriptorSetLayout]) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(descriptor_set_layouts);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} descriptor set layout(s)",
            descriptor_set_layouts.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Fixed-function state of a pipeline. The default is the scene pass:
/// filled triangle lists, back faces culled with counter-clockwise front
/// faces, and a `LESS` depth test that writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterState {
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: vk::CompareOp,
    pub samples: vk::SampleCountFlags,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            depth_compare: vk::CompareOp::LESS,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }
}

/// Viewport and scissor are always set per pass.
const DYNAMIC_STATES: [vk::DynamicState; 2] = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Everything a dynamic-rendering graphics pipeline is built from.
struct PipelineParts<'a> {
    vertex: &'a ShaderModule,
    fragment: &'a ShaderModule,
    binding: vk::VertexInputBindingDescription,
    attributes: &'a [vk::VertexInputAttributeDescription],
    color_format: vk::Format,
    depth_format: Option<vk::Format>,
    raster: RasterState,
}

fn create_pipeline(device: &Device, layout: &PipelineLayout, parts: &PipelineParts<'_>) -> RhiResult<vk::Pipeline> {
    let stages = [parts.vertex.stage_create_info(), parts.fragment.stage_create_info()];
    let raster = parts.raster;

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(std::slice::from_ref(&parts.binding))
        .vertex_attribute_descriptions(parts.attributes);
    let input_assembly =
        vk::PipelineInputAssemblyStateCreateInfo::default().topology(vk::PrimitiveTopology::TRIANGLE_LIST);
    let viewport = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);
    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(raster.cull_mode)
        .front_face(raster.front_face);
    let multisample = vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(raster.samples);

    // Without a depth attachment the depth test would read garbage.
    let has_depth = parts.depth_format.is_some();
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(has_depth && raster.depth_test)
        .depth_write_enable(has_depth && raster.depth_write)
        .depth_compare_op(raster.depth_compare)
        .max_depth_bounds(1.0);

    let blend_attachment =
        vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA);
    let color_blend =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(std::slice::from_ref(&blend_attachment));
    let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

    let color_formats = [parts.color_format];
    let mut rendering = vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);
    if let Some(depth_format) = parts.depth_format {
        rendering = rendering.depth_attachment_format(depth_format);
    }

    let create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic)
        .layout(layout.handle())
        .push_next(&mut rendering);

    let pipelines = unsafe {
        device
            .handle()
            .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&create_info), None)
            .map_err(|(_, result)| result)?
    };
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".to_string()))
}

/// Scene pipeline plus the descriptor set that exposes the constant arena.
pub struct GraphicsPipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    layout: PipelineLayout,
    constant_set: vk::DescriptorSet,
    // Dropped after the pipeline; the set is freed with the pool.
    _descriptor_pool: DescriptorPool,
    _set_layout: DescriptorSetLayout,
    label: String,
}

impl GraphicsPipeline {
    pub fn new(device: &VulkanDevice, desc: &PipelineDesc<'_, VulkanDevice>) -> RhiResult<Self> {
        let raw = device.raw().clone();

        let set_layout = DescriptorSetLayout::new(raw.clone(), &descriptor::constant_bindings())?;
        let pool_size = vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
            .descriptor_count(2);
        let descriptor_pool = DescriptorPool::new(raw.clone(), 1, std::slice::from_ref(&pool_size))?;
        let constant_set = descriptor_pool
            .allocate(&[set_layout.handle()])?
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::PipelineError("no descriptor set allocated".to_string()))?;
        descriptor::write_constant_set(
            &raw,
            constant_set,
            desc.constant_arena.handle(),
            desc.per_frame_size,
            desc.per_object_size,
        );

        let layout = PipelineLayout::new(raw.clone(), &[set_layout.handle()])?;

        let vertex_shader = ShaderModule::from_spirv_bytes(raw.clone(), desc.vertex_spirv, ShaderStage::Vertex)?;
        let fragment_shader =
            ShaderModule::from_spirv_bytes(raw.clone(), desc.fragment_spirv, ShaderStage::Fragment)?;

        let binding = vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(desc.vertex_stride)
            .input_rate(vk::VertexInputRate::VERTEX);
        let attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .vertex_attributes
            .iter()
            .map(|attribute| {
                vk::VertexInputAttributeDescription::default()
                    .location(attribute.location)
                    .binding(0)
                    .format(vk_vertex_format(attribute.format))
                    .offset(attribute.offset)
            })
            .collect();

        let parts = PipelineParts {
            vertex: &vertex_shader,
            fragment: &fragment_shader,
            binding,
            attributes: &attributes,
            color_format: vk_format(desc.color_format),
            depth_format: Some(vk_format(desc.depth_format)),
            raster: RasterState::default(),
        };
        let pipeline = create_pipeline(&raw, &layout, &parts)?;

        info!("Graphics pipeline '{}' created", desc.label);

        Ok(Self {
            device: raw,
            pipeline,
            layout,
            constant_set,
            _descriptor_pool: descriptor_pool,
            _set_layout: set_layout,
            label: desc.label.to_string(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }

    #[inline]
    pub fn constant_set(&self) -> vk::DescriptorSet {
        self.constant_set
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("Graphics pipeline '{}' destroyed", self.label);
    }
}
