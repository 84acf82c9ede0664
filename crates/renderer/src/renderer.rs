//! Frame orchestrator.
//!
//! This module provides the [`Renderer`], which owns the frame ring, the
//! constant allocator, the static geometry pool, the view heaps, the depth
//! target and the scene pipeline, and records one frame per
//! [`render_frame`](Renderer::render_frame) call.
//!
//! # Frame Sequence
//!
//! ```text
//! Idle -> AcquireContext -> TransitionTargetsForWrite -> Clear
//!      -> BindPipelineState -> RecordDraws -> RecordUiOverlay
//!      -> TransitionTargetsForPresent -> Submit -> Idle
//! ```
//!
//! Each step is checked against [`FramePhase::next`].
//!
//! # Resource Lifetimes
//!
//! - Static geometry and the pipeline live as long as the renderer.
//! - The depth target, viewport and scissor follow the swapchain size and
//!   are recreated by [`on_resize`](Renderer::on_resize).
//! - The swapchain is owned by the host and lent per call.
//!
//! Dropping the renderer flushes the GPU before any resource is released.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use glam::Mat4;
use tracing::{debug, error, info, warn};

use ember_core::{EngineConfig, GameTimer};
use ember_resources::MeshData;
use ember_rhi::shader::{load_spirv, spirv_words};
use ember_rhi::{
    ClearValues, CommandRecorder, Extent2d, GpuDevice, PipelineDesc, PresentStatus, RenderTarget,
    ScissorRect, SwapChain, TargetState, TextureFormat, Vertex, Viewport,
};
use ember_scene::{Camera, DrawArgs, RenderItem, RenderItemId};

use crate::constant_allocator::ConstantAllocator;
use crate::constants::{PerFrameConstants, PerObjectConstants};
use crate::error::{RendererError, RendererResult};
use crate::frame_ring::FrameRing;
use crate::geometry_pool::{StaticGeometryPool, StaticRange};
use crate::phase::FramePhase;
use crate::ui::{OverlayContext, UiState};
use crate::view_heaps::{DescriptorSlot, HeapCapacities, HeapKind, ViewHeaps};

/// SPIR-V bytecode of the scene pipeline.
#[derive(Debug, Clone)]
pub struct ShaderBytecode {
    pub vertex: Vec<u8>,
    pub fragment: Vec<u8>,
}

impl ShaderBytecode {
    /// Loads and validates both stages.
    ///
    /// # Errors
    ///
    /// Missing files and malformed bytecode are reported as backend shader
    /// errors.
    pub fn load(vertex: &Path, fragment: &Path) -> RendererResult<Self> {
        let vertex_bytes = load_spirv(vertex)?;
        let fragment_bytes = load_spirv(fragment)?;
        Self::from_bytes(vertex_bytes, fragment_bytes)
    }

    /// Validates in-memory bytecode.
    pub fn from_bytes(vertex: Vec<u8>, fragment: Vec<u8>) -> RendererResult<Self> {
        spirv_words(&vertex)?;
        spirv_words(&fragment)?;
        Ok(Self { vertex, fragment })
    }
}

/// Per-frame inputs of [`Renderer::render_frame`].
pub struct FrameInputs<'a> {
    pub camera: &'a Camera,
    pub timer: &'a GameTimer,
    pub ui: &'a UiState,
}

/// Result of one [`Renderer::render_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and handed to the presentation engine.
    ///
    /// `suboptimal` means the swapchain no longer matches the surface and
    /// should be resized.
    Presented { fence_value: u64, suboptimal: bool },
    /// No back buffer could be acquired; nothing was submitted.
    Skipped,
}

/// Counters kept by the renderer across frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frames_presented: u64,
    pub frames_skipped: u64,
    /// Draw calls of the last presented frame.
    pub draws_last_frame: u32,
    /// Fence value of the last submitted frame.
    pub last_fence_value: u64,
}

/// Combined ranges of the uploaded geometry.
#[derive(Debug, Clone, Copy)]
struct GeometryRanges {
    vertices: StaticRange,
    indices: StaticRange,
}

/// The frame orchestrator.
pub struct Renderer<D: GpuDevice> {
    device: Arc<D>,
    ring: FrameRing<D>,
    constants: ConstantAllocator<D>,
    geometry: StaticGeometryPool<D>,
    heaps: ViewHeaps,
    back_buffer_views: Vec<DescriptorSlot>,
    depth_view: DescriptorSlot,
    constant_views: [DescriptorSlot; 2],
    depth: D::DepthTarget,
    pipeline: Arc<D::Pipeline>,
    viewport: Viewport,
    scissor: ScissorRect,
    clear: ClearValues,
    items: Vec<RenderItem>,
    /// Draw arguments of every uploaded mesh, keyed by allocation address.
    uploaded_meshes: HashMap<usize, (Arc<MeshData>, DrawArgs)>,
    ranges: Option<GeometryRanges>,
    phase: FramePhase,
    stats: RenderStats,
}

fn mesh_key(mesh: &Arc<MeshData>) -> usize {
    Arc::as_ptr(mesh) as usize
}

impl<D: GpuDevice> Renderer<D> {
    /// Creates every frame-independent resource.
    ///
    /// Takes one RTV per back buffer, one DSV and two constant views from
    /// the heaps, creates the depth target at the swapchain size and builds
    /// the scene pipeline bound to the constant arena.
    pub fn new<S: SwapChain<D>>(
        device: Arc<D>,
        swapchain: &S,
        config: &EngineConfig,
        shaders: &ShaderBytecode,
    ) -> RendererResult<Self> {
        let frame_count = config.frames.frame_count;
        let extent = swapchain.extent();

        info!(
            "Initializing renderer on '{}' ({}, {} frames in flight)",
            device.adapter_name(),
            extent,
            frame_count
        );

        let fence = device.create_fence("frame ring")?;
        let ring = FrameRing::new(device.clone(), fence, frame_count, config.fence_timeout())?;
        let constants =
            ConstantAllocator::new(&*device, frame_count, config.memory.constant_arena_bytes)?;
        let geometry =
            StaticGeometryPool::create_once(device.clone(), config.memory.geometry_pool_bytes)?;

        let mut heaps = ViewHeaps::new(HeapCapacities::from(&config.heaps));
        let back_buffer_views = (0..swapchain.image_count())
            .map(|_| heaps.alloc(HeapKind::Rtv))
            .collect::<RendererResult<Vec<_>>>()?;
        let depth_view = heaps.alloc(HeapKind::Dsv)?;
        let constant_views = [
            heaps.alloc(HeapKind::CbvSrvUav)?,
            heaps.alloc(HeapKind::CbvSrvUav)?,
        ];

        let depth = device.create_depth_target(extent)?;

        let pipeline = device.create_pipeline(&PipelineDesc {
            label: "scene",
            vertex_spirv: &shaders.vertex,
            fragment_spirv: &shaders.fragment,
            vertex_stride: Vertex::STRIDE,
            vertex_attributes: &Vertex::ATTRIBUTES,
            color_format: swapchain.format(),
            depth_format: TextureFormat::Depth32Float,
            constant_arena: constants.arena(),
            per_frame_size: PerFrameConstants::SIZE as u64,
            per_object_size: PerObjectConstants::SIZE as u64,
        })?;

        info!("Renderer initialized");

        Ok(Self {
            device,
            ring,
            constants,
            geometry,
            heaps,
            back_buffer_views,
            depth_view,
            constant_views,
            depth,
            pipeline: Arc::new(pipeline),
            viewport: Viewport::full(extent),
            scissor: ScissorRect::full(extent),
            clear: ClearValues::with_color(config.render.clear_color),
            items: Vec::new(),
            uploaded_meshes: HashMap::new(),
            ranges: None,
            phase: FramePhase::Idle,
            stats: RenderStats::default(),
        })
    }

    // =========================================================================
    // Scene authoring
    // =========================================================================

    /// Adds an instance of `mesh`.
    ///
    /// Before [`upload_geometry`](Self::upload_geometry) any mesh is
    /// accepted. Afterwards only meshes that were part of the upload can be
    /// instanced again.
    ///
    /// # Errors
    ///
    /// [`RendererError::PoolSealed`] for a new mesh after the upload.
    pub fn add_render_item(&mut self, mesh: Arc<MeshData>, transform: Mat4) -> RendererResult<RenderItemId> {
        let mut item = RenderItem::new(mesh, transform);
        if self.geometry.is_sealed() {
            let (_, draw) = self
                .uploaded_meshes
                .get(&mesh_key(item.mesh()))
                .ok_or(RendererError::PoolSealed)?;
            item.set_draw_args(*draw);
        }
        let id = RenderItemId::new(self.items.len());
        self.items.push(item);
        Ok(id)
    }

    /// Replaces the world transform of an item. Only valid between frames.
    pub fn set_transform(&mut self, id: RenderItemId, transform: Mat4) -> RendererResult<()> {
        if self.phase != FramePhase::Idle {
            return Err(RendererError::PhaseOrder {
                from: self.phase,
                to: FramePhase::Idle,
            });
        }
        let item = self
            .items
            .get_mut(id.index())
            .ok_or(RendererError::UnknownItem(id))?;
        item.set_world(transform);
        Ok(())
    }

    /// Uploads the geometry of every item added so far.
    ///
    /// Meshes are deduplicated by `Arc` identity and concatenated in
    /// insertion order into one vertex range and one index range. A mesh's
    /// `base_vertex` is the number of vertices of the unique meshes before
    /// it, its `start_index` the number of their indices.
    pub fn upload_geometry(&mut self) -> RendererResult<()> {
        if self.geometry.is_sealed() {
            return Err(RendererError::PoolSealed);
        }

        let mut vertices: Vec<Vertex> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        let mut meshes: HashMap<usize, (Arc<MeshData>, DrawArgs)> = HashMap::new();

        for item in &self.items {
            let key = mesh_key(item.mesh());
            if meshes.contains_key(&key) {
                continue;
            }
            let mesh = item.mesh();
            let draw = DrawArgs {
                index_count: index_u32(mesh.index_count())?,
                start_index: index_u32(indices.len())?,
                base_vertex: i32::try_from(vertices.len()).map_err(|_| {
                    RendererError::InvalidRequest("vertex count exceeds i32".to_string())
                })?,
            };
            vertices.extend_from_slice(&mesh.vertices);
            indices.extend_from_slice(&mesh.indices);
            meshes.insert(key, (Arc::clone(mesh), draw));
        }

        let ranges = if vertices.is_empty() {
            None
        } else {
            Some(GeometryRanges {
                vertices: self.geometry.alloc_vertex_buffer(&vertices)?,
                indices: self.geometry.alloc_index_buffer(&indices)?,
            })
        };

        let mut list = self.device.create_command_list("static geometry upload")?;
        self.geometry.upload_and_sync(&mut list)?;

        for item in &mut self.items {
            if let Some((_, draw)) = meshes.get(&mesh_key(item.mesh())) {
                item.set_draw_args(*draw);
            }
        }

        info!(
            "Uploaded {} unique meshes for {} items ({} vertices, {} indices)",
            meshes.len(),
            self.items.len(),
            vertices.len(),
            indices.len()
        );

        self.uploaded_meshes = meshes;
        self.ranges = ranges;
        Ok(())
    }

    // =========================================================================
    // Frame
    // =========================================================================

    /// Records, submits and presents one frame.
    ///
    /// `overlay` runs after the scene pass, with the frame's command list
    /// still open and the back buffer still in the render-target state.
    ///
    /// # Errors
    ///
    /// [`RendererError::GeometryNotUploaded`] when items exist but
    /// [`upload_geometry`](Self::upload_geometry) has not run. Every other
    /// error is fatal. A failed frame is closed without being submitted and
    /// the renderer is left idle.
    pub fn render_frame<S, F>(
        &mut self,
        swapchain: &mut S,
        inputs: &FrameInputs<'_>,
        overlay: F,
    ) -> RendererResult<FrameOutcome>
    where
        S: SwapChain<D>,
        F: FnOnce(&mut OverlayContext<'_, D>) -> RendererResult<()>,
    {
        if !self.items.is_empty() && !self.geometry.is_sealed() {
            return Err(RendererError::GeometryNotUploaded);
        }

        // Acquire a context whose previous work has completed.
        FramePhase::advance(&mut self.phase, FramePhase::AcquireContext)?;
        let result = self.record_and_present(swapchain, inputs, overlay);
        if result.is_err() {
            // The frame is lost; leave the renderer between frames.
            self.phase = FramePhase::Idle;
            if let Err(e) = self.ring.abandon_active() {
                warn!("Could not close failed frame: {}", e);
            }
        }
        result
    }

    fn record_and_present<S, F>(
        &mut self,
        swapchain: &mut S,
        inputs: &FrameInputs<'_>,
        overlay: F,
    ) -> RendererResult<FrameOutcome>
    where
        S: SwapChain<D>,
        F: FnOnce(&mut OverlayContext<'_, D>) -> RendererResult<()>,
    {
        let frame = self.ring.begin_frame()?;
        self.constants.begin_frame(&frame);

        let Some(back_buffer) = swapchain.acquire(frame.slot())? else {
            self.ring.abandon(frame)?;
            self.phase = FramePhase::Idle;
            self.stats.frames_skipped += 1;
            warn!("Swapchain out of date, frame skipped");
            return Ok(FrameOutcome::Skipped);
        };

        let per_frame = self.constants.allocate(&PerFrameConstants::new(
            inputs.camera,
            back_buffer.extent(),
            inputs.timer.total_secs(),
            inputs.timer.delta_secs(),
        ))?;

        let list = self.ring.command_list_mut(&frame);

        FramePhase::advance(&mut self.phase, FramePhase::TransitionTargetsForWrite)?;
        list.transition_back_buffer(&back_buffer, TargetState::Present, TargetState::RenderTarget);
        list.transition_depth(&self.depth, TargetState::Undefined, TargetState::DepthWrite);

        FramePhase::advance(&mut self.phase, FramePhase::Clear)?;
        list.begin_pass(&back_buffer, Some(&self.depth), Some(&self.clear));
        list.set_viewport(&self.viewport);
        list.set_scissor(&self.scissor);

        FramePhase::advance(&mut self.phase, FramePhase::BindPipelineState)?;
        list.bind_pipeline(&self.pipeline);
        if let (Some(ranges), Some(buffer)) = (self.ranges, self.geometry.buffer()) {
            list.bind_vertex_buffer(buffer, ranges.vertices.offset);
            list.bind_index_buffer(buffer, ranges.indices.offset);
        }

        FramePhase::advance(&mut self.phase, FramePhase::RecordDraws)?;
        let mut draws = 0;
        for item in &self.items {
            let Some(draw) = item.draw_args() else {
                continue;
            };
            let per_object = self
                .constants
                .allocate(&PerObjectConstants::new(item.world()))?;
            list.bind_constants(
                &self.pipeline,
                per_frame.dynamic_offset(),
                per_object.dynamic_offset(),
            );
            list.draw_indexed(draw.index_count, draw.start_index, draw.base_vertex);
            draws += 1;
        }
        list.end_pass();

        FramePhase::advance(&mut self.phase, FramePhase::RecordUiOverlay)?;
        overlay(&mut OverlayContext {
            commands: &mut *list,
            back_buffer: &back_buffer,
            extent: back_buffer.extent(),
            ui: inputs.ui,
        })?;

        FramePhase::advance(&mut self.phase, FramePhase::TransitionTargetsForPresent)?;
        list.transition_back_buffer(&back_buffer, TargetState::RenderTarget, TargetState::Present);

        FramePhase::advance(&mut self.phase, FramePhase::Submit)?;
        let fence_value = self.ring.end_frame(frame, Some(&back_buffer))?;
        let status = swapchain.present(back_buffer)?;
        FramePhase::advance(&mut self.phase, FramePhase::Idle)?;

        self.stats.frames_presented += 1;
        self.stats.draws_last_frame = draws;
        self.stats.last_fence_value = fence_value;

        let suboptimal = match status {
            PresentStatus::Presented => false,
            PresentStatus::Suboptimal => {
                warn!("Swapchain suboptimal after present");
                true
            }
            PresentStatus::OutOfDate => {
                warn!("Swapchain out of date after present");
                true
            }
        };

        Ok(FrameOutcome::Presented {
            fence_value,
            suboptimal,
        })
    }

    /// Adapts to a new client size.
    ///
    /// A zero width or height is skipped and returns `false`. Otherwise the
    /// GPU is flushed, the swapchain resized, and the depth target, viewport
    /// and scissor recreated. Geometry, heaps and the pipeline are kept.
    pub fn on_resize<S: SwapChain<D>>(
        &mut self,
        swapchain: &mut S,
        width: u32,
        height: u32,
    ) -> RendererResult<bool> {
        let extent = Extent2d::new(width, height);
        if extent.is_empty() {
            debug!("Ignoring resize to {}", extent);
            return Ok(false);
        }

        self.flush()?;
        swapchain.resize(extent)?;

        // New back buffers reuse the views already held; only growth takes
        // more from the heap.
        while self.back_buffer_views.len() < swapchain.image_count() {
            self.back_buffer_views.push(self.heaps.alloc(HeapKind::Rtv)?);
        }

        self.depth = self.device.create_depth_target(extent)?;
        self.viewport = Viewport::full(extent);
        self.scissor = ScissorRect::full(extent);

        info!("Resized to {}", extent);
        Ok(true)
    }

    /// Waits until the GPU has finished every submitted frame.
    pub fn flush(&self) -> RendererResult<()> {
        self.ring.flush()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    #[inline]
    pub fn depth_extent(&self) -> Extent2d {
        self.depth.extent()
    }

    #[inline]
    pub fn depth_target(&self) -> &D::DepthTarget {
        &self.depth
    }

    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[inline]
    pub fn scissor(&self) -> ScissorRect {
        self.scissor
    }

    #[inline]
    pub fn geometry_pool(&self) -> &StaticGeometryPool<D> {
        &self.geometry
    }

    #[inline]
    pub fn pipeline(&self) -> &Arc<D::Pipeline> {
        &self.pipeline
    }

    #[inline]
    pub fn items(&self) -> &[RenderItem] {
        &self.items
    }

    pub fn item(&self, id: RenderItemId) -> Option<&RenderItem> {
        self.items.get(id.index())
    }

    #[inline]
    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    #[inline]
    pub fn frame_ring(&self) -> &FrameRing<D> {
        &self.ring
    }

    #[inline]
    pub fn constant_allocator(&self) -> &ConstantAllocator<D> {
        &self.constants
    }

    #[inline]
    pub fn view_heaps(&self) -> &ViewHeaps {
        &self.heaps
    }

    /// Views of the back buffers, in image order.
    #[inline]
    pub fn back_buffer_views(&self) -> &[DescriptorSlot] {
        &self.back_buffer_views
    }

    #[inline]
    pub fn depth_view(&self) -> DescriptorSlot {
        self.depth_view
    }

    /// Views of the per-frame and per-object constant bindings.
    #[inline]
    pub fn constant_views(&self) -> [DescriptorSlot; 2] {
        self.constant_views
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear.color = color;
    }
}

fn index_u32(value: usize) -> RendererResult<u32> {
    u32::try_from(value)
        .map_err(|_| RendererError::InvalidRequest(format!("{value} exceeds a 32-bit index")))
}

impl<D: GpuDevice> Drop for Renderer<D> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!("Failed to flush GPU during renderer drop: {}", e);
        }
        info!("Renderer destroyed");
    }
}
