//! Backend traits.
//!
//! The frame ring, allocators and the orchestrator are written against these
//! traits only. Two implementations exist: [`crate::vulkan::VulkanDevice`]
//! drives a real GPU, [`crate::headless::HeadlessDevice`] records commands in
//! memory and lets tests control fence completion.
//!
//! # Overview
//!
//! ```text
//! GpuDevice ─┬─ Buffer        (GpuBuffer)
//!            ├─ Fence         (GpuFence)
//!            ├─ CommandList   (CommandRecorder<Self>)
//!            ├─ DepthTarget   (RenderTarget)
//!            ├─ BackBuffer    (RenderTarget, produced by a SwapChain)
//!            └─ Pipeline
//! ```
//!
//! The device is shared as `Arc<D>`. A [`SwapChain`] is owned by the host and
//! lent to the renderer per call, so nothing in the core outlives it.

use std::time::Duration;

use crate::error::RhiResult;
use crate::types::{
    BufferDesc, ClearValues, CopyRegion, DeviceLimits, Extent2d, PipelineDesc, PresentStatus,
    ScissorRect, TargetState, TextureFormat, Viewport,
};

/// A graphics device plus its single submission queue.
pub trait GpuDevice: Send + Sync + Sized + 'static {
    type Buffer: GpuBuffer;
    type Fence: GpuFence;
    type CommandList: CommandRecorder<Self>;
    type DepthTarget: RenderTarget;
    type BackBuffer: RenderTarget;
    type Pipeline: Send + Sync;

    /// Human readable adapter name.
    fn adapter_name(&self) -> &str;

    fn limits(&self) -> DeviceLimits;

    /// Create a buffer. Host-visible usages are mapped for the buffer's
    /// whole lifetime.
    fn create_buffer(&self, desc: &BufferDesc<'_>) -> RhiResult<Self::Buffer>;

    /// Create a fence whose counter starts at zero.
    fn create_fence(&self, label: &str) -> RhiResult<Self::Fence>;

    fn create_command_list(&self, label: &str) -> RhiResult<Self::CommandList>;

    fn create_depth_target(&self, extent: Extent2d) -> RhiResult<Self::DepthTarget>;

    fn create_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> RhiResult<Self::Pipeline>;

    /// Submit a closed command list to the queue.
    ///
    /// When `target` is given, execution waits until the back buffer has
    /// been acquired and presentation of it waits for this submission.
    fn submit(&self, list: &Self::CommandList, target: Option<&Self::BackBuffer>) -> RhiResult<()>;

    /// Block until every queue is idle.
    fn wait_idle(&self) -> RhiResult<()>;
}

/// A GPU buffer.
pub trait GpuBuffer: Send + Sync {
    fn size(&self) -> u64;

    /// Copy `data` into a host-visible buffer at `offset`.
    fn write(&mut self, offset: u64, data: &[u8]) -> RhiResult<()>;

    /// Read `len` bytes of a host-visible buffer starting at `offset`.
    fn read(&self, offset: u64, len: u64) -> RhiResult<Vec<u8>>;
}

/// Monotonic GPU completion counter.
///
/// Values start at zero; each [`signal`](GpuFence::signal) returns the next
/// value, which becomes complete once all queue work submitted before it
/// has finished.
pub trait GpuFence: Send + Sync {
    /// Enqueue a signal of the next value after current queue work.
    fn signal(&self) -> RhiResult<u64>;

    /// Largest value the GPU has reached.
    fn completed_value(&self) -> RhiResult<u64>;

    /// Block until the counter reaches `value`.
    ///
    /// # Errors
    ///
    /// [`RhiError::Timeout`](crate::RhiError::Timeout) if `timeout` elapses
    /// first.
    fn wait_until(&self, value: u64, timeout: Duration) -> RhiResult<()>;

    /// Whether `value` has been reached, without blocking.
    fn is_complete(&self, value: u64) -> RhiResult<bool> {
        Ok(self.completed_value()? >= value)
    }
}

/// Something that can be rendered to.
pub trait RenderTarget: Send + Sync {
    fn extent(&self) -> Extent2d;
}

/// Command recording interface.
///
/// [`begin`](Self::begin) resets the list and opens it; every other
/// recording call is only valid between `begin` and [`end`](Self::end).
pub trait CommandRecorder<D: GpuDevice>: Send {
    fn begin(&mut self) -> RhiResult<()>;

    fn end(&mut self) -> RhiResult<()>;

    fn transition_back_buffer(
        &mut self,
        target: &D::BackBuffer,
        from: TargetState,
        to: TargetState,
    );

    fn transition_depth(&mut self, target: &D::DepthTarget, from: TargetState, to: TargetState);

    /// Start rendering into `color` (and `depth`). With `clear` the
    /// attachments are cleared, otherwise their contents are kept.
    fn begin_pass(
        &mut self,
        color: &D::BackBuffer,
        depth: Option<&D::DepthTarget>,
        clear: Option<&ClearValues>,
    );

    fn end_pass(&mut self);

    fn set_viewport(&mut self, viewport: &Viewport);

    fn set_scissor(&mut self, scissor: &ScissorRect);

    fn bind_pipeline(&mut self, pipeline: &D::Pipeline);

    fn bind_vertex_buffer(&mut self, buffer: &D::Buffer, offset: u64);

    /// Bind 32-bit indices.
    fn bind_index_buffer(&mut self, buffer: &D::Buffer, offset: u64);

    /// Bind the per-frame and per-object constant blocks by their byte
    /// offsets into the pipeline's constant arena.
    fn bind_constants(&mut self, pipeline: &D::Pipeline, per_frame: u32, per_object: u32);

    fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32);

    fn copy_buffer(&mut self, src: &D::Buffer, dst: &D::Buffer, region: CopyRegion);

    /// Debug label; ignored by backends without labelling support.
    fn insert_marker(&mut self, _label: &str) {}
}

/// Presentation engine for one window surface.
pub trait SwapChain<D: GpuDevice> {
    fn extent(&self) -> Extent2d;

    fn format(&self) -> TextureFormat;

    fn image_count(&self) -> usize;

    /// Acquire the next back buffer for ring slot `frame_slot`.
    ///
    /// Returns `Ok(None)` when the swapchain is out of date and has to be
    /// resized before rendering can continue.
    fn acquire(&mut self, frame_slot: usize) -> RhiResult<Option<D::BackBuffer>>;

    /// Queue `back_buffer` for presentation.
    fn present(&mut self, back_buffer: D::BackBuffer) -> RhiResult<PresentStatus>;

    /// Recreate the images for a new surface size. The device must be idle.
    fn resize(&mut self, extent: Extent2d) -> RhiResult<()>;
}
