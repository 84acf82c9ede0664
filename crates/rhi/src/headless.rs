//! In-memory backend.
//!
//! [`HeadlessDevice`] implements [`GpuDevice`] without a GPU. Command lists
//! record a [`Command`] log, submission executes buffer copies on the CPU and
//! stores the log for inspection, and fences complete either immediately or
//! only when a test says so through a [`FenceControl`].
//!
//! # Example
//!
//! ```
//! use ember_rhi::headless::{FenceMode, HeadlessDevice};
//! use ember_rhi::{GpuDevice, GpuFence};
//! use std::time::Duration;
//!
//! let device = HeadlessDevice::new().with_fence_mode(FenceMode::Manual);
//! let fence = device.create_fence("frames").unwrap();
//! let value = fence.signal().unwrap();
//! assert!(fence.wait_until(value, Duration::from_millis(1)).is_err());
//!
//! device.fence_control("frames").unwrap().complete_all();
//! fence.wait_until(value, Duration::from_millis(1)).unwrap();
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::backend::{CommandRecorder, GpuBuffer, GpuDevice, GpuFence, RenderTarget, SwapChain};
use crate::error::{RhiError, RhiResult};
use crate::types::{
    BufferDesc, BufferUsage, ClearValues, CopyRegion, DeviceLimits, Extent2d, PipelineDesc,
    PresentStatus, ScissorRect, TargetState, TextureFormat, Viewport,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding one of these locks only happens inside a failing
    // test; the data is still usable for reporting.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// How fences created by a [`HeadlessDevice`] complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FenceMode {
    /// Every signal completes at once.
    #[default]
    Immediate,
    /// Values complete only through [`FenceControl`].
    Manual,
}

/// Identifier of a headless object, unique per device.
pub type ObjectId = u64;

/// One recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    TransitionBackBuffer {
        image: u32,
        from: TargetState,
        to: TargetState,
    },
    TransitionDepth {
        target: ObjectId,
        from: TargetState,
        to: TargetState,
    },
    BeginPass {
        image: u32,
        depth: Option<ObjectId>,
        clear: Option<ClearValues>,
    },
    EndPass,
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    BindPipeline(ObjectId),
    BindVertexBuffer {
        buffer: ObjectId,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: ObjectId,
        offset: u64,
    },
    BindConstants {
        per_frame: u32,
        per_object: u32,
    },
    DrawIndexed {
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
    },
    CopyBuffer {
        src: ObjectId,
        dst: ObjectId,
        region: CopyRegion,
    },
    Marker(String),
}

/// A command list as it was submitted.
#[derive(Debug, Clone)]
pub struct Submission {
    pub list: String,
    pub target: Option<u32>,
    pub commands: Vec<Command>,
}

impl Submission {
    /// The draw calls of this submission, in order.
    pub fn draws(&self) -> impl Iterator<Item = &Command> {
        self.commands
            .iter()
            .filter(|command| matches!(command, Command::DrawIndexed { .. }))
    }
}

/// Device that renders nothing and remembers everything.
#[derive(Debug)]
pub struct HeadlessDevice {
    next_id: AtomicU64,
    fence_mode: FenceMode,
    limits: DeviceLimits,
    fences: Mutex<HashMap<String, FenceControl>>,
    submissions: Mutex<Vec<Submission>>,
    idle_waits: AtomicU64,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            fence_mode: FenceMode::Immediate,
            limits: DeviceLimits::default(),
            fences: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
            idle_waits: AtomicU64::new(0),
        }
    }

    /// Completion policy for fences created from now on.
    pub fn with_fence_mode(mut self, mode: FenceMode) -> Self {
        self.fence_mode = mode;
        self
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Control handle of the fence created with `label`.
    pub fn fence_control(&self, label: &str) -> Option<FenceControl> {
        lock(&self.fences).get(label).cloned()
    }

    /// Every submission so far, oldest first.
    pub fn submissions(&self) -> Vec<Submission> {
        lock(&self.submissions).clone()
    }

    /// The most recent submission.
    pub fn last_submission(&self) -> Option<Submission> {
        lock(&self.submissions).last().cloned()
    }

    /// Number of [`GpuDevice::wait_idle`] calls.
    pub fn idle_waits(&self) -> u64 {
        self.idle_waits.load(Ordering::Relaxed)
    }

    fn next_id(&self) -> ObjectId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for HeadlessDevice {
    type Buffer = HeadlessBuffer;
    type Fence = HeadlessFence;
    type CommandList = HeadlessCommandList;
    type DepthTarget = HeadlessDepthTarget;
    type BackBuffer = HeadlessBackBuffer;
    type Pipeline = HeadlessPipeline;

    fn adapter_name(&self) -> &str {
        "Headless"
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> RhiResult<HeadlessBuffer> {
        if desc.size == 0 {
            return Err(RhiError::InvalidUsage(format!(
                "buffer '{}' has zero size",
                desc.label
            )));
        }
        let size = usize::try_from(desc.size).map_err(|_| {
            RhiError::InvalidUsage(format!("buffer '{}' is too large", desc.label))
        })?;
        let buffer = HeadlessBuffer {
            id: self.next_id(),
            usage: desc.usage,
            bytes: Arc::new(Mutex::new(vec![0; size])),
        };
        debug!(
            "Created headless {} buffer '{}' ({} bytes)",
            desc.usage.name(),
            desc.label,
            desc.size
        );
        Ok(buffer)
    }

    fn create_fence(&self, label: &str) -> RhiResult<HeadlessFence> {
        let fence = HeadlessFence::new(self.fence_mode);
        lock(&self.fences).insert(label.to_string(), fence.control());
        debug!("Created headless fence '{}' ({:?})", label, self.fence_mode);
        Ok(fence)
    }

    fn create_command_list(&self, label: &str) -> RhiResult<HeadlessCommandList> {
        Ok(HeadlessCommandList {
            label: label.to_string(),
            state: ListState::Initial,
            commands: Vec::new(),
            copies: Vec::new(),
        })
    }

    fn create_depth_target(&self, extent: Extent2d) -> RhiResult<HeadlessDepthTarget> {
        if extent.is_empty() {
            return Err(RhiError::InvalidUsage(format!(
                "depth target dimensions must be non-zero, got {extent}"
            )));
        }
        Ok(HeadlessDepthTarget {
            id: self.next_id(),
            extent,
        })
    }

    fn create_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> RhiResult<HeadlessPipeline> {
        if desc.vertex_spirv.is_empty() || desc.fragment_spirv.is_empty() {
            return Err(RhiError::PipelineError(format!(
                "pipeline '{}' is missing shader bytecode",
                desc.label
            )));
        }
        Ok(HeadlessPipeline {
            id: self.next_id(),
            arena: desc.constant_arena.id,
        })
    }

    fn submit(&self, list: &HeadlessCommandList, target: Option<&HeadlessBackBuffer>) -> RhiResult<()> {
        if list.state != ListState::Executable {
            return Err(RhiError::InvalidUsage(format!(
                "command list '{}' submitted while {:?}",
                list.label, list.state
            )));
        }

        for copy in &list.copies {
            copy.execute()?;
        }

        trace!(
            "Submitted '{}' with {} command(s)",
            list.label,
            list.commands.len()
        );
        lock(&self.submissions).push(Submission {
            list: list.label.clone(),
            target: target.map(|back_buffer| back_buffer.index),
            commands: list.commands.clone(),
        });
        Ok(())
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.idle_waits.fetch_add(1, Ordering::Relaxed);
        for control in lock(&self.fences).values() {
            control.complete_all();
        }
        Ok(())
    }
}

/// CPU memory standing in for a GPU buffer.
#[derive(Debug)]
pub struct HeadlessBuffer {
    id: ObjectId,
    usage: BufferUsage,
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl HeadlessBuffer {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Full contents, regardless of usage.
    ///
    /// This is the readback path for device-local buffers.
    pub fn contents(&self) -> Vec<u8> {
        lock(&self.bytes).clone()
    }

    fn check_host_visible(&self) -> RhiResult<()> {
        if self.usage.is_host_visible() {
            Ok(())
        } else {
            Err(RhiError::InvalidUsage(format!(
                "{} buffer is not host visible",
                self.usage.name()
            )))
        }
    }
}

fn check_range(offset: u64, len: u64, size: u64) -> RhiResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(RhiError::OutOfBounds { offset, len, size }),
    }
}

impl GpuBuffer for HeadlessBuffer {
    fn size(&self) -> u64 {
        lock(&self.bytes).len() as u64
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> RhiResult<()> {
        self.check_host_visible()?;
        let mut bytes = lock(&self.bytes);
        check_range(offset, data.len() as u64, bytes.len() as u64)?;
        let start = offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: u64, len: u64) -> RhiResult<Vec<u8>> {
        self.check_host_visible()?;
        let bytes = lock(&self.bytes);
        check_range(offset, len, bytes.len() as u64)?;
        let start = offset as usize;
        Ok(bytes[start..start + len as usize].to_vec())
    }
}

#[derive(Debug)]
struct FenceShared {
    state: Mutex<FenceState>,
    reached: Condvar,
}

#[derive(Debug)]
struct FenceState {
    signaled: u64,
    completed: u64,
    mode: FenceMode,
}

/// Counter fence with test-controlled completion.
#[derive(Debug)]
pub struct HeadlessFence {
    shared: Arc<FenceShared>,
}

impl HeadlessFence {
    pub fn new(mode: FenceMode) -> Self {
        Self {
            shared: Arc::new(FenceShared {
                state: Mutex::new(FenceState {
                    signaled: 0,
                    completed: 0,
                    mode,
                }),
                reached: Condvar::new(),
            }),
        }
    }

    /// A handle that can complete values from another thread.
    pub fn control(&self) -> FenceControl {
        FenceControl {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl GpuFence for HeadlessFence {
    fn signal(&self) -> RhiResult<u64> {
        let mut state = lock(&self.shared.state);
        state.signaled += 1;
        if state.mode == FenceMode::Immediate {
            state.completed = state.signaled;
            self.shared.reached.notify_all();
        }
        Ok(state.signaled)
    }

    fn completed_value(&self) -> RhiResult<u64> {
        Ok(lock(&self.shared.state).completed)
    }

    fn wait_until(&self, value: u64, timeout: Duration) -> RhiResult<()> {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.shared.state);
        while state.completed < value {
            let now = Instant::now();
            if now >= deadline {
                return Err(RhiError::Timeout {
                    value,
                    completed: state.completed,
                });
            }
            state = self
                .shared
                .reached
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
        Ok(())
    }
}

/// Drives completion of a [`HeadlessFence`].
#[derive(Debug, Clone)]
pub struct FenceControl {
    shared: Arc<FenceShared>,
}

impl FenceControl {
    /// Mark every value up to `value` complete. Values that were never
    /// signaled are not completed.
    pub fn complete_through(&self, value: u64) {
        let mut state = lock(&self.shared.state);
        let target = value.min(state.signaled);
        if target > state.completed {
            state.completed = target;
            self.shared.reached.notify_all();
        }
    }

    /// Complete everything signaled so far.
    pub fn complete_all(&self) {
        let mut state = lock(&self.shared.state);
        state.completed = state.signaled;
        self.shared.reached.notify_all();
    }

    /// Switch the completion policy; switching to immediate completes
    /// everything outstanding.
    pub fn set_mode(&self, mode: FenceMode) {
        let mut state = lock(&self.shared.state);
        state.mode = mode;
        if mode == FenceMode::Immediate {
            state.completed = state.signaled;
            self.shared.reached.notify_all();
        }
    }

    pub fn signaled_value(&self) -> u64 {
        lock(&self.shared.state).signaled
    }

    pub fn completed_value(&self) -> u64 {
        lock(&self.shared.state).completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListState {
    Initial,
    Recording,
    Executable,
}

#[derive(Debug)]
struct PendingCopy {
    src: Arc<Mutex<Vec<u8>>>,
    dst: Arc<Mutex<Vec<u8>>>,
    region: CopyRegion,
}

impl PendingCopy {
    fn execute(&self) -> RhiResult<()> {
        let src = lock(&self.src).clone();
        let mut dst = lock(&self.dst);
        let CopyRegion {
            src_offset,
            dst_offset,
            size,
        } = self.region;
        check_range(src_offset, size, src.len() as u64)?;
        check_range(dst_offset, size, dst.len() as u64)?;
        let (s, d, n) = (src_offset as usize, dst_offset as usize, size as usize);
        dst[d..d + n].copy_from_slice(&src[s..s + n]);
        Ok(())
    }
}

/// Command list that records into a [`Command`] log.
#[derive(Debug)]
pub struct HeadlessCommandList {
    label: String,
    state: ListState,
    commands: Vec<Command>,
    copies: Vec<PendingCopy>,
}

impl HeadlessCommandList {
    /// Commands recorded since the last `begin`.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_recording(&self) -> bool {
        self.state == ListState::Recording
    }

    fn record(&mut self, command: Command) {
        debug_assert!(
            self.state == ListState::Recording,
            "recording into '{}' outside begin/end",
            self.label
        );
        self.commands.push(command);
    }
}

impl CommandRecorder<HeadlessDevice> for HeadlessCommandList {
    fn begin(&mut self) -> RhiResult<()> {
        self.commands.clear();
        self.copies.clear();
        self.state = ListState::Recording;
        Ok(())
    }

    fn end(&mut self) -> RhiResult<()> {
        if self.state != ListState::Recording {
            return Err(RhiError::InvalidUsage(format!(
                "command list '{}' closed while {:?}",
                self.label, self.state
            )));
        }
        self.state = ListState::Executable;
        Ok(())
    }

    fn transition_back_buffer(
        &mut self,
        target: &HeadlessBackBuffer,
        from: TargetState,
        to: TargetState,
    ) {
        self.record(Command::TransitionBackBuffer {
            image: target.index,
            from,
            to,
        });
    }

    fn transition_depth(&mut self, target: &HeadlessDepthTarget, from: TargetState, to: TargetState) {
        self.record(Command::TransitionDepth {
            target: target.id,
            from,
            to,
        });
    }

    fn begin_pass(
        &mut self,
        color: &HeadlessBackBuffer,
        depth: Option<&HeadlessDepthTarget>,
        clear: Option<&ClearValues>,
    ) {
        self.record(Command::BeginPass {
            image: color.index,
            depth: depth.map(|target| target.id),
            clear: clear.copied(),
        });
    }

    fn end_pass(&mut self) {
        self.record(Command::EndPass);
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.record(Command::SetViewport(*viewport));
    }

    fn set_scissor(&mut self, scissor: &ScissorRect) {
        self.record(Command::SetScissor(*scissor));
    }

    fn bind_pipeline(&mut self, pipeline: &HeadlessPipeline) {
        self.record(Command::BindPipeline(pipeline.id));
    }

    fn bind_vertex_buffer(&mut self, buffer: &HeadlessBuffer, offset: u64) {
        self.record(Command::BindVertexBuffer {
            buffer: buffer.id,
            offset,
        });
    }

    fn bind_index_buffer(&mut self, buffer: &HeadlessBuffer, offset: u64) {
        self.record(Command::BindIndexBuffer {
            buffer: buffer.id,
            offset,
        });
    }

    fn bind_constants(&mut self, _pipeline: &HeadlessPipeline, per_frame: u32, per_object: u32) {
        self.record(Command::BindConstants {
            per_frame,
            per_object,
        });
    }

    fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) {
        self.record(Command::DrawIndexed {
            index_count,
            start_index,
            base_vertex,
        });
    }

    fn copy_buffer(&mut self, src: &HeadlessBuffer, dst: &HeadlessBuffer, region: CopyRegion) {
        self.record(Command::CopyBuffer {
            src: src.id,
            dst: dst.id,
            region,
        });
        self.copies.push(PendingCopy {
            src: Arc::clone(&src.bytes),
            dst: Arc::clone(&dst.bytes),
            region,
        });
    }

    fn insert_marker(&mut self, label: &str) {
        self.record(Command::Marker(label.to_string()));
    }
}

/// Depth target with no storage.
#[derive(Debug)]
pub struct HeadlessDepthTarget {
    id: ObjectId,
    extent: Extent2d,
}

impl HeadlessDepthTarget {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl RenderTarget for HeadlessDepthTarget {
    fn extent(&self) -> Extent2d {
        self.extent
    }
}

/// Back buffer handed out by [`HeadlessSwapChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessBackBuffer {
    pub index: u32,
    pub extent: Extent2d,
}

impl RenderTarget for HeadlessBackBuffer {
    fn extent(&self) -> Extent2d {
        self.extent
    }
}

/// Pipeline identity.
#[derive(Debug)]
pub struct HeadlessPipeline {
    id: ObjectId,
    arena: ObjectId,
}

impl HeadlessPipeline {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Buffer the constant bindings point into.
    #[inline]
    pub fn constant_arena(&self) -> ObjectId {
        self.arena
    }
}

/// Swapchain that cycles image indices.
#[derive(Debug)]
pub struct HeadlessSwapChain {
    extent: Extent2d,
    image_count: u32,
    next_image: u32,
    presented: u64,
    resizes: u64,
    out_of_date: bool,
}

impl HeadlessSwapChain {
    pub fn new(extent: Extent2d, image_count: u32) -> Self {
        Self {
            extent,
            image_count: image_count.max(1),
            next_image: 0,
            presented: 0,
            resizes: 0,
            out_of_date: false,
        }
    }

    /// Make the next acquisition report an out-of-date swapchain.
    pub fn invalidate(&mut self) {
        self.out_of_date = true;
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn resizes(&self) -> u64 {
        self.resizes
    }
}

impl SwapChain<HeadlessDevice> for HeadlessSwapChain {
    fn extent(&self) -> Extent2d {
        self.extent
    }

    fn format(&self) -> TextureFormat {
        TextureFormat::Bgra8Srgb
    }

    fn image_count(&self) -> usize {
        self.image_count as usize
    }

    fn acquire(&mut self, _frame_slot: usize) -> RhiResult<Option<HeadlessBackBuffer>> {
        if self.out_of_date {
            return Ok(None);
        }
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(Some(HeadlessBackBuffer {
            index,
            extent: self.extent,
        }))
    }

    fn present(&mut self, back_buffer: HeadlessBackBuffer) -> RhiResult<PresentStatus> {
        if back_buffer.extent != self.extent {
            return Ok(PresentStatus::OutOfDate);
        }
        self.presented += 1;
        Ok(PresentStatus::Presented)
    }

    fn resize(&mut self, extent: Extent2d) -> RhiResult<()> {
        self.extent = extent;
        self.next_image = 0;
        self.out_of_date = false;
        self.resizes += 1;
        Ok(())
    }
}
