//! Frame orchestration.
//!
//! This crate turns the backend traits of `ember_rhi` into a running frame
//! loop:
//! - [`FrameRing`]: multi-buffered command lists guarded by one fence
//! - [`ConstantAllocator`]: per-slot bump allocation of shader constants
//! - [`StaticGeometryPool`]: append-once, upload-once vertex and index data
//! - [`ViewHeaps`]: bump-allocated view slots
//! - [`Renderer`]: the orchestrator recording one frame per call
//! - [`FrameDriver`]: the host side of the [`FrameLifecycle`] trait
//!
//! Everything is generic over [`ember_rhi::GpuDevice`] and runs unchanged on
//! the headless backend.

pub mod constant_allocator;
pub mod constants;
mod error;
pub mod frame_ring;
pub mod frame_stats;
pub mod geometry_pool;
pub mod lifecycle;
mod phase;
pub mod renderer;
pub mod ui;
pub mod view_heaps;

pub use constant_allocator::{ConstantAllocation, ConstantAllocator};
pub use constants::{PerFrameConstants, PerObjectConstants};
pub use ember_core::config::MAX_FRAMES_IN_FLIGHT;
pub use error::{RendererError, RendererResult};
pub use frame_ring::{ActiveFrame, FrameRing};
pub use frame_stats::FrameStats;
pub use geometry_pool::{StaticGeometryPool, StaticRange};
pub use lifecycle::{FrameDriver, FrameLifecycle};
pub use phase::FramePhase;
pub use renderer::{FrameInputs, FrameOutcome, RenderStats, Renderer, ShaderBytecode};
pub use ui::{OverlayContext, UiState};
pub use view_heaps::{DescriptorSlot, HeapCapacities, HeapKind, ViewHeaps};
