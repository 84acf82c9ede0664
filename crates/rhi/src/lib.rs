//! Render Hardware Interface.
//!
//! Backend traits the renderer is written against, plus two backends:
//!
//! - **Vulkan** (`ash` + `gpu-allocator`): instance and device creation,
//!   swapchain, command lists, timeline fences, buffers, depth images and
//!   the scene pipeline. Entry point: [`vulkan::VulkanDevice`].
//! - **Headless** ([`headless::HeadlessDevice`]): records commands in memory
//!   and gives tests control over fence completion.

mod error;

pub mod backend;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod headless;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod types;
pub mod vertex;
pub mod vulkan;

pub use backend::{CommandRecorder, GpuBuffer, GpuDevice, GpuFence, RenderTarget, SwapChain};
pub use error::{RhiError, RhiResult};
pub use types::{
    BufferDesc, BufferUsage, ClearValues, CopyRegion, DeviceLimits, Extent2d, PipelineDesc,
    PresentStatus, ScissorRect, TargetState, TextureFormat, VertexAttribute, VertexFormat, Viewport,
};
pub use vertex::Vertex;

// Re-export ash types that users might need
pub use ash::vk;
