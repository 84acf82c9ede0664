//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Shader bytecode was rejected
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A fence wait ran past its deadline
    #[error("Timed out waiting for fence value {value} (completed {completed})")]
    Timeout { value: u64, completed: u64 },

    /// The device stopped responding
    #[error("Device lost")]
    DeviceLost,

    /// A read or write fell outside a buffer
    #[error("Access of {len} bytes at offset {offset} exceeds buffer size {size}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    /// An object was used in a state that does not allow it
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),
}

impl RhiError {
    /// Whether the error means the device can no longer be used.
    pub fn is_device_lost(&self) -> bool {
        matches!(
            self,
            RhiError::DeviceLost | RhiError::VulkanError(ash::vk::Result::ERROR_DEVICE_LOST)
        )
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
