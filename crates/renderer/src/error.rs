//! Renderer error types.

use thiserror::Error;

use ember_rhi::RhiError;
use ember_scene::RenderItemId;

use crate::phase::FramePhase;
use crate::view_heaps::HeapKind;

/// Errors raised by the frame ring, the allocators and the orchestrator.
///
/// Everything except [`RendererError::Rhi`] wrapping a recoverable backend
/// error is fatal for the render loop.
#[derive(Error, Debug)]
pub enum RendererError {
    /// Backend failure
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// The GPU stopped making progress
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// A static allocation does not fit the pool
    #[error(
        "Static geometry pool exhausted: {requested} bytes at offset {offset} exceed capacity {capacity}"
    )]
    PoolCapacityExceeded {
        requested: u64,
        offset: u64,
        capacity: u64,
    },

    /// The pool was already uploaded
    #[error("Static geometry pool is sealed")]
    PoolSealed,

    /// The current slot's constant sub-arena is full
    #[error(
        "Constant arena of slot {slot} exhausted: {requested} bytes requested, {used} of {capacity} used"
    )]
    ArenaExhausted {
        slot: usize,
        requested: u64,
        used: u64,
        capacity: u64,
    },

    /// A view heap has no free slot left
    #[error("{heap} heap exhausted (capacity {capacity})")]
    HeapExhausted { heap: HeapKind, capacity: u32 },

    /// Ring size outside `1..=MAX_FRAMES_IN_FLIGHT`
    #[error("Invalid frame count {0}")]
    InvalidFrameCount(usize),

    /// A frame phase was entered out of order
    #[error("Frame phase {to} cannot follow {from}")]
    PhaseOrder { from: FramePhase, to: FramePhase },

    /// No render item with this id
    #[error("Unknown render item {0:?}")]
    UnknownItem(RenderItemId),

    /// Drawing was requested before the static geometry was uploaded
    #[error("Static geometry has not been uploaded")]
    GeometryNotUploaded,

    /// A constant allocation was requested outside a frame
    #[error("No frame is being recorded")]
    NoActiveFrame,

    /// `begin_frame` was called while a frame was still open
    #[error("Frame slot {0} is still being recorded")]
    FrameInProgress(usize),

    /// A request that can never succeed, such as a zero-sized allocation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RendererError {
    /// Convert a failed fence wait. Timeouts and device loss both mean the
    /// GPU is gone as far as the render loop is concerned.
    pub(crate) fn from_fence_wait(err: RhiError) -> Self {
        match err {
            RhiError::Timeout { value, completed } => RendererError::DeviceLost(format!(
                "fence stuck at {completed} while waiting for {value}"
            )),
            err if err.is_device_lost() => RendererError::DeviceLost(err.to_string()),
            err => RendererError::Rhi(err),
        }
    }

    /// Whether the render loop has to stop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RendererError::Rhi(err) if !err.is_device_lost())
    }
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = std::result::Result<T, RendererError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_maps_to_device_lost() {
        let err = RendererError::from_fence_wait(RhiError::Timeout {
            value: 4,
            completed: 2,
        });
        assert!(matches!(err, RendererError::DeviceLost(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_other_wait_errors_pass_through() {
        let err = RendererError::from_fence_wait(RhiError::InvalidUsage("x".into()));
        assert!(matches!(err, RendererError::Rhi(RhiError::InvalidUsage(_))));
        assert!(!err.is_fatal());
    }
}
