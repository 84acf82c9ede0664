//! Frame resource ring.
//!
//! This module provides the [`FrameRing`] struct, which keeps `N` command
//! lists in flight and makes sure none of them is reset while the GPU may
//! still be executing it. It handles:
//!
//! - Round-robin selection of the next frame slot
//! - Waiting on the shared fence for the slot's previous submission
//! - Submission and fence signaling
//! - Device flushes
//!
//! # Overview
//!
//! ```text
//! begin_frame ── wait fence >= slot.fence_value ── reset + open list ──> ActiveFrame
//! end_frame   ── close list ── submit ── signal fence ── slot.fence_value = v
//! ```
//!
//! Every slot remembers the fence value signaled after its last submission.
//! Before the slot is recorded into again the CPU blocks until the GPU has
//! reached that value, so while the CPU prepares frame `n + N - 1` the GPU
//! can still be working on frame `n`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ember_renderer::frame_ring::FrameRing;
//! use ember_rhi::GpuDevice;
//! use ember_rhi::headless::HeadlessDevice;
//!
//! # fn main() -> Result<(), ember_renderer::RendererError> {
//! let device = Arc::new(HeadlessDevice::new());
//! let fence = device.create_fence("frames")?;
//! let mut ring = FrameRing::new(device, fence, 3, Duration::from_secs(1))?;
//!
//! for _ in 0..10 {
//!     let frame = ring.begin_frame()?;
//!     // Record into ring.command_list_mut(&frame)...
//!     ring.end_frame(frame, None)?;
//! }
//! ring.flush()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use ember_core::config::MAX_FRAMES_IN_FLIGHT;
use ember_rhi::{CommandRecorder, GpuDevice, GpuFence};

use crate::error::{RendererError, RendererResult};

/// Resources of one ring slot.
///
/// A context is created with the ring, reused every `N` frames and
/// destroyed with the ring.
struct FrameContext<D: GpuDevice> {
    /// Command list recorded while the slot is active.
    command_list: D::CommandList,
    /// Fence value the GPU must reach before the list can be reset.
    fence_value: u64,
}

/// Proof that a slot's previous work has completed.
///
/// Only [`FrameRing::begin_frame`] creates these, and it does so after the
/// fence wait succeeded. Anything that must not touch a slot still in
/// flight takes an `&ActiveFrame`.
#[derive(Debug)]
pub struct ActiveFrame {
    slot: usize,
    frame_number: u64,
}

impl ActiveFrame {
    /// Ring slot this frame records into.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Number of frames begun before this one.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }
}

/// Ring of per-frame command lists guarded by a single fence.
///
/// # Thread Safety
///
/// The ring is `Send` but not meant to be shared: one thread records and
/// submits.
pub struct FrameRing<D: GpuDevice> {
    device: Arc<D>,
    fence: D::Fence,
    contexts: Vec<FrameContext<D>>,
    /// Slot handed out by the next `begin_frame`.
    next_slot: usize,
    /// Slot currently being recorded, if any.
    active: Option<usize>,
    frames_begun: u64,
    wait_timeout: Duration,
}

impl<D: GpuDevice> FrameRing<D> {
    /// Creates a ring of `frame_count` slots.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::InvalidFrameCount`] unless
    /// `1 <= frame_count <= MAX_FRAMES_IN_FLIGHT`, or a backend error if a
    /// command list cannot be created.
    pub fn new(
        device: Arc<D>,
        fence: D::Fence,
        frame_count: usize,
        wait_timeout: Duration,
    ) -> RendererResult<Self> {
        if frame_count == 0 || frame_count > MAX_FRAMES_IN_FLIGHT {
            return Err(RendererError::InvalidFrameCount(frame_count));
        }

        let mut contexts = Vec::with_capacity(frame_count);
        for i in 0..frame_count {
            let command_list = device.create_command_list(&format!("frame {i}"))?;
            debug!("Created frame context {}", i);
            contexts.push(FrameContext {
                command_list,
                fence_value: 0,
            });
        }

        info!("Frame ring created with {} frames in flight", frame_count);

        Ok(Self {
            device,
            fence,
            contexts,
            next_slot: 0,
            active: None,
            frames_begun: 0,
            wait_timeout,
        })
    }

    /// Starts recording into the next slot.
    ///
    /// Blocks until the fence reaches the value the slot was last submitted
    /// with, then resets and opens the slot's command list.
    ///
    /// # Errors
    ///
    /// - [`RendererError::DeviceLost`] if the wait runs past the timeout.
    /// - [`RendererError::FrameInProgress`] if the previous frame was
    ///   neither ended nor abandoned.
    pub fn begin_frame(&mut self) -> RendererResult<ActiveFrame> {
        if let Some(slot) = self.active {
            return Err(RendererError::FrameInProgress(slot));
        }

        let slot = self.next_slot;
        let context = &mut self.contexts[slot];

        trace!("Slot {} waits for fence value {}", slot, context.fence_value);
        self.fence
            .wait_until(context.fence_value, self.wait_timeout)
            .map_err(RendererError::from_fence_wait)?;

        context.command_list.begin()?;

        self.next_slot = (slot + 1) % self.contexts.len();
        self.active = Some(slot);
        let frame = ActiveFrame {
            slot,
            frame_number: self.frames_begun,
        };
        self.frames_begun += 1;
        Ok(frame)
    }

    /// The open command list of `frame`.
    #[inline]
    pub fn command_list_mut(&mut self, frame: &ActiveFrame) -> &mut D::CommandList {
        &mut self.contexts[frame.slot].command_list
    }

    /// Closes and submits the frame, then signals the fence.
    ///
    /// With a `target`, the submission is ordered after the back buffer's
    /// acquisition and before its presentation.
    ///
    /// Returns the fence value that marks completion of this frame.
    pub fn end_frame(
        &mut self,
        frame: ActiveFrame,
        target: Option<&D::BackBuffer>,
    ) -> RendererResult<u64> {
        self.active = None;
        let context = &mut self.contexts[frame.slot];
        context.command_list.end()?;
        self.device.submit(&context.command_list, target)?;
        let value = self.fence.signal()?;
        context.fence_value = value;
        trace!("Slot {} submitted, fence value {}", frame.slot, value);
        Ok(value)
    }

    /// Closes the frame without submitting it.
    ///
    /// The slot keeps the fence value of its last real submission.
    pub fn abandon(&mut self, frame: ActiveFrame) -> RendererResult<()> {
        self.active = None;
        self.contexts[frame.slot].command_list.end()?;
        debug!("Abandoned frame {} in slot {}", frame.frame_number, frame.slot);
        Ok(())
    }

    /// Closes whatever frame is open without submitting it.
    ///
    /// Used when recording failed and the [`ActiveFrame`] is gone.
    pub(crate) fn abandon_active(&mut self) -> RendererResult<()> {
        if let Some(slot) = self.active.take() {
            self.contexts[slot].command_list.end()?;
            warn!("Abandoned failed frame in slot {}", slot);
        }
        Ok(())
    }

    /// Signals the fence and waits until the GPU reaches it.
    ///
    /// Afterwards every slot is reusable without blocking.
    pub fn flush(&self) -> RendererResult<()> {
        let value = self.fence.signal()?;
        self.fence
            .wait_until(value, self.wait_timeout)
            .map_err(RendererError::from_fence_wait)?;
        debug!("Flushed frame ring at fence value {}", value);
        Ok(())
    }

    /// Number of slots.
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.contexts.len()
    }

    /// Slot the next `begin_frame` will use.
    #[inline]
    pub fn next_slot(&self) -> usize {
        self.next_slot
    }

    /// Fence value `slot` waits for before reuse.
    pub fn fence_value(&self, slot: usize) -> Option<u64> {
        self.contexts.get(slot).map(|context| context.fence_value)
    }

    #[inline]
    pub fn fence(&self) -> &D::Fence {
        &self.fence
    }

    #[inline]
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_rhi::headless::{FenceMode, HeadlessDevice};

    fn ring(frames: usize, mode: FenceMode) -> FrameRing<HeadlessDevice> {
        let device = Arc::new(HeadlessDevice::new().with_fence_mode(mode));
        let fence = device.create_fence("frames").unwrap();
        FrameRing::new(device, fence, frames, Duration::from_millis(20)).unwrap()
    }

    #[test]
    fn test_frame_count_bounds() {
        let device = Arc::new(HeadlessDevice::new());
        for count in [0, MAX_FRAMES_IN_FLIGHT + 1] {
            let fence = device.create_fence("frames").unwrap();
            let err = FrameRing::new(device.clone(), fence, count, Duration::ZERO)
                .err()
                .unwrap();
            assert!(matches!(err, RendererError::InvalidFrameCount(c) if c == count));
        }
    }

    #[test]
    fn test_slots_rotate() {
        let mut ring = ring(3, FenceMode::Immediate);
        let slots: Vec<usize> = (0..5)
            .map(|_| {
                let frame = ring.begin_frame().unwrap();
                let slot = frame.slot();
                ring.end_frame(frame, None).unwrap();
                slot
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_end_frame_records_fence_value() {
        let mut ring = ring(2, FenceMode::Immediate);
        let frame = ring.begin_frame().unwrap();
        let value = ring.end_frame(frame, None).unwrap();
        assert_eq!(value, 1);
        assert_eq!(ring.fence_value(0), Some(1));
        assert_eq!(ring.fence_value(1), Some(0));
    }

    #[test]
    fn test_double_begin_is_rejected() {
        let mut ring = ring(2, FenceMode::Immediate);
        let _frame = ring.begin_frame().unwrap();
        assert!(matches!(
            ring.begin_frame(),
            Err(RendererError::FrameInProgress(0))
        ));
    }

    #[test]
    fn test_abandon_keeps_old_fence_value() {
        let mut ring = ring(1, FenceMode::Immediate);
        let frame = ring.begin_frame().unwrap();
        ring.end_frame(frame, None).unwrap();

        let frame = ring.begin_frame().unwrap();
        ring.abandon(frame).unwrap();
        assert_eq!(ring.fence_value(0), Some(1));
        assert!(!ring.is_recording());
    }

    #[test]
    fn test_stuck_fence_is_device_lost() {
        let mut ring = ring(1, FenceMode::Manual);
        let frame = ring.begin_frame().unwrap();
        ring.end_frame(frame, None).unwrap();

        let err = ring.begin_frame().unwrap_err();
        assert!(matches!(err, RendererError::DeviceLost(_)));
    }
}
