//! Dynamic constant allocator.
//!
//! One host-visible uniform buffer, the constant arena, is split into one
//! sub-arena per ring slot. Slot `i` owns `[i * sub, (i + 1) * sub)`, so
//! writes for the frame being recorded never touch bytes a frame still in
//! flight reads from. Within a sub-arena allocation is a bump pointer that
//! is reset when the slot is reused.

use std::ops::Range;

use bytemuck::Pod;
use tracing::{debug, trace};

use ember_core::config::MAX_FRAMES_IN_FLIGHT;
use ember_rhi::{BufferDesc, BufferUsage, GpuBuffer, GpuDevice};

use crate::error::{RendererError, RendererResult};
use crate::frame_ring::ActiveFrame;

/// Round `value` up to a multiple of `alignment`.
#[inline]
pub fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// [`align_up`] that returns `None` instead of overflowing.
#[inline]
pub fn checked_align_up(value: u64, alignment: u64) -> Option<u64> {
    value.checked_next_multiple_of(alignment)
}

/// Round `value` down to a multiple of `alignment`.
#[inline]
pub fn align_down(value: u64, alignment: u64) -> u64 {
    value / alignment * alignment
}

/// A block of constants inside the arena, valid until its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantAllocation {
    pub slot: usize,
    /// Byte offset from the start of the arena.
    pub offset: u64,
    /// Bytes reserved, a multiple of the uniform offset alignment.
    pub size: u64,
}

impl ConstantAllocation {
    /// Offset in the form dynamic uniform bindings take.
    #[inline]
    pub fn dynamic_offset(&self) -> u32 {
        // Arena sizes are validated to fit in u32 at construction.
        self.offset as u32
    }

    #[inline]
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.size
    }
}

/// Per-frame bump allocator over the constant arena.
pub struct ConstantAllocator<D: GpuDevice> {
    arena: D::Buffer,
    alignment: u64,
    sub_arena: u64,
    cursors: Vec<u64>,
    current: Option<usize>,
}

impl<D: GpuDevice> ConstantAllocator<D> {
    /// Creates the arena for `frame_count` slots out of `arena_bytes`.
    ///
    /// Each sub-arena is `arena_bytes / frame_count` rounded down to the
    /// device's uniform offset alignment.
    pub fn new(device: &D, frame_count: usize, arena_bytes: u64) -> RendererResult<Self> {
        if frame_count == 0 || frame_count > MAX_FRAMES_IN_FLIGHT {
            return Err(RendererError::InvalidFrameCount(frame_count));
        }
        let alignment = device.limits().min_uniform_offset_alignment.max(1);
        let sub_arena = align_down(arena_bytes / frame_count as u64, alignment);
        if sub_arena == 0 {
            return Err(RendererError::InvalidRequest(format!(
                "constant arena of {arena_bytes} bytes cannot hold {frame_count} aligned sub-arenas"
            )));
        }
        let total = sub_arena * frame_count as u64;
        if total > u64::from(u32::MAX) {
            return Err(RendererError::InvalidRequest(format!(
                "constant arena of {total} bytes exceeds dynamic offset range"
            )));
        }

        let arena = device.create_buffer(&BufferDesc {
            label: "constant arena",
            size: total,
            usage: BufferUsage::Constants,
        })?;

        debug!(
            "Constant arena: {} slots x {} bytes, alignment {}",
            frame_count, sub_arena, alignment
        );

        Ok(Self {
            arena,
            alignment,
            sub_arena,
            cursors: vec![0; frame_count],
            current: None,
        })
    }

    /// Starts allocating for `frame`, discarding everything its slot held.
    pub fn begin_frame(&mut self, frame: &ActiveFrame) {
        let slot = frame.slot();
        trace!(
            "Slot {} constant cursor reset after {} bytes",
            slot, self.cursors[slot]
        );
        self.cursors[slot] = 0;
        self.current = Some(slot);
    }

    /// Copies `data` into the current slot.
    pub fn allocate<T: Pod>(&mut self, data: &T) -> RendererResult<ConstantAllocation> {
        let bytes = bytemuck::bytes_of(data);
        self.allocate_bytes(bytes.len() as u64, bytes)
    }

    /// Reserves `size` bytes in the current slot and copies `bytes` to their
    /// start.
    ///
    /// # Errors
    ///
    /// - [`RendererError::InvalidRequest`] for a zero `size` or more bytes
    ///   than `size`.
    /// - [`RendererError::NoActiveFrame`] before the first `begin_frame`.
    /// - [`RendererError::ArenaExhausted`] when the sub-arena is full. Nothing
    ///   is written in that case.
    pub fn allocate_bytes(&mut self, size: u64, bytes: &[u8]) -> RendererResult<ConstantAllocation> {
        if size == 0 {
            return Err(RendererError::InvalidRequest(
                "zero-sized constant allocation".to_string(),
            ));
        }
        if bytes.len() as u64 > size {
            return Err(RendererError::InvalidRequest(format!(
                "{} bytes do not fit a {size}-byte allocation",
                bytes.len()
            )));
        }
        let slot = self.current.ok_or(RendererError::NoActiveFrame)?;

        let used = self.cursors[slot];
        let Some(reserved) = checked_align_up(size, self.alignment)
            .filter(|reserved| used.checked_add(*reserved).is_some_and(|end| end <= self.sub_arena))
        else {
            return Err(RendererError::ArenaExhausted {
                slot,
                requested: size,
                used,
                capacity: self.sub_arena,
            });
        };

        let offset = slot as u64 * self.sub_arena + used;
        self.arena.write(offset, bytes)?;
        self.cursors[slot] = used + reserved;

        Ok(ConstantAllocation {
            slot,
            offset,
            size: reserved,
        })
    }

    /// The uniform buffer every allocation lives in.
    #[inline]
    pub fn arena(&self) -> &D::Buffer {
        &self.arena
    }

    #[inline]
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    #[inline]
    pub fn sub_arena_size(&self) -> u64 {
        self.sub_arena
    }

    /// Bytes allocated in `slot` since its last reset.
    pub fn used(&self, slot: usize) -> u64 {
        self.cursors.get(slot).copied().unwrap_or(0)
    }

    /// Arena bytes owned by `slot`.
    pub fn slot_range(&self, slot: usize) -> Range<u64> {
        let start = slot as u64 * self.sub_arena;
        start..start + self.sub_arena
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(17, 16), 32);
    }

    #[test]
    fn test_checked_align_up_overflow() {
        assert_eq!(checked_align_up(257, 256), Some(512));
        assert_eq!(checked_align_up(u64::MAX - 10, 256), None);
    }

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(1000, 256), 768);
        assert_eq!(align_down(255, 256), 0);
        assert_eq!(align_down(512, 256), 512);
    }

    #[test]
    fn test_dynamic_offset_matches_offset() {
        let allocation = ConstantAllocation {
            slot: 1,
            offset: 4096,
            size: 256,
        };
        assert_eq!(allocation.dynamic_offset(), 4096);
        assert_eq!(allocation.range(), 4096..4352);
    }
}
