//! Integration tests for the dynamic constant allocator.

use std::sync::Arc;
use std::time::Duration;

use ember_renderer::{ConstantAllocator, FrameRing, RendererError};
use ember_rhi::headless::HeadlessDevice;
use ember_rhi::{DeviceLimits, GpuBuffer, GpuDevice};

struct Fixture {
    ring: FrameRing<HeadlessDevice>,
    constants: ConstantAllocator<HeadlessDevice>,
}

fn fixture(frames: usize, arena_bytes: u64) -> Fixture {
    let device = Arc::new(HeadlessDevice::new().with_limits(DeviceLimits {
        min_uniform_offset_alignment: 256,
        max_uniform_range: 65_536,
    }));
    let fence = device.create_fence("frames").unwrap();
    let constants = ConstantAllocator::new(&*device, frames, arena_bytes).unwrap();
    let ring = FrameRing::new(device, fence, frames, Duration::from_secs(1)).unwrap();
    Fixture { ring, constants }
}

#[test]
fn test_sub_arenas_are_disjoint() {
    let f = fixture(3, 4096);
    // 4096 / 3 = 1365, aligned down to 1280.
    assert_eq!(f.constants.sub_arena_size(), 1280);
    assert_eq!(f.constants.slot_range(0), 0..1280);
    assert_eq!(f.constants.slot_range(1), 1280..2560);
    assert_eq!(f.constants.slot_range(2), 2560..3840);
}

#[test]
fn test_allocations_do_not_overlap_and_stay_in_slot() {
    let mut f = fixture(2, 8192);
    let frame = f.ring.begin_frame().unwrap();
    f.constants.begin_frame(&frame);

    let sizes = [4u64, 300, 16, 256, 1000, 1];
    let allocations: Vec<_> = sizes
        .iter()
        .map(|&size| {
            f.constants
                .allocate_bytes(size, &vec![0xAB; size as usize])
                .unwrap()
        })
        .collect();

    let slot = f.constants.slot_range(frame.slot());
    for (i, a) in allocations.iter().enumerate() {
        assert_eq!(a.offset % 256, 0);
        assert!(a.size >= sizes[i]);
        assert!(slot.start <= a.offset && a.range().end <= slot.end);
        for b in &allocations[i + 1..] {
            assert!(a.range().end <= b.offset || b.range().end <= a.offset);
        }
    }
    let total: u64 = allocations.iter().map(|a| a.size).sum();
    assert_eq!(f.constants.used(frame.slot()), total);
    assert!(total <= f.constants.sub_arena_size());
}

#[test]
fn test_exhaustion_writes_nothing() {
    let mut f = fixture(1, 512);
    let frame = f.ring.begin_frame().unwrap();
    f.constants.begin_frame(&frame);

    f.constants.allocate_bytes(256, &[1; 256]).unwrap();
    let err = f.constants.allocate_bytes(257, &[2; 257]).unwrap_err();
    assert!(matches!(
        err,
        RendererError::ArenaExhausted {
            slot: 0,
            requested: 257,
            used: 256,
            capacity: 512
        }
    ));

    assert_eq!(f.constants.used(0), 256);
    assert_eq!(f.constants.arena().read(256, 256).unwrap(), vec![0; 256]);
}

#[test]
fn test_huge_request_is_exhaustion() {
    let mut f = fixture(1, 4096);
    let frame = f.ring.begin_frame().unwrap();
    f.constants.begin_frame(&frame);
    f.constants.allocate_bytes(16, &[7; 16]).unwrap();

    for size in [u64::MAX - 10, u64::MAX, u64::MAX - 255] {
        let err = f.constants.allocate_bytes(size, &[1]).unwrap_err();
        assert!(matches!(
            err,
            RendererError::ArenaExhausted {
                slot: 0,
                used: 256,
                capacity: 4096,
                ..
            }
        ));
    }

    assert_eq!(f.constants.used(0), 256);
    let next = f.constants.allocate_bytes(16, &[9; 16]).unwrap();
    assert_eq!(next.offset, 256);
}

#[test]
fn test_zero_size_rejected() {
    let mut f = fixture(1, 512);
    let frame = f.ring.begin_frame().unwrap();
    f.constants.begin_frame(&frame);
    assert!(matches!(
        f.constants.allocate_bytes(0, &[]),
        Err(RendererError::InvalidRequest(_))
    ));
}

#[test]
fn test_allocate_requires_begin_frame() {
    let mut f = fixture(2, 1024);
    assert!(matches!(
        f.constants.allocate(&[0u32; 4]),
        Err(RendererError::NoActiveFrame)
    ));
}

#[test]
fn test_reset_only_touches_reused_slot() {
    let mut f = fixture(2, 2048);

    let frame = f.ring.begin_frame().unwrap();
    f.constants.begin_frame(&frame);
    let first = f.constants.allocate(&[1u32; 4]).unwrap();
    f.ring.end_frame(frame, None).unwrap();

    let frame = f.ring.begin_frame().unwrap();
    f.constants.begin_frame(&frame);
    let second = f.constants.allocate(&[2u32; 4]).unwrap();
    assert_ne!(first.slot, second.slot);
    f.ring.end_frame(frame, None).unwrap();

    // Slot 0 data survives while slot 1 is recorded.
    let bytes = f.constants.arena().read(first.offset, 16).unwrap();
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    assert_eq!(words, vec![1, 1, 1, 1]);

    // Reusing slot 0 restarts at the beginning of its sub-arena.
    let frame = f.ring.begin_frame().unwrap();
    f.constants.begin_frame(&frame);
    let third = f.constants.allocate(&[3u32; 4]).unwrap();
    assert_eq!(third.offset, first.offset);
    assert_eq!(f.constants.used(1), second.size);
}
