//! Integration tests for the frame resource ring.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use ember_renderer::{FrameRing, RendererError};
use ember_rhi::headless::{FenceControl, FenceMode, HeadlessDevice};
use ember_rhi::{GpuDevice, GpuFence};

fn ring(frames: usize, mode: FenceMode, timeout: Duration) -> (FrameRing<HeadlessDevice>, FenceControl) {
    let device = Arc::new(HeadlessDevice::new().with_fence_mode(mode));
    let fence = device.create_fence("frames").unwrap();
    let control = device.fence_control("frames").unwrap();
    (FrameRing::new(device, fence, frames, timeout).unwrap(), control)
}

#[test]
fn test_immediate_fence_never_blocks() {
    let (mut ring, control) = ring(3, FenceMode::Immediate, Duration::from_secs(5));
    let start = Instant::now();

    for expected in 1..=10u64 {
        let frame = ring.begin_frame().unwrap();
        assert_eq!(frame.slot(), ((expected - 1) % 3) as usize);
        let value = ring.end_frame(frame, None).unwrap();
        assert_eq!(value, expected);
    }

    assert_eq!(control.completed_value(), 10);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_withheld_slot_blocks_until_completed() {
    let (mut ring, control) = ring(2, FenceMode::Manual, Duration::from_secs(10));

    let first = ring.begin_frame().unwrap();
    assert_eq!(ring.end_frame(first, None).unwrap(), 1);
    let second = ring.begin_frame().unwrap();
    assert_eq!(ring.end_frame(second, None).unwrap(), 2);

    // Slot 0 waits for value 1, which the GPU has not reached.
    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        let frame = ring.begin_frame();
        tx.send(frame.map(|frame| frame.slot())).unwrap();
        ring
    });

    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    control.complete_through(1);
    let slot = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(slot, 0);
    assert_eq!(control.completed_value(), 1);

    let ring = worker.join().unwrap();
    assert!(ring.is_recording());
}

#[test]
fn test_slot_is_never_handed_out_unresolved() {
    let (mut ring, control) = ring(3, FenceMode::Manual, Duration::from_secs(5));
    let mut submitted = Vec::new();

    for _ in 0..20 {
        // Keep the two newest frames in flight.
        if submitted.len() >= 2 {
            control.complete_through(submitted[submitted.len() - 2]);
        }

        let slot = ring.next_slot();
        let required = ring.fence_value(slot).unwrap();
        let frame = ring.begin_frame().unwrap();
        assert_eq!(frame.slot(), slot);
        assert!(ring.fence().completed_value().unwrap() >= required);

        submitted.push(ring.end_frame(frame, None).unwrap());
    }
}

#[test]
fn test_wait_timeout_is_fatal() {
    let (mut ring, _control) = ring(1, FenceMode::Manual, Duration::from_millis(10));
    let frame = ring.begin_frame().unwrap();
    ring.end_frame(frame, None).unwrap();

    let err = ring.begin_frame().unwrap_err();
    assert!(matches!(err, RendererError::DeviceLost(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_flush_completes_everything() {
    let (mut ring, control) = ring(2, FenceMode::Manual, Duration::from_secs(5));
    let frame = ring.begin_frame().unwrap();
    ring.end_frame(frame, None).unwrap();

    let flusher = {
        let control = control.clone();
        thread::spawn(move || {
            // Wait for the flush signal before completing it.
            while control.signaled_value() < 2 {
                thread::sleep(Duration::from_millis(1));
            }
            control.complete_all();
        })
    };
    ring.flush().unwrap();
    flusher.join().unwrap();

    assert_eq!(control.completed_value(), control.signaled_value());
}

#[test]
fn test_submissions_carry_slot_labels() {
    let device = Arc::new(HeadlessDevice::new());
    let fence = device.create_fence("frames").unwrap();
    let mut ring = FrameRing::new(device.clone(), fence, 2, Duration::from_secs(1)).unwrap();

    for _ in 0..3 {
        let frame = ring.begin_frame().unwrap();
        ring.end_frame(frame, None).unwrap();
    }

    let labels: Vec<String> = device.submissions().into_iter().map(|s| s.list).collect();
    assert_eq!(labels, vec!["frame 0", "frame 1", "frame 0"]);
}
