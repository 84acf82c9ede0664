//! End-to-end tests of the frame orchestrator on the headless backend.

mod common;

use std::sync::Arc;

use glam::{Mat4, Vec3};

use ember_core::GameTimer;
use ember_renderer::{
    FrameInputs, FrameOutcome, FramePhase, HeapKind, OverlayContext, PerObjectConstants,
    RendererError, UiState,
};
use ember_resources::primitives::{cube, cylinder, geosphere};
use ember_rhi::headless::{Command, HeadlessDevice};
use ember_rhi::{CommandRecorder, DeviceLimits, Extent2d, GpuBuffer, ScissorRect, TargetState, Viewport};
use ember_scene::{Camera, DrawArgs, RenderItemId};

use common::{Harness, config, harness, harness_with};

fn render(h: &mut Harness) -> FrameOutcome {
    let camera = Camera::new();
    let timer = GameTimer::new();
    let ui = UiState::new("Headless");
    let inputs = FrameInputs {
        camera: &camera,
        timer: &timer,
        ui: &ui,
    };
    h.renderer
        .render_frame(&mut h.swapchain, &inputs, |_| Ok(()))
        .unwrap()
}

fn draws(device: &HeadlessDevice) -> Vec<(u32, u32, i32)> {
    device
        .last_submission()
        .unwrap()
        .draws()
        .map(|command| match command {
            Command::DrawIndexed {
                index_count,
                start_index,
                base_vertex,
            } => (*index_count, *start_index, *base_vertex),
            _ => unreachable!(),
        })
        .collect()
}

fn constant_bindings(device: &HeadlessDevice) -> Vec<(u32, u32)> {
    device
        .last_submission()
        .unwrap()
        .commands
        .iter()
        .filter_map(|command| match command {
            Command::BindConstants {
                per_frame,
                per_object,
            } => Some((*per_frame, *per_object)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_startup_takes_views() {
    let h = harness(Extent2d::new(1920, 1080));
    let heaps = h.renderer.view_heaps();
    assert_eq!(heaps.allocated(HeapKind::Rtv), 3);
    assert_eq!(heaps.allocated(HeapKind::Dsv), 1);
    assert_eq!(heaps.allocated(HeapKind::CbvSrvUav), 2);
    assert_eq!(heaps.allocated(HeapKind::Sampler), 0);
    assert_eq!(h.renderer.back_buffer_views().len(), 3);
    assert_eq!(h.renderer.depth_extent(), Extent2d::new(1920, 1080));
    assert_eq!(h.renderer.phase(), FramePhase::Idle);
    assert_eq!(
        h.renderer.pipeline().constant_arena(),
        h.renderer.constant_allocator().arena().id()
    );
}

#[test]
fn test_too_few_rtv_slots() {
    let mut config = config(2);
    config.heaps.rtv = 2;
    let device = Arc::new(HeadlessDevice::new());
    let swapchain = ember_rhi::headless::HeadlessSwapChain::new(Extent2d::new(64, 64), 3);
    let err = ember_renderer::Renderer::new(device, &swapchain, &config, &common::shaders())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        RendererError::HeapExhausted {
            heap: HeapKind::Rtv,
            capacity: 2
        }
    ));
}

#[test]
fn test_cumulative_draw_offsets() {
    let mut h = harness(Extent2d::new(800, 600));
    let a = Arc::new(cube(1.0));
    let b = Arc::new(cylinder(0.5, 0.3, 3.0, 20, 20));
    let c = Arc::new(geosphere(0.5, 3));

    let ia = h.renderer.add_render_item(a.clone(), Mat4::IDENTITY).unwrap();
    let ib = h.renderer.add_render_item(b.clone(), Mat4::IDENTITY).unwrap();
    let ia2 = h.renderer.add_render_item(a.clone(), Mat4::IDENTITY).unwrap();
    let ic = h.renderer.add_render_item(c.clone(), Mat4::IDENTITY).unwrap();
    h.renderer.upload_geometry().unwrap();

    let args = |id: RenderItemId| h.renderer.item(id).unwrap().draw_args().unwrap();
    let (va, vb) = (a.vertex_count() as i32, b.vertex_count() as i32);
    let (na, nb) = (a.index_count() as u32, b.index_count() as u32);

    assert_eq!(
        args(ia),
        DrawArgs {
            index_count: na,
            start_index: 0,
            base_vertex: 0
        }
    );
    assert_eq!(args(ib).base_vertex, va);
    assert_eq!(args(ib).start_index, na);
    assert_eq!(args(ic).base_vertex, va + vb);
    assert_eq!(args(ic).start_index, na + nb);
    assert_eq!(args(ic).index_count, c.index_count() as u32);
    // A shared mesh is uploaded once.
    assert_eq!(args(ia2), args(ia));
}

#[test]
fn test_uploaded_geometry_matches_meshes() {
    let mut h = harness(Extent2d::new(800, 600));
    let a = Arc::new(cube(1.0));
    let b = Arc::new(cylinder(0.5, 0.5, 1.0, 8, 2));
    h.renderer.add_render_item(a.clone(), Mat4::IDENTITY).unwrap();
    h.renderer.add_render_item(b.clone(), Mat4::IDENTITY).unwrap();
    h.renderer.upload_geometry().unwrap();

    let contents = h.renderer.geometry_pool().buffer().unwrap().contents();
    let vertex_bytes = a.vertex_bytes().len();
    assert_eq!(&contents[..vertex_bytes], a.vertex_bytes());
    assert_eq!(
        &contents[vertex_bytes..vertex_bytes + b.vertex_bytes().len()],
        b.vertex_bytes()
    );
}

#[test]
fn test_frame_command_sequence() {
    let mut h = harness(Extent2d::new(800, 600));
    h.renderer
        .add_render_item(Arc::new(cube(1.0)), Mat4::IDENTITY)
        .unwrap();
    h.renderer.upload_geometry().unwrap();

    let camera = Camera::new();
    let timer = GameTimer::new();
    let ui = UiState::new("Headless");
    let inputs = FrameInputs {
        camera: &camera,
        timer: &timer,
        ui: &ui,
    };
    let mut overlay_extent = None;
    let outcome = h
        .renderer
        .render_frame(&mut h.swapchain, &inputs, |ctx: &mut OverlayContext<'_, HeadlessDevice>| {
            overlay_extent = Some(ctx.extent);
            assert!(ctx.ui.show_ui);
            ctx.commands.insert_marker("overlay");
            Ok(())
        })
        .unwrap();

    assert_eq!(
        outcome,
        FrameOutcome::Presented {
            fence_value: 1,
            suboptimal: false
        }
    );
    assert_eq!(overlay_extent, Some(Extent2d::new(800, 600)));
    assert_eq!(h.renderer.phase(), FramePhase::Idle);
    assert_eq!(h.swapchain.presented(), 1);

    let submission = h.device.last_submission().unwrap();
    assert_eq!(submission.target, Some(0));
    let kinds: Vec<&str> = submission
        .commands
        .iter()
        .map(|command| match command {
            Command::TransitionBackBuffer { .. } => "transition",
            Command::TransitionDepth { .. } => "depth",
            Command::BeginPass { .. } => "begin",
            Command::SetViewport(_) => "viewport",
            Command::SetScissor(_) => "scissor",
            Command::BindPipeline(_) => "pipeline",
            Command::BindVertexBuffer { .. } => "vertices",
            Command::BindIndexBuffer { .. } => "indices",
            Command::BindConstants { .. } => "constants",
            Command::DrawIndexed { .. } => "draw",
            Command::EndPass => "end",
            Command::Marker(_) => "marker",
            Command::CopyBuffer { .. } => "copy",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "transition", "depth", "begin", "viewport", "scissor", "pipeline", "vertices",
            "indices", "constants", "draw", "end", "marker", "transition",
        ]
    );

    assert_eq!(
        submission.commands[0],
        Command::TransitionBackBuffer {
            image: 0,
            from: TargetState::Present,
            to: TargetState::RenderTarget
        }
    );
    assert_eq!(
        submission.commands[12],
        Command::TransitionBackBuffer {
            image: 0,
            from: TargetState::RenderTarget,
            to: TargetState::Present
        }
    );
}

#[test]
fn test_shared_mesh_draws_with_distinct_constants() {
    let mut h = harness(Extent2d::new(800, 600));
    let mesh = Arc::new(cube(1.0));
    let left = Mat4::from_translation(Vec3::new(-2.0, 0.0, 0.0));
    let right = Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0));
    h.renderer.add_render_item(mesh.clone(), left).unwrap();
    h.renderer.add_render_item(mesh, right).unwrap();
    h.renderer.upload_geometry().unwrap();

    render(&mut h);

    let draws = draws(&h.device);
    assert_eq!(draws, vec![(36, 0, 0), (36, 0, 0)]);

    let bindings = constant_bindings(&h.device);
    assert_eq!(bindings.len(), 2);
    assert_eq!(bindings[0].0, bindings[1].0);
    assert_ne!(bindings[0].1, bindings[1].1);

    let arena = h.renderer.constant_allocator().arena();
    for ((_, offset), world) in bindings.iter().zip([left, right]) {
        let bytes = arena
            .read(u64::from(*offset), PerObjectConstants::SIZE as u64)
            .unwrap();
        let constants: PerObjectConstants = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(constants.world, world);
    }
}

#[test]
fn test_resize_recreates_only_size_dependent_state() {
    let mut h = harness(Extent2d::new(1920, 1080));
    h.renderer
        .add_render_item(Arc::new(cube(1.0)), Mat4::IDENTITY)
        .unwrap();
    h.renderer.upload_geometry().unwrap();
    render(&mut h);

    let pipeline = Arc::clone(h.renderer.pipeline());
    let buffer_id = h.renderer.geometry_pool().buffer().unwrap().id();
    let depth_id = h.renderer.depth_target().id();
    let rtvs = h.renderer.view_heaps().allocated(HeapKind::Rtv);

    assert!(h.renderer.on_resize(&mut h.swapchain, 800, 600).unwrap());

    assert_eq!(h.renderer.depth_extent(), Extent2d::new(800, 600));
    assert_ne!(h.renderer.depth_target().id(), depth_id);
    assert_eq!(h.renderer.viewport(), Viewport::full(Extent2d::new(800, 600)));
    assert_eq!(
        h.renderer.scissor(),
        ScissorRect {
            x: 0,
            y: 0,
            width: 800,
            height: 600
        }
    );
    assert!(Arc::ptr_eq(&pipeline, h.renderer.pipeline()));
    assert_eq!(h.renderer.geometry_pool().buffer().unwrap().id(), buffer_id);
    assert_eq!(h.renderer.view_heaps().allocated(HeapKind::Rtv), rtvs);
    assert_eq!(h.swapchain.resizes(), 1);

    // The next frame renders at the new size.
    render(&mut h);
    let submission = h.device.last_submission().unwrap();
    assert!(submission.commands.contains(&Command::SetViewport(Viewport::full(
        Extent2d::new(800, 600)
    ))));
}

#[test]
fn test_zero_sized_resize_is_skipped() {
    let mut h = harness(Extent2d::new(800, 600));
    assert!(!h.renderer.on_resize(&mut h.swapchain, 0, 600).unwrap());
    assert!(!h.renderer.on_resize(&mut h.swapchain, 800, 0).unwrap());
    assert_eq!(h.renderer.depth_extent(), Extent2d::new(800, 600));
    assert_eq!(h.swapchain.resizes(), 0);
}

#[test]
fn test_out_of_date_swapchain_skips_frame() {
    let mut h = harness(Extent2d::new(800, 600));
    h.swapchain.invalidate();

    assert_eq!(render(&mut h), FrameOutcome::Skipped);
    assert_eq!(h.renderer.phase(), FramePhase::Idle);
    assert!(h.device.submissions().is_empty());
    assert_eq!(h.renderer.stats().frames_skipped, 1);

    h.renderer.on_resize(&mut h.swapchain, 800, 600).unwrap();
    assert!(matches!(render(&mut h), FrameOutcome::Presented { .. }));
}

#[test]
fn test_failed_overlay_leaves_renderer_idle() {
    let mut h = harness(Extent2d::new(800, 600));
    let camera = Camera::new();
    let timer = GameTimer::new();
    let ui = UiState::default();
    let inputs = FrameInputs {
        camera: &camera,
        timer: &timer,
        ui: &ui,
    };

    let err = h
        .renderer
        .render_frame(&mut h.swapchain, &inputs, |_| {
            Err(RendererError::InvalidRequest("overlay failed".to_string()))
        })
        .unwrap_err();
    assert!(matches!(err, RendererError::InvalidRequest(_)));
    assert_eq!(h.renderer.phase(), FramePhase::Idle);
    assert!(!h.renderer.frame_ring().is_recording());
    assert!(h.device.submissions().is_empty());

    assert!(matches!(render(&mut h), FrameOutcome::Presented { .. }));
    assert_eq!(h.device.submissions().len(), 1);
}

#[test]
fn test_exhausted_constants_abandon_frame() {
    let device = HeadlessDevice::new().with_limits(DeviceLimits {
        min_uniform_offset_alignment: 256,
        max_uniform_range: 65_536,
    });
    // Per slot: 512 bytes of per-frame constants and room for one item.
    let mut config = config(3);
    config.memory.constant_arena_bytes = 3 * 768;
    let mut h = harness_with(device, Extent2d::new(800, 600), &config);

    let mesh = Arc::new(cube(1.0));
    h.renderer.add_render_item(mesh.clone(), Mat4::IDENTITY).unwrap();
    h.renderer.add_render_item(mesh, Mat4::IDENTITY).unwrap();
    h.renderer.upload_geometry().unwrap();
    let uploads = h.device.submissions().len();

    let camera = Camera::new();
    let timer = GameTimer::new();
    let ui = UiState::default();
    let inputs = FrameInputs {
        camera: &camera,
        timer: &timer,
        ui: &ui,
    };
    let err = h
        .renderer
        .render_frame(&mut h.swapchain, &inputs, |_| Ok(()))
        .unwrap_err();
    assert!(matches!(err, RendererError::ArenaExhausted { .. }));
    assert_eq!(h.renderer.phase(), FramePhase::Idle);
    assert!(!h.renderer.frame_ring().is_recording());
    assert_eq!(h.device.submissions().len(), uploads);

    // The next frame runs the same sequence and fails the same way, not
    // on phase order.
    let err = h
        .renderer
        .render_frame(&mut h.swapchain, &inputs, |_| Ok(()))
        .unwrap_err();
    assert!(matches!(err, RendererError::ArenaExhausted { .. }));
}

#[test]
fn test_items_require_upload() {
    let mut h = harness(Extent2d::new(800, 600));
    h.renderer
        .add_render_item(Arc::new(cube(1.0)), Mat4::IDENTITY)
        .unwrap();

    let camera = Camera::new();
    let timer = GameTimer::new();
    let ui = UiState::default();
    let inputs = FrameInputs {
        camera: &camera,
        timer: &timer,
        ui: &ui,
    };
    let err = h
        .renderer
        .render_frame(&mut h.swapchain, &inputs, |_| Ok(()))
        .unwrap_err();
    assert!(matches!(err, RendererError::GeometryNotUploaded));
}

#[test]
fn test_items_after_upload() {
    let mut h = harness(Extent2d::new(800, 600));
    let mesh = Arc::new(cube(1.0));
    h.renderer.add_render_item(mesh.clone(), Mat4::IDENTITY).unwrap();
    h.renderer.upload_geometry().unwrap();

    let id = h
        .renderer
        .add_render_item(mesh, Mat4::from_translation(Vec3::X))
        .unwrap();
    assert!(h.renderer.item(id).unwrap().draw_args().is_some());

    let err = h
        .renderer
        .add_render_item(Arc::new(cube(1.0)), Mat4::IDENTITY)
        .unwrap_err();
    assert!(matches!(err, RendererError::PoolSealed));
    assert!(matches!(
        h.renderer.upload_geometry(),
        Err(RendererError::PoolSealed)
    ));
}

#[test]
fn test_set_transform() {
    let mut h = harness(Extent2d::new(800, 600));
    let id = h
        .renderer
        .add_render_item(Arc::new(cube(1.0)), Mat4::IDENTITY)
        .unwrap();
    let moved = Mat4::from_translation(Vec3::Y);
    h.renderer.set_transform(id, moved).unwrap();
    assert_eq!(h.renderer.item(id).unwrap().world(), moved);

    let err = h
        .renderer
        .set_transform(RenderItemId::new(5), moved)
        .unwrap_err();
    assert!(matches!(err, RendererError::UnknownItem(id) if id.index() == 5));
}

#[test]
fn test_ring_slots_and_fence_values_across_frames() {
    let mut h = harness(Extent2d::new(800, 600));
    for expected in 1..=7u64 {
        match render(&mut h) {
            FrameOutcome::Presented { fence_value, .. } => assert_eq!(fence_value, expected),
            FrameOutcome::Skipped => panic!("frame {expected} skipped"),
        }
    }
    let labels: Vec<String> = h.device.submissions().into_iter().map(|s| s.list).collect();
    assert_eq!(labels[..4], ["frame 0", "frame 1", "frame 2", "frame 0"]);
    assert_eq!(h.renderer.stats().frames_presented, 7);
}

#[test]
fn test_drop_flushes() {
    let h = harness_with(HeadlessDevice::new(), Extent2d::new(64, 64), &config(2));
    let device = h.device.clone();
    let fence = device.fence_control("frame ring").unwrap();
    drop(h);
    assert_eq!(fence.signaled_value(), 1);
    assert_eq!(fence.completed_value(), 1);
}
