//! The demo scene: three primitives under an orbit camera.

use std::sync::Arc;

use anyhow::Context;
use glam::{Quat, Vec3};
use tracing::{debug, error, info, warn};

use ember_core::config::RenderConfig;
use ember_core::{EngineConfig, GameTimer};
use ember_platform::{OrbitInput, Surface, Window, required_extensions};
use ember_renderer::{
    FrameInputs, FrameLifecycle, FrameOutcome, FrameStats, Renderer, RendererResult, ShaderBytecode, UiState,
};
use ember_resources::primitives;
use ember_rhi::device::Device;
use ember_rhi::instance::Instance;
use ember_rhi::physical_device::select_physical_device;
use ember_rhi::swapchain::Swapchain;
use ember_rhi::vulkan::VulkanDevice;
use ember_rhi::{CommandRecorder, Extent2d, GpuDevice};
use ember_scene::{Camera, RenderItemId, Transform};

/// Owns the Vulkan objects, the renderer and the scene state.
///
/// Field order is drop order: the renderer flushes the GPU before the
/// swapchain goes, and the surface and instance go last.
pub struct Sandbox {
    renderer: Renderer<VulkanDevice>,
    swapchain: Swapchain,
    camera: Camera,
    ui: UiState,
    render: RenderConfig,
    extent: Extent2d,
    spinner: Option<RenderItemId>,
    _surface: Surface,
    _instance: Instance,
}

impl Sandbox {
    pub fn new(window: &Window, config: &EngineConfig) -> anyhow::Result<Self> {
        let shaders = ShaderBytecode::load(&config.render.vertex_shader, &config.render.fragment_shader)
            .context("loading scene shaders")?;

        let extensions = required_extensions(window.raw_display_handle()?)?;
        let instance = Instance::new(&config.window.title, config.render.enable_validation, &extensions)
            .context("creating Vulkan instance")?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;
        let physical = select_physical_device(instance.handle(), surface.handle(), surface.loader())
            .context("selecting a GPU")?;
        let device = Device::new(&instance, &physical).context("creating logical device")?;
        let gpu = Arc::new(VulkanDevice::new(device, &physical));

        let extent = Extent2d::new(window.width(), window.height());
        let swapchain = Swapchain::new(&instance, &gpu, surface.handle(), extent, config.render.vsync)
            .context("creating swapchain")?;
        let mut renderer =
            Renderer::new(gpu.clone(), &swapchain, config, &shaders).context("creating renderer")?;
        renderer.set_clear_color(config.render.clear_color);

        let mut camera = Camera::new();
        camera.look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);

        Ok(Self {
            renderer,
            swapchain,
            camera,
            ui: UiState::new(gpu.adapter_name()),
            render: config.render.clone(),
            extent,
            spinner: None,
            _surface: surface,
            _instance: instance,
        })
    }

    fn apply_projection(&mut self) {
        self.camera.set_fov(
            self.render.fov_y_degrees.to_radians(),
            self.extent.width,
            self.extent.height,
            self.render.near_plane,
            self.render.far_plane,
        );
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }
}

impl FrameLifecycle for Sandbox {
    type Input = OrbitInput;

    fn on_create(&mut self) -> RendererResult<()> {
        let cube = Arc::new(primitives::cube(0.75));
        let cylinder = Arc::new(primitives::cylinder(0.5, 0.3, 2.0, 20, 4));
        let sphere = Arc::new(primitives::geosphere(0.8, 3));

        let spinner = self.renderer.add_render_item(cube, Transform::new().matrix())?;
        // Both cylinders draw from the same uploaded range.
        for x in [-2.5, 2.5] {
            let place = Transform::from_position(Vec3::new(x, 0.0, 0.0));
            self.renderer.add_render_item(cylinder.clone(), place.matrix())?;
        }
        let place = Transform::from_position(Vec3::new(0.0, 2.0, 0.0)).with_scale(Vec3::splat(0.75));
        self.renderer.add_render_item(sphere, place.matrix())?;
        self.renderer.upload_geometry()?;
        self.spinner = Some(spinner);

        self.apply_projection();
        info!("Scene ready: {} render items", self.renderer.items().len());
        Ok(())
    }

    fn on_update(&mut self, timer: &GameTimer, input: &OrbitInput) {
        if input.toggle_ui {
            self.ui.toggle();
            debug!("Overlay {}", if self.ui.show_ui { "shown" } else { "hidden" });
        }
        self.camera
            .apply_orbit_input(input.drag_delta.x, input.drag_delta.y, input.wheel, input.dragging);

        if let Some(id) = self.spinner {
            let spin = Transform::new().with_rotation(Quat::from_rotation_y(timer.total_secs()));
            if let Err(e) = self.renderer.set_transform(id, spin.matrix()) {
                warn!("Could not move item {:?}: {}", id, e);
            }
        }
    }

    fn on_render(&mut self, timer: &GameTimer, stats: &FrameStats) -> RendererResult<FrameOutcome> {
        self.ui.update_from(stats);

        let inputs = FrameInputs {
            camera: &self.camera,
            timer,
            ui: &self.ui,
        };
        // No text rendering here; the lines become debug labels a capture
        // tool can show.
        let outcome = self.renderer.render_frame(&mut self.swapchain, &inputs, |overlay| {
            for line in overlay.ui.lines(timer) {
                overlay.commands.insert_marker(&line);
            }
            Ok(())
        })?;

        let stale = match outcome {
            FrameOutcome::Presented { suboptimal, .. } => suboptimal,
            FrameOutcome::Skipped => true,
        };
        if stale {
            debug!("Swapchain out of date, recreating at {}", self.extent);
            self.on_resize(self.extent.width, self.extent.height)?;
        }
        Ok(outcome)
    }

    fn on_resize(&mut self, width: u32, height: u32) -> RendererResult<bool> {
        self.extent = Extent2d::new(width, height);
        let resized = self.renderer.on_resize(&mut self.swapchain, width, height)?;
        if resized {
            self.apply_projection();
        }
        Ok(resized)
    }

    fn on_destroy(&mut self) {
        if let Err(e) = self.renderer.flush() {
            error!("Flush on shutdown failed: {}", e);
        }
        let stats = self.renderer.stats();
        info!(
            "Shutting down after {} frames ({} skipped)",
            stats.frames_presented, stats.frames_skipped
        );
    }
}
