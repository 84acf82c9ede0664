//! Ember host.
//!
//! Opens a window, builds the demo scene and pumps winit events into a
//! [`FrameDriver`]. The first argument names a TOML config file; without
//! one, `ember.toml` is used if present and defaults otherwise.

mod sandbox;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use ember_core::{EngineConfig, init_logging_with};
use ember_platform::{InputState, Window};
use ember_renderer::FrameDriver;

use crate::sandbox::Sandbox;

const DEFAULT_CONFIG_PATH: &str = "ember.toml";

/// Trackpads report pixels; the camera wants wheel lines.
const PIXELS_PER_LINE: f32 = 120.0;

struct App {
    config: EngineConfig,
    // Declared before the window so the surface goes first.
    driver: Option<FrameDriver<Sandbox>>,
    window: Option<Window>,
    input: InputState,
    shown_fps: f32,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            driver: None,
            window: None,
            input: InputState::new(),
            shown_fps: 0.0,
            failure: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window).context("creating window")?;
        let mut driver = FrameDriver::new(Sandbox::new(&window, &self.config)?);
        driver.create().context("building scene")?;

        info!("Initialization complete, entering main loop");
        self.driver = Some(driver);
        self.window = Some(window);
        Ok(())
    }

    /// Records a fatal error and leaves the loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        error!("{:#}", error);
        self.failure = Some(error);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut driver) = self.driver.take() {
            driver.destroy();
        }
        event_loop.exit();
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(driver) = self.driver.as_mut() else {
            return Ok(());
        };

        let input = self.input.snapshot();
        driver.frame(&input).context("rendering frame")?;
        self.input.begin_frame();

        let fps = driver.stats().fps();
        if fps != self.shown_fps
            && let Some(window) = &self.window
        {
            self.shown_fps = fps;
            window.set_title(&format!(
                "{}  fps: {:.0}  mspf: {:.3}",
                self.config.window.title,
                fps,
                driver.stats().ms_per_frame()
            ));
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.start(event_loop)
        {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                let changed = self
                    .window
                    .as_mut()
                    .is_some_and(|window| window.resize(size.width, size.height));
                if changed
                    && let Some(driver) = self.driver.as_mut()
                    && let Err(e) = driver.resize(size.width, size.height)
                {
                    self.fail(event_loop, anyhow::Error::new(e).context("resizing"));
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    match event.state {
                        ElementState::Pressed if code == KeyCode::Escape => self.shutdown(event_loop),
                        ElementState::Pressed => self.input.on_key_pressed(code),
                        ElementState::Released => self.input.on_key_released(code),
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => self.input.on_mouse_pressed(button.into()),
                ElementState::Released => self.input.on_mouse_released(button.into()),
            },
            WindowEvent::CursorMoved { position, .. } => {
                self.input.on_mouse_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::CursorLeft { .. } => self.input.on_cursor_left(),
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_LINE,
                };
                self.input.on_scroll(lines);
            }
            WindowEvent::Focused(false) => self.input.on_focus_lost(),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = EngineConfig::load_or_default(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    init_logging_with(&config.log_filter);
    info!("Starting Ember ({} frames in flight)", config.frames.frame_count);

    let event_loop = EventLoop::new().context("creating event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("running event loop")?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => {
            info!("Exited cleanly");
            Ok(())
        }
    }
}
