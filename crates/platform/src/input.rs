//! Keyboard and mouse state gathered between frames.
//!
//! winit delivers events one at a time; [`InputState`] folds them into a
//! per-frame picture and [`InputState::snapshot`] hands the renderer-facing
//! part of it to the lifecycle as an [`OrbitInput`].

use std::collections::HashSet;

use glam::Vec2;

pub use winit::keyboard::KeyCode;

/// Key that shows or hides the stats overlay.
pub const TOGGLE_UI_KEY: KeyCode = KeyCode::F1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Other,
        }
    }
}

/// What the orbit camera and overlay need from one frame of input.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrbitInput {
    /// Cursor travel in pixels since the previous frame.
    pub drag_delta: Vec2,
    /// Wheel travel in lines since the previous frame, positive away from the user.
    pub wheel: f32,
    /// Left button held.
    pub dragging: bool,
    /// F1 went down this frame.
    pub toggle_ui: bool,
}

#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
    just_released_keys: HashSet<KeyCode>,

    pressed_buttons: HashSet<MouseButton>,
    just_pressed_buttons: HashSet<MouseButton>,

    // None until the first cursor event, so entering the window is not a jump.
    mouse_position: Option<Vec2>,
    mouse_delta: Vec2,
    scroll_delta: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the per-frame edges and deltas. Call after the frame consumed them.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.just_released_keys.clear();
        self.just_pressed_buttons.clear();
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        // Auto-repeat arrives as more presses; only the first is an edge.
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        if self.pressed_keys.remove(&key) {
            self.just_released_keys.insert(key);
        }
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        if self.pressed_buttons.insert(button) {
            self.just_pressed_buttons.insert(button);
        }
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    /// Moves the cursor, accumulating travel until the next [`Self::begin_frame`].
    pub fn on_mouse_moved(&mut self, x: f32, y: f32) {
        let position = Vec2::new(x, y);
        if let Some(previous) = self.mouse_position {
            self.mouse_delta += position - previous;
        }
        self.mouse_position = Some(position);
    }

    /// Cursor left the window; the next entry starts a fresh track.
    pub fn on_cursor_left(&mut self) {
        self.mouse_position = None;
    }

    pub fn on_scroll(&mut self, lines: f32) {
        self.scroll_delta += lines;
    }

    /// Focus loss swallows release events, so forget everything held.
    pub fn on_focus_lost(&mut self) {
        self.pressed_keys.clear();
        self.pressed_buttons.clear();
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn is_key_just_released(&self, key: KeyCode) -> bool {
        self.just_released_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn is_mouse_just_pressed(&self, button: MouseButton) -> bool {
        self.just_pressed_buttons.contains(&button)
    }

    pub fn mouse_position(&self) -> Option<Vec2> {
        self.mouse_position
    }

    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    pub fn scroll_delta(&self) -> f32 {
        self.scroll_delta
    }

    pub fn snapshot(&self) -> OrbitInput {
        OrbitInput {
            drag_delta: self.mouse_delta,
            wheel: self.scroll_delta,
            dragging: self.is_mouse_pressed(MouseButton::Left),
            toggle_ui: self.is_key_just_pressed(TOGGLE_UI_KEY),
        }
    }
}
