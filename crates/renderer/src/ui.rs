//! Debug overlay state and the overlay hook.
//!
//! The overlay itself is drawn by whoever consumes [`OverlayContext`]; the
//! renderer only guarantees that the hook runs inside the frame's command
//! list, after the scene pass and before the present transition.

use ember_core::GameTimer;
use ember_rhi::{Extent2d, GpuDevice};

use crate::frame_stats::FrameStats;

/// Toggles and values shown by the debug overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct UiState {
    /// Whole overlay; toggled with F1.
    pub show_ui: bool,
    pub show_fps: bool,
    pub show_milliseconds: bool,
    pub show_system_info: bool,
    pub last_fps: f32,
    pub ms_per_frame: f32,
    pub device_name: String,
}

impl UiState {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            show_ui: true,
            show_fps: true,
            show_milliseconds: true,
            show_system_info: true,
            last_fps: 0.0,
            ms_per_frame: 0.0,
            device_name: device_name.into(),
        }
    }

    pub fn toggle(&mut self) {
        self.show_ui = !self.show_ui;
    }

    /// Copies the latest measurement.
    pub fn update_from(&mut self, stats: &FrameStats) {
        self.last_fps = stats.fps();
        self.ms_per_frame = stats.ms_per_frame();
    }

    /// Text lines of the overlay, empty while hidden.
    pub fn lines(&self, timer: &GameTimer) -> Vec<String> {
        if !self.show_ui {
            return Vec::new();
        }
        let mut lines = Vec::new();
        if self.show_fps {
            lines.push(format!("Last FPS: {:.3}", self.last_fps));
        }
        if self.show_milliseconds {
            lines.push(format!("MS per frame: {:.3}", self.ms_per_frame));
            lines.push(format!("Delta time: {:.3}", timer.delta_secs()));
            lines.push(format!("Total time: {:.3}", timer.total_secs()));
        }
        if self.show_system_info {
            lines.push(format!("GPU: {}", self.device_name));
        }
        lines
    }
}

impl Default for UiState {
    fn default() -> Self {
        Self::new("")
    }
}

/// What the overlay hook gets to work with.
pub struct OverlayContext<'a, D: GpuDevice> {
    /// The frame's open command list, inside no pass.
    pub commands: &'a mut D::CommandList,
    /// Back buffer being drawn to.
    pub back_buffer: &'a D::BackBuffer,
    pub extent: Extent2d,
    pub ui: &'a UiState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_hides_everything() {
        let timer = GameTimer::new();
        let mut ui = UiState::new("Test GPU");
        assert!(ui.lines(&timer).iter().any(|line| line == "GPU: Test GPU"));

        ui.toggle();
        assert!(ui.lines(&timer).is_empty());
        ui.toggle();
        assert!(ui.show_ui);
    }

    #[test]
    fn test_sections_follow_flags() {
        let timer = GameTimer::new();
        let mut ui = UiState::new("Test GPU");
        ui.show_milliseconds = false;
        ui.show_system_info = false;
        ui.last_fps = 60.0;
        assert_eq!(ui.lines(&timer), vec!["Last FPS: 60.000".to_string()]);
    }

    #[test]
    fn test_update_from_stats() {
        let mut stats = FrameStats::with_window(1.0);
        for i in 1..=4 {
            stats.record_frame(i as f32 * 0.25);
        }
        let mut ui = UiState::default();
        ui.update_from(&stats);
        assert_eq!(ui.last_fps, 4.0);
        assert_eq!(ui.ms_per_frame, 250.0);
    }
}
