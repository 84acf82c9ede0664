//! Frame rate measurement.

/// Length of one measurement window in seconds.
pub const STATS_WINDOW_SECS: f32 = 0.1;

/// Number of ms/frame samples kept for the frame time graph.
pub const HISTORY_LEN: usize = 64;

/// Frames-per-second and milliseconds-per-frame over fixed windows.
///
/// Frames are counted until [`STATS_WINDOW_SECS`] of game time have passed,
/// then the rate is recomputed and the ms/frame value is pushed into a
/// ring of the last [`HISTORY_LEN`] samples.
#[derive(Debug, Clone)]
pub struct FrameStats {
    window: f32,
    window_start: f32,
    frames_in_window: u32,
    total_frames: u64,
    fps: f32,
    ms_per_frame: f32,
    history: [f32; HISTORY_LEN],
    cursor: usize,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::with_window(STATS_WINDOW_SECS)
    }

    pub fn with_window(window: f32) -> Self {
        Self {
            window: window.max(f32::EPSILON),
            window_start: 0.0,
            frames_in_window: 0,
            total_frames: 0,
            fps: 0.0,
            ms_per_frame: 0.0,
            history: [0.0; HISTORY_LEN],
            cursor: 0,
        }
    }

    /// Counts one frame finished at `total_time` seconds.
    ///
    /// Returns `true` when a window closed and the rates were recomputed.
    pub fn record_frame(&mut self, total_time: f32) -> bool {
        self.frames_in_window += 1;
        self.total_frames += 1;

        if total_time - self.window_start < self.window {
            return false;
        }

        self.fps = self.frames_in_window as f32 / self.window;
        self.ms_per_frame = 1000.0 / self.fps;
        self.frames_in_window = 0;
        self.window_start += self.window;
        if total_time - self.window_start >= self.window {
            // A hitch longer than a window; restart measuring from now.
            self.window_start = total_time;
        }

        self.history[self.cursor] = self.ms_per_frame;
        self.cursor = (self.cursor + 1) % HISTORY_LEN;
        true
    }

    /// Frames per second of the last closed window.
    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    #[inline]
    pub fn ms_per_frame(&self) -> f32 {
        self.ms_per_frame
    }

    #[inline]
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Raw sample ring; the slot at [`cursor`](Self::cursor) is the oldest.
    #[inline]
    pub fn history(&self) -> &[f32; HISTORY_LEN] {
        &self.history
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}
