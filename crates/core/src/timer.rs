//! Game timer with pause support.
//!
//! The timer reports the time between consecutive [`GameTimer::tick`] calls
//! and the total running time, excluding every span during which it was
//! stopped.

use std::time::{Duration, Instant};

/// Frame timer that can be paused and resumed.
#[derive(Debug, Clone)]
pub struct GameTimer {
    base: Instant,
    prev: Instant,
    current: Instant,
    stopped_at: Option<Instant>,
    paused: Duration,
    delta: Duration,
}

impl GameTimer {
    /// Create a timer that starts running now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            base: now,
            prev: now,
            current: now,
            stopped_at: None,
            paused: Duration::ZERO,
            delta: Duration::ZERO,
        }
    }

    /// Restart the timer from now, clearing paused time.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Resume a stopped timer. The stopped span is excluded from
    /// [`total_secs`](Self::total_secs).
    pub fn start(&mut self) {
        if let Some(stopped_at) = self.stopped_at.take() {
            let now = Instant::now();
            self.paused += now.saturating_duration_since(stopped_at);
            self.prev = now;
            self.current = now;
        }
    }

    /// Stop the timer. Ticks while stopped report a zero delta.
    pub fn stop(&mut self) {
        if self.stopped_at.is_none() {
            self.stopped_at = Some(Instant::now());
        }
    }

    /// Advance the timer by one frame.
    pub fn tick(&mut self) {
        if self.is_stopped() {
            self.delta = Duration::ZERO;
            return;
        }

        let now = Instant::now();
        self.current = now;
        // Instant is monotonic; saturating keeps the delta non-negative
        // should a platform clock misbehave.
        self.delta = now.saturating_duration_since(self.prev);
        self.prev = now;
    }

    /// Whether the timer is currently stopped.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped_at.is_some()
    }

    /// Seconds between the last two ticks.
    #[inline]
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Seconds since reset, excluding time spent stopped.
    pub fn total_secs(&self) -> f32 {
        let end = self.stopped_at.unwrap_or(self.current);
        end.saturating_duration_since(self.base)
            .saturating_sub(self.paused)
            .as_secs_f32()
    }
}

impl Default for GameTimer {
    fn default() -> Self {
        Self::new()
    }
}
