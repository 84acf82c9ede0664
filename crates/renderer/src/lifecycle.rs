//! Application lifecycle and the host-side frame driver.
//!
//! An application implements [`FrameLifecycle`]; the window host owns a
//! [`FrameDriver`] and forwards window events to it. The driver owns the
//! [`GameTimer`] and the [`FrameStats`], pauses the timer while the window
//! is minimized and only renders while it is not.

use tracing::{debug, info};

use ember_core::GameTimer;

use crate::error::RendererResult;
use crate::frame_stats::FrameStats;
use crate::renderer::FrameOutcome;

/// Hooks the host calls, in order: `on_create` once, then any number of
/// `on_update` + `on_render` pairs and `on_resize` calls, then
/// `on_destroy` once.
pub trait FrameLifecycle {
    /// Per-frame input snapshot.
    type Input;

    fn on_create(&mut self) -> RendererResult<()>;

    fn on_update(&mut self, timer: &GameTimer, input: &Self::Input);

    fn on_render(&mut self, timer: &GameTimer, stats: &FrameStats) -> RendererResult<FrameOutcome>;

    /// Called with a non-zero size. Returns whether anything was resized.
    fn on_resize(&mut self, width: u32, height: u32) -> RendererResult<bool>;

    fn on_destroy(&mut self);
}

/// Drives a [`FrameLifecycle`] from window events.
pub struct FrameDriver<L: FrameLifecycle> {
    app: L,
    timer: GameTimer,
    stats: FrameStats,
    paused: bool,
    destroyed: bool,
}

impl<L: FrameLifecycle> FrameDriver<L> {
    pub fn new(app: L) -> Self {
        Self {
            app,
            timer: GameTimer::new(),
            stats: FrameStats::new(),
            paused: false,
            destroyed: false,
        }
    }

    /// Runs `on_create` and starts the clock.
    pub fn create(&mut self) -> RendererResult<()> {
        self.app.on_create()?;
        self.timer.reset();
        info!("Application created");
        Ok(())
    }

    /// Handles a new client size. A zero dimension pauses the timer and
    /// rendering; the next non-zero size resumes both.
    pub fn resize(&mut self, width: u32, height: u32) -> RendererResult<bool> {
        if width == 0 || height == 0 {
            if !self.paused {
                self.paused = true;
                self.timer.stop();
                info!("Minimized, rendering paused");
            }
            return Ok(false);
        }
        if self.paused {
            self.paused = false;
            self.timer.start();
            info!("Restored, rendering resumed");
        }
        self.app.on_resize(width, height)
    }

    /// Ticks the timer and, unless paused, updates and renders one frame.
    ///
    /// Returns `None` while paused.
    pub fn frame(&mut self, input: &L::Input) -> RendererResult<Option<FrameOutcome>> {
        self.timer.tick();
        if self.paused {
            return Ok(None);
        }

        self.app.on_update(&self.timer, input);
        let outcome = self.app.on_render(&self.timer, &self.stats)?;
        if let FrameOutcome::Presented { .. } = outcome {
            self.stats.record_frame(self.timer.total_secs());
        }
        Ok(Some(outcome))
    }

    /// Runs `on_destroy` once.
    pub fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.app.on_destroy();
            debug!("Application destroyed after {} frames", self.stats.total_frames());
        }
    }

    #[inline]
    pub fn app(&self) -> &L {
        &self.app
    }

    #[inline]
    pub fn app_mut(&mut self) -> &mut L {
        &mut self.app
    }

    #[inline]
    pub fn timer(&self) -> &GameTimer {
        &self.timer
    }

    #[inline]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl<L: FrameLifecycle> Drop for FrameDriver<L> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl FrameLifecycle for Recorder {
        type Input = u32;

        fn on_create(&mut self) -> RendererResult<()> {
            self.calls.push("create".into());
            Ok(())
        }

        fn on_update(&mut self, _timer: &GameTimer, input: &u32) {
            self.calls.push(format!("update {input}"));
        }

        fn on_render(&mut self, _timer: &GameTimer, _stats: &FrameStats) -> RendererResult<FrameOutcome> {
            self.calls.push("render".into());
            Ok(FrameOutcome::Presented {
                fence_value: 1,
                suboptimal: false,
            })
        }

        fn on_resize(&mut self, width: u32, height: u32) -> RendererResult<bool> {
            self.calls.push(format!("resize {width}x{height}"));
            Ok(true)
        }

        fn on_destroy(&mut self) {
            self.calls.push("destroy".into());
        }
    }

    #[test]
    fn test_call_order() {
        let mut driver = FrameDriver::new(Recorder::default());
        driver.create().unwrap();
        driver.frame(&7).unwrap();
        driver.resize(800, 600).unwrap();
        driver.destroy();
        driver.destroy();

        assert_eq!(
            driver.app().calls,
            vec!["create", "update 7", "render", "resize 800x600", "destroy"]
        );
        assert_eq!(driver.stats().total_frames(), 1);
    }

    #[test]
    fn test_minimize_pauses() {
        let mut driver = FrameDriver::new(Recorder::default());
        driver.create().unwrap();

        assert!(!driver.resize(0, 600).unwrap());
        assert!(driver.is_paused());
        assert!(driver.timer().is_stopped());
        assert!(driver.frame(&1).unwrap().is_none());

        assert!(driver.resize(800, 600).unwrap());
        assert!(!driver.is_paused());
        assert!(!driver.timer().is_stopped());
        assert!(driver.frame(&2).unwrap().is_some());

        assert_eq!(
            driver.app().calls,
            vec!["create", "resize 800x600", "update 2", "render"]
        );
    }
}
