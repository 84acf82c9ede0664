//! Frame phases of the orchestrator.

use std::fmt;

use crate::error::{RendererError, RendererResult};

/// Step of a frame. A frame walks the phases in declaration order and
/// returns to [`FramePhase::Idle`] after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FramePhase {
    #[default]
    Idle,
    AcquireContext,
    TransitionTargetsForWrite,
    Clear,
    BindPipelineState,
    RecordDraws,
    RecordUiOverlay,
    TransitionTargetsForPresent,
    Submit,
}

impl FramePhase {
    /// The only phase allowed to follow `self`.
    pub const fn next(self) -> FramePhase {
        match self {
            FramePhase::Idle => FramePhase::AcquireContext,
            FramePhase::AcquireContext => FramePhase::TransitionTargetsForWrite,
            FramePhase::TransitionTargetsForWrite => FramePhase::Clear,
            FramePhase::Clear => FramePhase::BindPipelineState,
            FramePhase::BindPipelineState => FramePhase::RecordDraws,
            FramePhase::RecordDraws => FramePhase::RecordUiOverlay,
            FramePhase::RecordUiOverlay => FramePhase::TransitionTargetsForPresent,
            FramePhase::TransitionTargetsForPresent => FramePhase::Submit,
            FramePhase::Submit => FramePhase::Idle,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FramePhase::Idle => "Idle",
            FramePhase::AcquireContext => "AcquireContext",
            FramePhase::TransitionTargetsForWrite => "TransitionTargetsForWrite",
            FramePhase::Clear => "Clear",
            FramePhase::BindPipelineState => "BindPipelineState",
            FramePhase::RecordDraws => "RecordDraws",
            FramePhase::RecordUiOverlay => "RecordUiOverlay",
            FramePhase::TransitionTargetsForPresent => "TransitionTargetsForPresent",
            FramePhase::Submit => "Submit",
        }
    }

    /// Move `current` to `to`, rejecting anything but the successor.
    pub fn advance(current: &mut FramePhase, to: FramePhase) -> RendererResult<()> {
        if current.next() != to {
            return Err(RendererError::PhaseOrder {
                from: *current,
                to,
            });
        }
        *current = to;
        Ok(())
    }
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_returns_to_idle() {
        let mut phase = FramePhase::Idle;
        let mut steps = 0;
        loop {
            phase = phase.next();
            steps += 1;
            if phase == FramePhase::Idle {
                break;
            }
        }
        assert_eq!(steps, 9);
    }

    #[test]
    fn test_skipping_a_phase_is_rejected() {
        let mut phase = FramePhase::AcquireContext;
        let err = FramePhase::advance(&mut phase, FramePhase::Clear).unwrap_err();
        assert!(matches!(
            err,
            RendererError::PhaseOrder {
                from: FramePhase::AcquireContext,
                to: FramePhase::Clear
            }
        ));
        assert_eq!(phase, FramePhase::AcquireContext);

        FramePhase::advance(&mut phase, FramePhase::TransitionTargetsForWrite).unwrap();
        assert_eq!(phase, FramePhase::TransitionTargetsForWrite);
    }
}
