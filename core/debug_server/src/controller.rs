//! The pause/resume/step state machine.
//!
//! The controller only holds state and makes decisions; the
//! [`DebugServer`](crate::DebugServer) runs the pause episode itself
//! (snapshot, dispatch, nested loop). All state lives in [`Cell`]s because
//! commands arrive re-entrantly from inside a pause.

use crate::{ContextId, SourceId};
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// The execution state of the debuggee.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExecutionState {
    /// Executing normally.
    #[default]
    Running,
    /// Stopped at a breakpoint.
    PausedOnBreakpoint,
    /// Stopped after a step command.
    PausedOnStep,
    /// Stopped at a thrown exception.
    PausedOnException,
    /// Stopped by an explicit request (`break_program`, `debugger;`, pause on
    /// next statement).
    PausedExplicit,
}

impl ExecutionState {
    /// Whether this is one of the paused states.
    #[must_use]
    pub const fn is_paused(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Whether thrown exceptions pause execution.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PauseOnExceptionsState {
    /// Exceptions never pause.
    #[default]
    #[serde(alias = "none")]
    DontPauseOnExceptions,
    /// Every thrown exception pauses.
    #[serde(alias = "all")]
    PauseOnAllExceptions,
    /// Only exceptions no handler will catch pause.
    #[serde(alias = "uncaught")]
    PauseOnUncaughtExceptions,
}

/// What the last resume command asked for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepIntent {
    /// Run until something else pauses.
    #[default]
    None,
    /// Stop at the next statement, whatever its frame.
    Into,
    /// Stop at the next statement at or above this frame depth.
    Over {
        /// Depth of the stack when the step began.
        depth: usize,
    },
    /// Stop at the next statement above this frame depth.
    Out {
        /// Depth of the stack when the step began.
        depth: usize,
    },
}

impl StepIntent {
    /// Whether a statement at `depth` completes the step.
    #[must_use]
    pub const fn is_satisfied_at(self, depth: usize) -> bool {
        match self {
            Self::None => false,
            Self::Into => true,
            Self::Over { depth: target } => depth <= target,
            Self::Out { depth: target } => depth < target,
        }
    }
}

/// The pause/resume/step state machine.
#[derive(Debug, Default)]
pub struct PauseController {
    state: Cell<ExecutionState>,
    paused_context: Cell<Option<ContextId>>,
    pause_on_exceptions: Cell<PauseOnExceptionsState>,
    pause_on_next_statement: Cell<bool>,
    step: Cell<StepIntent>,
    resume_requested: Cell<bool>,
    last_executed: Cell<Option<(SourceId, u32)>>,
}

impl PauseController {
    /// Creates a running controller.
    #[must_use]
    pub fn new(pause_on_exceptions: PauseOnExceptionsState, pause_on_next_statement: bool) -> Self {
        Self {
            pause_on_exceptions: Cell::new(pause_on_exceptions),
            pause_on_next_statement: Cell::new(pause_on_next_statement),
            ..Self::default()
        }
    }

    /// The current execution state.
    #[must_use]
    pub fn state(&self) -> ExecutionState {
        self.state.get()
    }

    /// Whether a pause episode is in progress.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.get().is_paused()
    }

    /// The context of the current pause episode.
    #[must_use]
    pub fn paused_context(&self) -> Option<ContextId> {
        self.paused_context.get()
    }

    /// The pending step command.
    #[must_use]
    pub fn step_intent(&self) -> StepIntent {
        self.step.get()
    }

    /// Whether the nested loop of the current pause should return.
    #[must_use]
    pub fn resume_requested(&self) -> bool {
        self.resume_requested.get()
    }

    /// Current exception policy.
    #[must_use]
    pub fn pause_on_exceptions_state(&self) -> PauseOnExceptionsState {
        self.pause_on_exceptions.get()
    }

    /// Changes the exception policy.
    pub fn set_pause_on_exceptions_state(&self, state: PauseOnExceptionsState) {
        self.pause_on_exceptions.set(state);
    }

    /// Requests (or cancels) an explicit pause at the next statement.
    pub fn set_pause_on_next_statement(&self, pause: bool) {
        self.pause_on_next_statement.set(pause);
    }

    /// Whether an explicit pause is pending.
    #[must_use]
    pub fn pause_requested(&self) -> bool {
        self.pause_on_next_statement.get()
    }

    /// Requests an explicit pause at the next statement boundary.
    ///
    /// Returns `false` and does nothing while already paused.
    pub fn request_break(&self) -> bool {
        if self.is_paused() {
            log::debug!("break requested while paused, ignored");
            return false;
        }
        self.pause_on_next_statement.set(true);
        true
    }

    /// The last line executed in `source`, if the previous statement was in it.
    #[must_use]
    pub fn previous_line(&self, source: SourceId) -> Option<u32> {
        self.last_executed
            .get()
            .and_then(|(last, line)| (last == source).then_some(line))
    }

    /// Remembers the statement that was just executed.
    pub fn record_executed(&self, source: SourceId, line: u32) {
        self.last_executed.set(Some((source, line)));
    }

    /// Decides whether a statement at `depth` pauses.
    ///
    /// An explicit request wins over a breakpoint hit, which wins over a
    /// completed step.
    #[must_use]
    pub fn statement_reason(&self, depth: usize, breakpoint_hit: bool) -> Option<ExecutionState> {
        if self.is_paused() {
            return None;
        }
        if self.pause_on_next_statement.get() {
            Some(ExecutionState::PausedExplicit)
        } else if breakpoint_hit {
            Some(ExecutionState::PausedOnBreakpoint)
        } else if self.step.get().is_satisfied_at(depth) {
            Some(ExecutionState::PausedOnStep)
        } else {
            None
        }
    }

    /// Decides whether a thrown exception pauses.
    #[must_use]
    pub fn exception_reason(&self, has_handler: bool) -> Option<ExecutionState> {
        if self.is_paused() {
            return None;
        }
        let pause = match self.pause_on_exceptions.get() {
            PauseOnExceptionsState::DontPauseOnExceptions => false,
            PauseOnExceptionsState::PauseOnAllExceptions => true,
            PauseOnExceptionsState::PauseOnUncaughtExceptions => !has_handler,
        };
        pause.then_some(ExecutionState::PausedOnException)
    }

    /// Starts a pause episode. Pending requests and steps are consumed.
    pub fn enter_pause(&self, reason: ExecutionState, context: ContextId) {
        debug_assert!(reason.is_paused());
        self.state.set(reason);
        self.paused_context.set(Some(context));
        self.pause_on_next_statement.set(false);
        self.step.set(StepIntent::None);
        self.resume_requested.set(false);
    }

    /// Handles a resume command (continue or one of the steps).
    ///
    /// Returns `false` and does nothing when not paused.
    pub fn resume(&self, intent: StepIntent) -> bool {
        if !self.is_paused() {
            log::debug!("resume ({intent:?}) while running, ignored");
            return false;
        }
        self.pause_on_next_statement.set(false);
        self.step.set(intent);
        self.resume_requested.set(true);
        true
    }

    /// Ends the pause episode.
    pub fn finish_pause(&self) {
        self.state.set(ExecutionState::Running);
        self.paused_context.set(None);
        self.resume_requested.set(false);
    }

    /// Drops any pending pause request or step.
    pub fn cancel_pending(&self) {
        self.pause_on_next_statement.set(false);
        self.step.set(StepIntent::None);
    }

    /// Drops a step over or out whose frames are gone.
    ///
    /// Step into and explicit requests stay pending.
    pub fn cancel_frame_step(&self) {
        if matches!(self.step.get(), StepIntent::Over { .. } | StepIntent::Out { .. }) {
            log::debug!("{:?} ended with its program", self.step.get());
            self.step.set(StepIntent::None);
        }
    }
}
