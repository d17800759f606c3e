//! The host side of the debug server.
//!
//! The server never talks to the engine directly. Everything it needs from
//! its environment goes through a [`DebuggerHost`] handed to
//! [`DebugServer::new`](crate::DebugServer::new), so tests can drive the
//! server with a fake engine.

use crate::{
    ContextId, SourceId,
    error::ScriptError,
    event::ScriptSource,
    frame::{CallFrame, FrameInfo},
    script::{LiveEdit, ScriptOutcome},
    server::DebugServer,
};

/// A task the host runs later, on the same thread, from its task queue.
pub type DeferredTask = Box<dyn FnOnce()>;

/// Services the embedding engine provides to the debug server.
///
/// Only the nested event loop and task scheduling are mandatory; every other
/// method has a conservative default.
///
/// # Example
///
/// ```rust,ignore
/// use boa_debug_server::{ContextId, DebugServer, DebuggerHost, DeferredTask};
///
/// struct Host {
///     tasks: RefCell<Vec<DeferredTask>>,
/// }
///
/// impl DebuggerHost for Host {
///     fn run_event_loop_while_paused(&self, server: &DebugServer, _context: ContextId) {
///         while !server.resume_requested() {
///             // Read the next inspector command and forward it to `server`.
///         }
///     }
///
///     fn schedule_task(&self, task: DeferredTask) {
///         self.tasks.borrow_mut().push(task);
///     }
/// }
/// ```
pub trait DebuggerHost {
    /// Runs the host's event loop until the pause ends.
    ///
    /// Called from inside the hook that paused. Implementations process
    /// external events (inspector commands, timers) and return once
    /// [`DebugServer::resume_requested`] is `true`, or when the host is
    /// shutting down.
    fn run_event_loop_while_paused(&self, server: &DebugServer, context: ContextId);

    /// Schedules `task` to run on a later turn of the host's task queue.
    fn schedule_task(&self, task: DeferredTask);

    /// Called after listeners were told about a pause, before the nested loop.
    fn did_pause(&self, _context: ContextId) {}

    /// Called after the nested loop returned, before listeners are told.
    fn did_continue(&self, _context: ContextId) {}

    /// Whether the source belongs to a content (extension) script.
    fn is_content_script(&self, _source: &ScriptSource) -> bool {
        false
    }

    /// Evaluates a breakpoint condition in the given frame.
    ///
    /// Errors count as a false condition.
    fn evaluate_condition(&self, _frame: &CallFrame, _condition: &str) -> Result<bool, ScriptError> {
        Err(ScriptError::Unsupported("condition evaluation"))
    }

    /// Recompiles every function so instrumentation changes take effect.
    fn recompile_all_functions(&self) {}

    /// The engine's current frames, outermost first.
    fn current_frames(&self, _context: ContextId) -> Vec<FrameInfo> {
        Vec::new()
    }

    /// Whether live edits are supported.
    fn can_set_script_source(&self) -> bool {
        false
    }

    /// Replaces the text of a running source. With `preview` the edit is
    /// only validated.
    fn set_script_source(
        &self,
        _source: SourceId,
        _new_content: &str,
        _preview: bool,
    ) -> Result<LiveEdit, ScriptError> {
        Err(ScriptError::Unsupported("live edit"))
    }

    /// Compiles an expression without running it.
    fn compile_script(&self, _expression: &str, _source_url: &str) -> Result<SourceId, ScriptError> {
        Err(ScriptError::Unsupported("script compilation"))
    }

    /// Runs a script returned by [`DebuggerHost::compile_script`].
    ///
    /// Exceptions thrown by the script are reported in the outcome, not as
    /// errors.
    fn run_script(&self, _script: SourceId) -> Result<ScriptOutcome, ScriptError> {
        Err(ScriptError::Unsupported("script execution"))
    }

    /// Drops a compiled script that will never run.
    fn release_compiled_script(&self, _script: SourceId) {}
}
