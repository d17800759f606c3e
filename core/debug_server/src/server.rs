//! The debug server façade.
//!
//! [`DebugServer`] composes the breakpoint registry, the call stack, the
//! pause controller, the listener dispatcher and the recompile coalescer. It
//! exposes the control API used by clients and the hook entry points called
//! by the engine.
//!
//! Every method takes `&self`: clients issue commands from inside listener
//! callbacks and from the host's nested loop while the engine is suspended
//! in a hook, so no borrow of the server's state is ever held across a call
//! into the host or a listener.

use crate::{
    ContextId, SourceId, TextPosition,
    breakpoint::{Breakpoint, BreakpointId, BreakpointRegistry, BreakpointSpec, ResolvedBreakpoint},
    config::DebugServerConfig,
    controller::{ExecutionState, PauseController, PauseOnExceptionsState, StepIntent},
    error::{BreakpointError, ScriptError},
    event::{HookSite, ParseError, PauseEvent, ScriptSource},
    frame::{CallFrameChain, CallStack, FrameInfo},
    host::DebuggerHost,
    listener::{DebugListener, EventCategory, ListenerDispatcher, ListenerId},
    recompile::RecompileCoalescer,
    script::{CompiledScripts, ScriptOutcome, ScriptSourceUpdate},
};
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

/// An in-process debug server for one engine.
pub struct DebugServer {
    this: Weak<DebugServer>,
    host: Rc<dyn DebuggerHost>,
    config: DebugServerConfig,
    breakpoints: RefCell<BreakpointRegistry>,
    call_stack: RefCell<CallStack>,
    /// Context of the code currently on the call stack.
    current_context: Cell<Option<ContextId>>,
    controller: PauseController,
    listeners: ListenerDispatcher,
    recompile: RecompileCoalescer,
    compiled_scripts: RefCell<CompiledScripts>,
}

impl fmt::Debug for DebugServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugServer")
            .field("config", &self.config)
            .field("breakpoints", &self.breakpoints)
            .field("call_stack", &self.call_stack)
            .field("controller", &self.controller)
            .field("listeners", &self.listeners)
            .field("recompile", &self.recompile)
            .finish_non_exhaustive()
    }
}

impl DebugServer {
    /// Creates a server with the default configuration.
    #[must_use]
    pub fn new(host: Rc<dyn DebuggerHost>) -> Rc<Self> {
        Self::with_config(host, DebugServerConfig::default())
    }

    /// Creates a server with the given configuration.
    #[must_use]
    pub fn with_config(host: Rc<dyn DebuggerHost>, config: DebugServerConfig) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            host,
            breakpoints: RefCell::new(BreakpointRegistry::new(config.breakpoints_activated)),
            call_stack: RefCell::default(),
            current_context: Cell::new(None),
            controller: PauseController::new(config.pause_on_exceptions, config.stop_on_entry),
            listeners: ListenerDispatcher::default(),
            recompile: RecompileCoalescer::default(),
            compiled_scripts: RefCell::default(),
            config,
        })
    }

    /// The configuration the server was created with.
    #[must_use]
    pub fn config(&self) -> &DebugServerConfig {
        &self.config
    }

    // Listeners

    /// Registers a listener on a context.
    ///
    /// The first listener of a context triggers a recompilation so the
    /// engine starts emitting debug hooks for it.
    pub fn add_listener(&self, context: ContextId, listener: Rc<dyn DebugListener>) -> ListenerId {
        let (id, created) = self.listeners.add(context, listener);
        if created {
            self.recompile_all_functions_soon();
        }
        id
    }

    /// Unregisters a listener. Removing the last one detaches the context.
    pub fn remove_listener(&self, context: ContextId, id: ListenerId) -> bool {
        let removed = self.listeners.remove(context, id);
        if removed && !self.listeners.has_listeners(context) {
            self.detach(context);
        }
        removed
    }

    /// Number of listeners registered on a context.
    #[must_use]
    pub fn listener_count(&self, context: ContextId) -> usize {
        self.listeners.listener_count(context)
    }

    /// Tears a context down: drops its listeners and, if it is paused or on
    /// the call stack, resumes it and forgets its frames.
    pub fn detach(&self, context: ContextId) {
        let dropped = self.listeners.detach(context);
        log::debug!("context {context} detached ({dropped} listeners)");

        if self.current_context.get() == Some(context) {
            self.call_stack.borrow_mut().clear();
            self.current_context.set(None);
            self.controller.cancel_pending();
        }
        if self.controller.paused_context() == Some(context) {
            self.controller.resume(StepIntent::None);
        }
        self.recompile_all_functions_soon();
    }

    // Breakpoints

    /// Sets a breakpoint at the first statement at or after the requested position.
    pub fn set_breakpoint(
        &self,
        source: SourceId,
        spec: BreakpointSpec,
    ) -> Result<ResolvedBreakpoint, BreakpointError> {
        self.breakpoints.borrow_mut().set_breakpoint(source, spec)
    }

    /// Removes a breakpoint. Unknown ids are ignored.
    pub fn remove_breakpoint(&self, id: BreakpointId) {
        self.breakpoints.borrow_mut().remove_breakpoint(id);
    }

    /// Removes every breakpoint.
    pub fn clear_breakpoints(&self) {
        self.breakpoints.borrow_mut().clear();
    }

    /// Enables or disables all breakpoints without deleting them.
    pub fn set_breakpoints_activated(&self, activated: bool) {
        log::debug!("breakpoints {}", if activated { "activated" } else { "deactivated" });
        self.breakpoints.borrow_mut().set_activated(activated);
    }

    /// Enables all breakpoints.
    pub fn activate_breakpoints(&self) {
        self.set_breakpoints_activated(true);
    }

    /// Disables all breakpoints.
    pub fn deactivate_breakpoints(&self) {
        self.set_breakpoints_activated(false);
    }

    /// Whether breakpoints take effect.
    #[must_use]
    pub fn breakpoints_activated(&self) -> bool {
        self.breakpoints.borrow().is_activated()
    }

    /// Whether an active breakpoint stops at `position`.
    #[must_use]
    pub fn has_breakpoint_at(&self, source: SourceId, position: TextPosition) -> bool {
        self.breakpoints.borrow().has_breakpoint_at(source, position)
    }

    /// Looks a breakpoint up by id.
    #[must_use]
    pub fn breakpoint(&self, id: BreakpointId) -> Option<Breakpoint> {
        self.breakpoints.borrow().breakpoint(id).cloned()
    }

    /// All stored breakpoints, in the order they were set.
    #[must_use]
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints
            .borrow()
            .breakpoints()
            .into_iter()
            .cloned()
            .collect()
    }

    // Pause state

    /// Changes the exception policy.
    pub fn set_pause_on_exceptions_state(&self, state: PauseOnExceptionsState) {
        self.controller.set_pause_on_exceptions_state(state);
    }

    /// The current exception policy.
    #[must_use]
    pub fn pause_on_exceptions_state(&self) -> PauseOnExceptionsState {
        self.controller.pause_on_exceptions_state()
    }

    /// Requests (or cancels) a pause at the next statement.
    pub fn set_pause_on_next_statement(&self, pause: bool) {
        self.controller.set_pause_on_next_statement(pause);
    }

    /// Pauses at the next statement boundary. Ignored while paused.
    pub fn break_program(&self) {
        self.controller.request_break();
    }

    /// Resumes execution. Ignored while running.
    pub fn continue_program(&self) {
        self.controller.resume(StepIntent::None);
    }

    /// Resumes and pauses at the next statement, entering calls.
    pub fn step_into_statement(&self) {
        self.controller.resume(StepIntent::Into);
    }

    /// Resumes and pauses at the next statement of the current frame or a caller.
    pub fn step_over_statement(&self) {
        let depth = self.call_stack.borrow().depth();
        self.controller.resume(StepIntent::Over { depth });
    }

    /// Resumes and pauses at the next statement of a caller.
    pub fn step_out_of_function(&self) {
        let depth = self.call_stack.borrow().depth();
        self.controller.resume(StepIntent::Out { depth });
    }

    /// Whether a pause episode is in progress.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.controller.is_paused()
    }

    /// The current execution state.
    #[must_use]
    pub fn execution_state(&self) -> ExecutionState {
        self.controller.state()
    }

    /// Whether the host's nested loop should return.
    #[must_use]
    pub fn resume_requested(&self) -> bool {
        self.controller.resume_requested()
    }

    /// The step command that will decide the next pause.
    #[must_use]
    pub fn step_intent(&self) -> StepIntent {
        self.controller.step_intent()
    }

    // Call stack

    /// The current call stack, publishing a new snapshot only if the stack
    /// moved since the last one.
    #[must_use]
    pub fn update_call_stack(&self) -> Option<CallFrameChain> {
        let chain = self.call_stack.borrow_mut().publish();
        (!chain.is_empty()).then_some(chain)
    }

    /// Rebuilds the call stack from the host's frames and publishes it.
    ///
    /// Needed when the live stack can no longer be trusted, e.g. after a
    /// live edit moved statements.
    pub fn rebuild_call_stack(&self) -> Option<CallFrameChain> {
        let context = self.current_context.get()?;
        let frames = self.host.current_frames(context);
        let mut call_stack = self.call_stack.borrow_mut();
        call_stack.rebuild(frames);
        let chain = call_stack.publish();
        (!chain.is_empty()).then_some(chain)
    }

    // Scripts

    /// Whether the host supports live edits.
    #[must_use]
    pub fn can_set_script_source(&self) -> bool {
        self.host.can_set_script_source()
    }

    /// Replaces the text of a running source.
    ///
    /// With `preview` the edit is only validated. Failures leave everything
    /// untouched.
    pub fn set_script_source(
        &self,
        source: SourceId,
        new_content: &str,
        preview: bool,
    ) -> Result<ScriptSourceUpdate, ScriptError> {
        let edit = self.host.set_script_source(source, new_content, preview)?;
        if preview {
            return Ok(ScriptSourceUpdate {
                call_frames: None,
                result: edit.result,
            });
        }

        log::debug!("source {source} edited");
        self.breakpoints
            .borrow_mut()
            .register_source(source, edit.statements);
        let call_frames = if self.is_paused() {
            self.rebuild_call_stack()
        } else {
            None
        };

        Ok(ScriptSourceUpdate {
            call_frames,
            result: edit.result,
        })
    }

    /// Compiles an expression for a later [`DebugServer::run_script`].
    pub fn compile_script(&self, expression: &str, source_url: &str) -> Result<SourceId, ScriptError> {
        let script = self.host.compile_script(expression, source_url)?;
        self.compiled_scripts
            .borrow_mut()
            .insert(script, source_url.to_owned());
        Ok(script)
    }

    /// Runs a compiled script once.
    pub fn run_script(&self, script: SourceId) -> Result<ScriptOutcome, ScriptError> {
        self.compiled_scripts
            .borrow_mut()
            .take(script)
            .ok_or(ScriptError::UnknownScript(script))?;
        self.host.run_script(script)
    }

    /// Drops every compiled script that was not run.
    pub fn clear_compiled_scripts(&self) {
        let scripts = self.compiled_scripts.borrow_mut().drain();
        for script in scripts {
            self.host.release_compiled_script(script);
        }
    }

    /// Number of compiled scripts waiting to run.
    #[must_use]
    pub fn compiled_script_count(&self) -> usize {
        self.compiled_scripts.borrow().len()
    }

    // Recompilation

    /// Schedules a recompilation of every function, coalescing requests made
    /// before the scheduled task runs.
    pub fn recompile_all_functions_soon(&self) {
        if !self.recompile.request() {
            return;
        }
        let this = self.this.clone();
        self.host.schedule_task(Box::new(move || {
            if let Some(server) = this.upgrade() {
                server.recompile_now();
            }
        }));
    }

    /// Whether a recompilation is scheduled.
    #[must_use]
    pub fn is_recompile_pending(&self) -> bool {
        self.recompile.is_pending()
    }

    fn recompile_now(&self) {
        if self.recompile.take() {
            log::info!("recompiling all functions (pass {})", self.recompile.passes());
            self.host.recompile_all_functions();
        }
    }

    // Engine hooks

    /// A source was compiled, or failed to compile when `error` is set.
    pub fn source_parsed(&self, context: ContextId, source: &ScriptSource, error: Option<&ParseError>) {
        if let Some(error) = error {
            log::trace!("source `{}` failed to parse: {}", source.url, error.message);
            self.listeners.dispatch(context, EventCategory::PARSE, |listener| {
                listener.failed_to_parse_source(self, source, error);
            });
            return;
        }

        log::trace!("source {} parsed ({})", source.id, source.url);
        self.breakpoints
            .borrow_mut()
            .register_source(source.id, source.statements.iter().copied());

        if !self.listeners.has_listeners(context) {
            return;
        }
        let is_content_script = self.host.is_content_script(source);
        if is_content_script && !self.config.report_content_scripts {
            return;
        }
        self.listeners.dispatch(context, EventCategory::PARSE, |listener| {
            listener.did_parse_source(self, source, is_content_script);
        });
    }

    /// A function was entered.
    pub fn call_event(&self, site: &HookSite, function_name: &str) {
        log::trace!("call {function_name} at {}:{}", site.source, site.position);
        self.current_context.set(Some(site.context));
        self.call_stack
            .borrow_mut()
            .push(FrameInfo::new(site.source, site.position, function_name));
    }

    /// The engine is about to execute the statement at `site`.
    pub fn at_statement(&self, site: &HookSite) {
        log::trace!("statement at {}:{}", site.source, site.position);
        self.update_position(site);
        self.pause_if_needed(site);
    }

    /// A function is returning.
    pub fn return_event(&self, site: &HookSite) {
        log::trace!("return at {}:{}", site.source, site.position);
        self.update_position(site);
        self.pop_frame();
    }

    /// An exception is being thrown at `site`.
    pub fn exception(&self, site: &HookSite, has_handler: bool) {
        log::trace!("exception at {}:{} (handled: {has_handler})", site.source, site.position);
        self.update_position(site);
        if !self.listeners.has_listeners(site.context) {
            return;
        }
        if let Some(reason) = self.controller.exception_reason(has_handler) {
            self.pause(site.context, reason, None);
        }
    }

    /// A top-level program is about to run.
    pub fn will_execute_program(&self, site: &HookSite) {
        log::trace!("program {} starting", site.source);
        self.current_context.set(Some(site.context));
        self.call_stack
            .borrow_mut()
            .push(FrameInfo::new(site.source, site.position, ""));
    }

    /// A top-level program finished.
    pub fn did_execute_program(&self, site: &HookSite) {
        log::trace!("program {} finished", site.source);
        self.update_position(site);
        self.pop_frame();
    }

    /// A `debugger;` statement was reached.
    pub fn did_reach_breakpoint(&self, site: &HookSite) {
        log::trace!("debugger statement at {}:{}", site.source, site.position);
        self.update_position(site);
        if self.controller.request_break() {
            self.pause_if_needed(site);
        }
    }

    /// Leaving the outermost frame ends any step over or out of it.
    fn pop_frame(&self) {
        let mut call_stack = self.call_stack.borrow_mut();
        call_stack.pop();
        if call_stack.depth() == 0 {
            self.controller.cancel_frame_step();
        }
    }

    fn update_position(&self, site: &HookSite) {
        self.current_context.set(Some(site.context));
        self.call_stack
            .borrow_mut()
            .update_top(site.source, site.position);
    }

    fn pause_if_needed(&self, site: &HookSite) {
        if self.controller.is_paused() {
            return;
        }
        if !self.listeners.has_listeners(site.context) {
            self.controller.record_executed(site.source, site.position.line);
            return;
        }

        let hit = if self.controller.pause_requested() {
            None
        } else {
            self.breakpoint_hit(site)
        };
        let depth = self.call_stack.borrow().depth();
        let reason = self.controller.statement_reason(depth, hit.is_some());
        self.controller.record_executed(site.source, site.position.line);

        if let Some(reason) = reason {
            self.pause(site.context, reason, hit);
        }
    }

    /// The first breakpoint at `site` whose condition holds.
    fn breakpoint_hit(&self, site: &HookSite) -> Option<BreakpointId> {
        let previous_line = self.controller.previous_line(site.source);
        let candidates: Vec<_> = self
            .breakpoints
            .borrow()
            .breakpoints_at(site.source, site.position, previous_line)
            .map(|bp| (bp.id(), bp.condition().map(str::to_owned)))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let frames = self.call_stack.borrow_mut().publish();
        let top = frames.top()?;
        candidates.into_iter().find_map(|(id, condition)| {
            let Some(condition) = condition else {
                return Some(id);
            };
            match self.host.evaluate_condition(top, &condition) {
                Ok(true) => Some(id),
                Ok(false) => None,
                Err(err) => {
                    log::debug!("condition of breakpoint {id} failed: {err}");
                    None
                }
            }
        })
    }

    /// Runs one pause episode.
    fn pause(&self, context: ContextId, reason: ExecutionState, hit_breakpoint: Option<BreakpointId>) {
        let call_frames = self.call_stack.borrow_mut().publish();
        self.controller.enter_pause(reason, context);
        log::debug!("paused ({reason:?}) in context {context}");

        let event = PauseEvent {
            context,
            reason,
            call_frames,
            hit_breakpoint,
        };
        self.listeners.dispatch(context, EventCategory::PAUSE, |listener| {
            listener.did_pause(self, &event);
        });
        self.host.did_pause(context);

        if !self.controller.resume_requested() {
            self.host.run_event_loop_while_paused(self, context);
        }

        self.host.did_continue(context);
        self.listeners.dispatch(context, EventCategory::CONTINUE, |listener| {
            listener.did_continue(self);
        });
        self.controller.finish_pause();
        log::debug!("resumed context {context} ({:?})", self.controller.step_intent());
    }
}
