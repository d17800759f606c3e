//! Integration tests for the debug server.
//!
//! A fake engine drives the hook entry points the way an interpreter would,
//! and a fake host runs the nested loop by replaying queued client commands.

use boa_debug_server::{
    BreakpointError, BreakpointSpec, CallFrame, ContextId, DebugListener, DebugServer,
    DebugServerConfig, DebuggerHost, DeferredTask, ExecutionState, FrameInfo, HookSite, LiveEdit,
    ParseError, PauseEvent, PauseOnExceptionsState, ScriptError, ScriptOutcome, ScriptSource,
    SourceId, StepIntent, TextPosition,
};
use indoc::indoc;
use serde_json::json;
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};
use test_case::test_case;

const CTX: ContextId = ContextId::new(1);
const OTHER: ContextId = ContextId::new(2);
const MAIN: SourceId = SourceId::new(1);

const PROGRAM: &str = indoc! {"
    function add(a, b) {
        let sum = a + b;
        return sum;
    }

    let x = 1;
    let y = add(x, 2);
    log(y);
"};

type Journal = Rc<RefCell<Vec<String>>>;
type Command = Box<dyn FnOnce(&DebugServer)>;

/// Every position of a text where a statement starts, one per non-blank line.
fn statements_of(text: &str) -> Vec<TextPosition> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && line.trim() != "}")
        .filter(|(_, line)| !line.trim_start().starts_with("function"))
        .map(|(index, line)| {
            let column = line.len() - line.trim_start().len();
            TextPosition::new(index as u32, column as u32)
        })
        .collect()
}

struct FakeHost {
    journal: Journal,
    commands: RefCell<VecDeque<Command>>,
    tasks: RefCell<Vec<DeferredTask>>,
    loops: Cell<usize>,
    recompiles: Cell<usize>,
    frames: RefCell<Vec<FrameInfo>>,
    scripts: RefCell<Vec<(SourceId, String)>>,
    released: RefCell<Vec<SourceId>>,
}

impl FakeHost {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            commands: RefCell::default(),
            tasks: RefCell::default(),
            loops: Cell::new(0),
            recompiles: Cell::new(0),
            frames: RefCell::default(),
            scripts: RefCell::default(),
            released: RefCell::default(),
        }
    }

    /// Queues a client command for the next nested loop.
    fn then<F: FnOnce(&DebugServer) + 'static>(&self, command: F) {
        self.commands.borrow_mut().push_back(Box::new(command));
    }

    fn run_tasks(&self) {
        let tasks = std::mem::take(&mut *self.tasks.borrow_mut());
        for task in tasks {
            task();
        }
    }
}

impl DebuggerHost for FakeHost {
    fn run_event_loop_while_paused(&self, server: &DebugServer, _context: ContextId) {
        self.loops.set(self.loops.get() + 1);
        while !server.resume_requested() {
            let command = self.commands.borrow_mut().pop_front();
            match command {
                Some(command) => command(server),
                None => server.continue_program(),
            }
        }
    }

    fn schedule_task(&self, task: DeferredTask) {
        self.tasks.borrow_mut().push(task);
    }

    fn did_pause(&self, context: ContextId) {
        self.journal.borrow_mut().push(format!("host:pause {context}"));
    }

    fn did_continue(&self, context: ContextId) {
        self.journal.borrow_mut().push(format!("host:continue {context}"));
    }

    fn is_content_script(&self, source: &ScriptSource) -> bool {
        source.url.starts_with("extension://")
    }

    fn evaluate_condition(&self, frame: &CallFrame, condition: &str) -> Result<bool, ScriptError> {
        match condition {
            "true" => Ok(true),
            "false" => Ok(false),
            "in add" => Ok(frame.function_name() == "add"),
            _ => Err(ScriptError::Evaluation(format!("cannot evaluate `{condition}`"))),
        }
    }

    fn recompile_all_functions(&self) {
        self.recompiles.set(self.recompiles.get() + 1);
    }

    fn current_frames(&self, _context: ContextId) -> Vec<FrameInfo> {
        self.frames.borrow().clone()
    }

    fn can_set_script_source(&self) -> bool {
        true
    }

    fn set_script_source(
        &self,
        _source: SourceId,
        new_content: &str,
        _preview: bool,
    ) -> Result<LiveEdit, ScriptError> {
        if new_content.contains("syntax error") {
            return Err(ScriptError::Compilation {
                message: "unexpected token".into(),
                line: Some(0),
            });
        }
        Ok(LiveEdit {
            statements: statements_of(new_content),
            result: json!({ "changed": true }),
        })
    }

    fn compile_script(&self, expression: &str, _source_url: &str) -> Result<SourceId, ScriptError> {
        if expression.trim().is_empty() {
            return Err(ScriptError::compilation("empty expression"));
        }
        let mut scripts = self.scripts.borrow_mut();
        let id = SourceId::new(100 + scripts.len() as u64);
        scripts.push((id, expression.to_owned()));
        Ok(id)
    }

    fn run_script(&self, script: SourceId) -> Result<ScriptOutcome, ScriptError> {
        let scripts = self.scripts.borrow();
        let (_, expression) = scripts
            .iter()
            .find(|(id, _)| *id == script)
            .ok_or(ScriptError::UnknownScript(script))?;
        Ok(match expression.strip_prefix("throw ") {
            Some(message) => ScriptOutcome::thrown(json!(message), message),
            None => ScriptOutcome::completed(json!(expression)),
        })
    }

    fn release_compiled_script(&self, script: SourceId) {
        self.released.borrow_mut().push(script);
    }
}

type PauseHandler = Box<dyn Fn(&DebugServer, &PauseEvent)>;

struct Recorder {
    journal: Journal,
    pauses: RefCell<Vec<PauseEvent>>,
    on_pause: RefCell<Option<PauseHandler>>,
}

impl Recorder {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            pauses: RefCell::default(),
            on_pause: RefCell::default(),
        }
    }

    fn on_pause<F: Fn(&DebugServer, &PauseEvent) + 'static>(&self, handler: F) {
        *self.on_pause.borrow_mut() = Some(Box::new(handler));
    }

    fn pause_count(&self) -> usize {
        self.pauses.borrow().len()
    }
}

impl DebugListener for Recorder {
    fn did_pause(&self, server: &DebugServer, event: &PauseEvent) {
        let position = event
            .call_frames
            .top()
            .map(CallFrame::position)
            .unwrap_or_default();
        self.journal
            .borrow_mut()
            .push(format!("pause:{:?}@{position}", event.reason));
        self.pauses.borrow_mut().push(event.clone());
        if let Some(handler) = &*self.on_pause.borrow() {
            handler(server, event);
        }
    }

    fn did_continue(&self, _server: &DebugServer) {
        self.journal.borrow_mut().push("continue".to_owned());
    }

    fn did_parse_source(&self, _server: &DebugServer, source: &ScriptSource, is_content_script: bool) {
        self.journal
            .borrow_mut()
            .push(format!("parsed:{} content={is_content_script}", source.url));
    }

    fn failed_to_parse_source(&self, _server: &DebugServer, source: &ScriptSource, error: &ParseError) {
        self.journal
            .borrow_mut()
            .push(format!("failed:{}:{}", source.url, error.line));
    }
}

struct Fixture {
    journal: Journal,
    host: Rc<FakeHost>,
    server: Rc<DebugServer>,
    recorder: Rc<Recorder>,
}

fn fixture() -> Fixture {
    fixture_with(DebugServerConfig::default())
}

fn fixture_with(config: DebugServerConfig) -> Fixture {
    let journal = Journal::default();
    let host = Rc::new(FakeHost::new(journal.clone()));
    let server = DebugServer::with_config(host.clone(), config);
    let recorder = Rc::new(Recorder::new(journal.clone()));
    server.add_listener(CTX, recorder.clone());
    host.run_tasks();

    let source = ScriptSource::new(MAIN, "main.js", PROGRAM).with_statements(statements_of(PROGRAM));
    server.source_parsed(CTX, &source, None);
    journal.borrow_mut().clear();

    Fixture {
        journal,
        host,
        server,
        recorder,
    }
}

impl Fixture {
    fn site(&self, line: u32, column: u32) -> HookSite {
        HookSite::new(CTX, MAIN, TextPosition::new(line, column))
    }

    fn statement(&self, line: u32, column: u32) {
        self.server.at_statement(&self.site(line, column));
    }

    /// Executes `PROGRAM` hook by hook.
    fn run_program(&self) {
        self.server.will_execute_program(&self.site(0, 0));
        self.statement(5, 0);
        self.statement(6, 0);
        self.server.call_event(&self.site(1, 4), "add");
        self.statement(1, 4);
        self.statement(2, 4);
        self.server.return_event(&self.site(2, 4));
        self.statement(7, 0);
        self.server.did_execute_program(&self.site(7, 0));
    }

    fn journal(&self) -> Vec<String> {
        self.journal.borrow().clone()
    }

    fn pause_positions(&self) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter(|entry| entry.starts_with("pause:"))
            .collect()
    }
}

#[test]
fn statement_positions_of_the_program() {
    assert_eq!(
        statements_of(PROGRAM),
        [
            TextPosition::new(1, 4),
            TextPosition::new(2, 4),
            TextPosition::new(5, 0),
            TextPosition::new(6, 0),
            TextPosition::new(7, 0),
        ]
    );
}

#[test]
fn breakpoint_pauses_exactly_once() {
    eprintln!("\n=== Testing breakpoint pause/continue cycle ===\n");
    let f = fixture();

    let resolved = f.server.set_breakpoint(MAIN, BreakpointSpec::new(4, 0)).unwrap();
    assert_eq!((resolved.actual_line, resolved.actual_column), (5, 0));

    f.run_program();

    assert_eq!(
        f.journal(),
        [
            "pause:PausedOnBreakpoint@5:0",
            "host:pause #1",
            "host:continue #1",
            "continue",
        ]
    );
    assert_eq!(f.host.loops.get(), 1);
    assert_eq!(f.recorder.pauses.borrow()[0].hit_breakpoint, Some(resolved.id));
    assert_eq!(f.server.execution_state(), ExecutionState::Running);
}

#[test]
fn breakpoint_on_a_blank_line_moves_to_the_next_statement() {
    let f = fixture();
    let source = SourceId::new(10);
    f.server.source_parsed(
        CTX,
        &ScriptSource::new(source, "gap.js", "").with_statements([TextPosition::new(11, 0)]),
        None,
    );

    let resolved = f.server.set_breakpoint(source, BreakpointSpec::new(10, 0)).unwrap();
    assert_eq!((resolved.actual_line, resolved.actual_column), (11, 0));
    assert!(f.server.has_breakpoint_at(source, TextPosition::new(11, 0)));

    let site = HookSite::new(CTX, source, TextPosition::new(11, 0));
    f.server.at_statement(&site);
    assert_eq!(f.recorder.pause_count(), 1);
    assert_eq!(f.recorder.pauses.borrow()[0].hit_breakpoint, Some(resolved.id));

    f.server.remove_breakpoint(resolved.id);
    assert!(!f.server.has_breakpoint_at(source, TextPosition::new(11, 0)));
}

#[test]
fn state_is_visible_from_inside_the_pause() {
    let f = fixture();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(6, 0)).unwrap();

    let seen = Rc::new(RefCell::new(None));
    let sink = seen.clone();
    f.host.then(move |server| {
        let chain = server.update_call_stack().unwrap();
        *sink.borrow_mut() = Some((
            server.execution_state(),
            server.is_paused(),
            chain.top().unwrap().position(),
        ));
    });
    f.run_program();

    assert_eq!(
        *seen.borrow(),
        Some((ExecutionState::PausedOnBreakpoint, true, TextPosition::new(6, 0)))
    );
}

#[test]
fn pause_event_serializes_for_front_ends() {
    let f = fixture();
    let resolved = f.server.set_breakpoint(MAIN, BreakpointSpec::new(1, 0)).unwrap();
    f.run_program();

    let event = serde_json::to_value(&f.recorder.pauses.borrow()[0]).unwrap();
    assert_eq!(event["reason"], "PausedOnBreakpoint");
    assert_eq!(event["context"], 1);
    assert_eq!(event["hitBreakpoint"], resolved.id.to_string().parse::<u32>().unwrap());
    assert_eq!(event["callFrames"][0]["functionName"], "add");
    assert_eq!(event["callFrames"][0]["caller"], 1);
    assert_eq!(event["callFrames"][1]["line"], 6);
}

#[test]
fn step_over_skips_the_call() {
    let f = fixture();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(6, 0)).unwrap();
    f.host.then(DebugServer::step_over_statement);

    f.run_program();

    assert_eq!(
        f.pause_positions(),
        ["pause:PausedOnBreakpoint@6:0", "pause:PausedOnStep@7:0"]
    );
}

#[test]
fn step_into_then_out() {
    let f = fixture();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(6, 0)).unwrap();
    f.host.then(DebugServer::step_into_statement);
    f.host.then(DebugServer::step_out_of_function);

    f.run_program();

    assert_eq!(
        f.pause_positions(),
        [
            "pause:PausedOnBreakpoint@6:0",
            "pause:PausedOnStep@1:4",
            "pause:PausedOnStep@7:0",
        ]
    );

    let pauses = f.recorder.pauses.borrow();
    let inside = &pauses[1].call_frames;
    let names: Vec<_> = inside.iter().map(CallFrame::function_name).collect();
    assert_eq!(names, ["add", ""]);
    assert_eq!(inside.caller_of(inside.top().unwrap()).unwrap().position(), TextPosition::new(6, 0));
}

#[test]
fn step_over_at_the_end_of_a_function_stops_in_the_caller() {
    let f = fixture();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(2, 0)).unwrap();
    f.host.then(DebugServer::step_over_statement);

    f.run_program();

    assert_eq!(
        f.pause_positions(),
        ["pause:PausedOnBreakpoint@2:4", "pause:PausedOnStep@7:0"]
    );
}

#[test_case(DebugServer::step_over_statement => Vec::<String>::new(); "step over")]
#[test_case(DebugServer::step_out_of_function => Vec::<String>::new(); "step out")]
#[test_case(DebugServer::step_into_statement => vec!["pause:PausedOnStep@5:0".to_owned()]; "step into")]
fn stepping_past_the_end_of_a_program(step: fn(&DebugServer)) -> Vec<String> {
    let f = fixture();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(7, 0)).unwrap();
    f.host.then(step);
    f.run_program();
    assert_eq!(f.pause_positions(), ["pause:PausedOnBreakpoint@7:0"]);

    f.server.clear_breakpoints();
    f.journal.borrow_mut().clear();
    f.run_program();
    f.pause_positions()
}

#[test]
fn step_over_ending_a_program_is_dropped() {
    let f = fixture();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(7, 0)).unwrap();
    f.host.then(|server| {
        server.step_over_statement();
        assert_eq!(server.step_intent(), StepIntent::Over { depth: 1 });
    });

    f.run_program();
    assert_eq!(f.server.step_intent(), StepIntent::None);
}

#[test]
fn step_commands_while_running_are_ignored() {
    let f = fixture();
    f.server.step_into_statement();
    f.server.step_over_statement();
    f.server.continue_program();
    assert_eq!(f.server.step_intent(), StepIntent::None);

    f.run_program();
    assert_eq!(f.recorder.pause_count(), 0);
}

#[test_case("true" => 1)]
#[test_case("false" => 0)]
#[test_case("   " => 1; "blank condition is unconditional")]
#[test_case("no such variable" => 0; "failing condition does not pause")]
fn conditional_breakpoints(condition: &str) -> usize {
    let f = fixture();
    f.server
        .set_breakpoint(MAIN, BreakpointSpec::new(7, 0).with_condition(condition))
        .unwrap();
    f.run_program();
    f.recorder.pause_count()
}

#[test]
fn conditions_see_the_current_frame() {
    let f = fixture();
    f.server
        .set_breakpoint(MAIN, BreakpointSpec::new(5, 0).with_condition("in add"))
        .unwrap();
    f.server
        .set_breakpoint(MAIN, BreakpointSpec::new(1, 0).with_condition("in add"))
        .unwrap();
    f.run_program();

    assert_eq!(f.pause_positions(), ["pause:PausedOnBreakpoint@1:4"]);
}

#[test]
fn first_matching_breakpoint_is_reported() {
    let f = fixture();
    f.server
        .set_breakpoint(MAIN, BreakpointSpec::new(7, 0).with_condition("false"))
        .unwrap();
    let first = f
        .server
        .set_breakpoint(MAIN, BreakpointSpec::new(7, 0).with_condition("true"))
        .unwrap();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(7, 0)).unwrap();

    f.run_program();

    assert_eq!(f.recorder.pause_count(), 1);
    assert_eq!(f.recorder.pauses.borrow()[0].hit_breakpoint, Some(first.id));
}

#[test]
fn breakpoint_errors() {
    let f = fixture();
    assert_eq!(
        f.server.set_breakpoint(SourceId::new(9), BreakpointSpec::new(0, 0)),
        Err(BreakpointError::UnknownSource(SourceId::new(9)))
    );
    assert!(matches!(
        f.server.set_breakpoint(MAIN, BreakpointSpec::new(8, 0)),
        Err(BreakpointError::NoStatementPosition { .. })
    ));

    let first = f.server.set_breakpoint(MAIN, BreakpointSpec::new(3, 0)).unwrap();
    let error = f.server.set_breakpoint(MAIN, BreakpointSpec::new(5, 0)).unwrap_err();
    assert_eq!(
        error,
        BreakpointError::Duplicate {
            source_id: MAIN,
            position: TextPosition::new(5, 0),
            existing: first.id,
        }
    );
    assert_eq!(f.server.breakpoints().len(), 1);
}

#[test]
fn remove_and_clear_breakpoints() {
    let f = fixture();
    let a = f.server.set_breakpoint(MAIN, BreakpointSpec::new(5, 0)).unwrap();
    let b = f.server.set_breakpoint(MAIN, BreakpointSpec::new(7, 0)).unwrap();

    f.server.remove_breakpoint(a.id);
    f.server.remove_breakpoint(a.id);
    assert!(f.server.breakpoint(a.id).is_none());
    assert_eq!(f.server.breakpoint(b.id).unwrap().position(), TextPosition::new(7, 0));

    f.run_program();
    assert_eq!(f.pause_positions(), ["pause:PausedOnBreakpoint@7:0"]);

    f.server.clear_breakpoints();
    assert!(f.server.breakpoints().is_empty());
    assert!(!f.server.has_breakpoint_at(MAIN, TextPosition::new(7, 0)));
}

#[test]
fn deactivated_breakpoints_are_kept_but_inert() {
    let f = fixture();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(5, 0)).unwrap();

    f.server.deactivate_breakpoints();
    assert!(!f.server.breakpoints_activated());
    assert!(!f.server.has_breakpoint_at(MAIN, TextPosition::new(5, 0)));
    f.run_program();
    assert_eq!(f.recorder.pause_count(), 0);
    assert_eq!(f.server.breakpoints().len(), 1);

    f.server.activate_breakpoints();
    f.run_program();
    assert_eq!(f.recorder.pause_count(), 1);
}

#[test]
fn column_zero_breakpoint_matches_first_statement_on_its_line() {
    let f = fixture();
    let loop_source = SourceId::new(2);
    let statements = [TextPosition::new(3, 0), TextPosition::new(3, 6), TextPosition::new(4, 0)];
    f.server.source_parsed(
        CTX,
        &ScriptSource::new(loop_source, "loop.js", "").with_statements(statements),
        None,
    );
    f.server.set_breakpoint(loop_source, BreakpointSpec::new(3, 0)).unwrap();

    let at = |line, column| {
        let site = HookSite::new(CTX, loop_source, TextPosition::new(line, column));
        f.server.at_statement(&site);
    };
    at(3, 0);
    at(3, 6);
    assert_eq!(f.recorder.pause_count(), 1);

    // Jumping back into the middle of the line counts as entering it.
    at(4, 0);
    at(3, 6);
    assert_eq!(f.recorder.pause_count(), 2);
}

#[test_case(PauseOnExceptionsState::DontPauseOnExceptions, false => 0)]
#[test_case(PauseOnExceptionsState::PauseOnAllExceptions, true => 1)]
#[test_case(PauseOnExceptionsState::PauseOnUncaughtExceptions, true => 0; "caught exception")]
#[test_case(PauseOnExceptionsState::PauseOnUncaughtExceptions, false => 1; "uncaught exception")]
fn exception_policy(state: PauseOnExceptionsState, has_handler: bool) -> usize {
    let f = fixture();
    f.server.set_pause_on_exceptions_state(state);
    assert_eq!(f.server.pause_on_exceptions_state(), state);

    f.server.will_execute_program(&f.site(0, 0));
    f.statement(5, 0);
    f.server.exception(&f.site(5, 0), has_handler);

    let pauses = f.recorder.pauses.borrow();
    if let Some(pause) = pauses.first() {
        assert_eq!(pause.reason, ExecutionState::PausedOnException);
    }
    pauses.len()
}

#[test]
fn break_program_pauses_at_the_next_statement() {
    let f = fixture();
    f.server.break_program();
    f.host.then(|server| {
        // Ignored: already paused.
        server.break_program();
        server.continue_program();
    });

    f.run_program();

    assert_eq!(f.pause_positions(), ["pause:PausedExplicit@5:0"]);
}

#[test]
fn explicit_pause_wins_over_a_breakpoint() {
    let f = fixture();
    let resolved = f.server.set_breakpoint(MAIN, BreakpointSpec::new(5, 0)).unwrap();
    f.server.set_pause_on_next_statement(true);

    f.run_program();

    let pauses = f.recorder.pauses.borrow();
    assert_eq!(pauses.len(), 1);
    assert_eq!(pauses[0].reason, ExecutionState::PausedExplicit);
    assert_ne!(pauses[0].hit_breakpoint, Some(resolved.id));
}

#[test]
fn debugger_statement_pauses() {
    let f = fixture();
    f.server.will_execute_program(&f.site(0, 0));
    f.statement(5, 0);
    f.server.did_reach_breakpoint(&f.site(6, 0));

    assert_eq!(f.pause_positions(), ["pause:PausedExplicit@6:0"]);
    assert!(!f.server.is_paused());
}

#[test]
fn stop_on_entry_pauses_at_the_first_statement() {
    let f = fixture_with(DebugServerConfig {
        stop_on_entry: true,
        ..DebugServerConfig::default()
    });
    f.run_program();
    assert_eq!(f.pause_positions(), ["pause:PausedExplicit@5:0"]);
}

#[test]
fn listener_may_set_breakpoints_while_paused() {
    let f = fixture();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(5, 0)).unwrap();
    f.recorder.on_pause(|server, _| {
        // The second pause reports a duplicate, which is fine.
        let _ = server.set_breakpoint(MAIN, BreakpointSpec::new(7, 0));
    });

    f.run_program();

    assert_eq!(
        f.pause_positions(),
        ["pause:PausedOnBreakpoint@5:0", "pause:PausedOnBreakpoint@7:0"]
    );
}

#[test]
fn resuming_from_the_listener_skips_the_nested_loop() {
    let f = fixture();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(5, 0)).unwrap();
    f.recorder.on_pause(|server, _| server.continue_program());

    f.run_program();

    assert_eq!(f.recorder.pause_count(), 1);
    assert_eq!(f.host.loops.get(), 0);
    assert_eq!(
        f.journal(),
        [
            "pause:PausedOnBreakpoint@5:0",
            "host:pause #1",
            "host:continue #1",
            "continue",
        ]
    );
}

#[test]
fn hooks_fired_while_paused_never_pause_again() {
    let f = fixture();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(5, 0)).unwrap();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(7, 0)).unwrap();
    f.server
        .set_pause_on_exceptions_state(PauseOnExceptionsState::PauseOnAllExceptions);

    f.host.then(|server| {
        // An evaluation running code while paused.
        let site = HookSite::new(CTX, MAIN, TextPosition::new(7, 0));
        server.at_statement(&site);
        server.exception(&site, false);
        server.did_reach_breakpoint(&site);
    });
    f.server.will_execute_program(&f.site(0, 0));
    f.statement(5, 0);

    assert_eq!(f.recorder.pause_count(), 1);
    let pauses = f.recorder.pauses.borrow();
    assert_eq!(
        pauses[0].call_frames.top().unwrap().position(),
        TextPosition::new(5, 0)
    );
}

#[test]
fn detach_while_paused_forces_a_resume() {
    let f = fixture();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(5, 0)).unwrap();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(7, 0)).unwrap();
    f.host.then(|server| server.detach(CTX));

    f.run_program();

    assert_eq!(
        f.journal(),
        ["pause:PausedOnBreakpoint@5:0", "host:pause #1", "host:continue #1"]
    );
    assert_eq!(f.server.listener_count(CTX), 0);
    assert!(!f.server.is_paused());
    assert!(f.server.is_recompile_pending());
}

#[test]
fn removing_listeners() {
    let f = fixture();
    let second = f.server.add_listener(CTX, Rc::new(Recorder::new(Journal::default())));
    assert_eq!(f.server.listener_count(CTX), 2);
    assert!(!f.server.is_recompile_pending());

    assert!(f.server.remove_listener(CTX, second));
    assert!(!f.server.remove_listener(CTX, second));
    assert!(!f.server.is_recompile_pending());

    f.server.set_breakpoint(MAIN, BreakpointSpec::new(5, 0)).unwrap();
    f.run_program();
    assert_eq!(f.recorder.pause_count(), 1);

    // The last listener of a context takes the context down with it.
    let other = f.server.add_listener(OTHER, Rc::new(Recorder::new(Journal::default())));
    f.host.run_tasks();
    assert!(f.server.remove_listener(OTHER, other));
    assert_eq!(f.server.listener_count(OTHER), 0);
    assert!(f.server.is_recompile_pending());
}

#[test]
fn contexts_without_listeners_never_pause() {
    let f = fixture();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(5, 0)).unwrap();
    let other = Rc::new(Recorder::new(f.journal.clone()));
    f.server.add_listener(OTHER, other.clone());
    f.server.detach(CTX);

    f.run_program();

    assert_eq!(f.recorder.pause_count(), 0);
    assert_eq!(other.pause_count(), 0);
    assert_eq!(f.host.loops.get(), 0);
}

#[test]
fn recompile_requests_coalesce() {
    let journal = Journal::default();
    let host = Rc::new(FakeHost::new(journal.clone()));
    let server = DebugServer::new(host.clone());

    server.add_listener(CTX, Rc::new(Recorder::new(journal.clone())));
    server.add_listener(OTHER, Rc::new(Recorder::new(journal.clone())));
    server.recompile_all_functions_soon();
    assert_eq!(host.tasks.borrow().len(), 1);
    assert!(server.is_recompile_pending());

    host.run_tasks();
    assert_eq!(host.recompiles.get(), 1);
    assert!(!server.is_recompile_pending());

    server.recompile_all_functions_soon();
    host.run_tasks();
    assert_eq!(host.recompiles.get(), 2);
}

#[test]
fn scheduled_recompile_outliving_the_server_is_dropped() {
    let host = Rc::new(FakeHost::new(Journal::default()));
    let server = DebugServer::new(host.clone());
    server.recompile_all_functions_soon();

    drop(server);
    host.run_tasks();
    assert_eq!(host.recompiles.get(), 0);
}

#[test]
fn parse_events_reach_listeners() {
    let f = fixture();
    let page = ScriptSource::new(SourceId::new(3), "page.js", "go();");
    let extension = ScriptSource::new(SourceId::new(4), "extension://helper.js", "help();");
    let broken = ScriptSource::new(SourceId::new(5), "broken.js", "let = ;");

    f.server.source_parsed(CTX, &page, None);
    f.server.source_parsed(CTX, &extension, None);
    f.server.source_parsed(CTX, &broken, Some(&ParseError::new(3, "unexpected token")));
    f.server.source_parsed(OTHER, &page, None);

    assert_eq!(
        f.journal(),
        [
            "parsed:page.js content=false",
            "parsed:extension://helper.js content=true",
            "failed:broken.js:3",
        ]
    );
}

#[test]
fn content_scripts_can_be_hidden() {
    let f = fixture_with(DebugServerConfig {
        report_content_scripts: false,
        ..DebugServerConfig::default()
    });
    let extension = ScriptSource::new(SourceId::new(4), "extension://helper.js", "help();")
        .with_statements([TextPosition::new(0, 0)]);
    f.server.source_parsed(CTX, &extension, None);

    assert!(f.journal().is_empty());
    // Still known for breakpoints.
    assert!(f.server.set_breakpoint(SourceId::new(4), BreakpointSpec::new(0, 0)).is_ok());
}

#[test]
fn compiled_scripts_run_once() {
    let f = fixture();
    let script = f.server.compile_script("1 + 1", "console").unwrap();
    assert_eq!(f.server.compiled_script_count(), 1);

    let outcome = f.server.run_script(script).unwrap();
    assert_eq!(outcome, ScriptOutcome::completed(json!("1 + 1")));
    assert_eq!(f.server.compiled_script_count(), 0);
    assert_eq!(f.server.run_script(script), Err(ScriptError::UnknownScript(script)));

    let thrower = f.server.compile_script("throw boom", "console").unwrap();
    let outcome = f.server.run_script(thrower).unwrap();
    assert!(outcome.was_thrown);
    assert_eq!(outcome.exception_message.as_deref(), Some("boom"));
}

#[test]
fn failed_compilation_stores_nothing() {
    let f = fixture();
    assert!(matches!(
        f.server.compile_script("  ", "console"),
        Err(ScriptError::Compilation { .. })
    ));
    assert_eq!(f.server.compiled_script_count(), 0);
}

#[test]
fn clearing_compiled_scripts_releases_them() {
    let f = fixture();
    let a = f.server.compile_script("a", "console").unwrap();
    let b = f.server.compile_script("b", "console").unwrap();

    f.server.clear_compiled_scripts();

    assert_eq!(f.server.compiled_script_count(), 0);
    assert_eq!(*f.host.released.borrow(), [a, b]);
    assert!(f.server.run_script(a).is_err());
}

const EDITED: &str = indoc! {"
    function add(a, b) {
        let sum = a + b;
        return sum;
    }

    let x = 1;
    let y = add(x, 2);
    log(y);
    log(x);
"};

#[test]
fn live_edit_preview_and_failure_change_nothing() {
    let f = fixture();
    assert!(f.server.can_set_script_source());

    let update = f.server.set_script_source(MAIN, EDITED, true).unwrap();
    assert!(update.call_frames.is_none());
    assert_eq!(update.result, json!({ "changed": true }));
    assert!(f.server.set_breakpoint(MAIN, BreakpointSpec::new(8, 0)).is_err());

    let error = f
        .server
        .set_script_source(MAIN, "syntax error", false)
        .unwrap_err();
    assert!(matches!(error, ScriptError::Compilation { line: Some(0), .. }));
    assert!(f.server.set_breakpoint(MAIN, BreakpointSpec::new(8, 0)).is_err());
}

#[test]
fn live_edit_reindexes_statements() {
    let f = fixture();
    let update = f.server.set_script_source(MAIN, EDITED, false).unwrap();
    assert!(update.call_frames.is_none());

    let resolved = f.server.set_breakpoint(MAIN, BreakpointSpec::new(8, 0)).unwrap();
    assert_eq!(resolved.actual_line, 8);
}

#[test]
fn live_edit_while_paused_rebuilds_the_call_stack() {
    let f = fixture();
    f.server.set_breakpoint(MAIN, BreakpointSpec::new(6, 0)).unwrap();
    *f.host.frames.borrow_mut() = vec![FrameInfo::new(MAIN, TextPosition::new(6, 0), "")];

    let frames = Rc::new(RefCell::new(None));
    let sink = frames.clone();
    f.host.then(move |server| {
        let update = server.set_script_source(MAIN, EDITED, false).unwrap();
        *sink.borrow_mut() = update.call_frames;
    });
    f.server.will_execute_program(&f.site(0, 0));
    f.statement(5, 0);
    f.statement(6, 0);

    let frames = frames.borrow();
    let chain = frames.as_ref().unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain.top().unwrap().position(), TextPosition::new(6, 0));
}

#[test]
fn configuration_from_toml() {
    let config = DebugServerConfig::from_toml_str(indoc! {r#"
        breakpointsActivated = false
        pauseOnExceptions = "all"
    "#})
    .unwrap();
    let f = fixture_with(config);

    assert!(!f.server.breakpoints_activated());
    assert_eq!(
        f.server.pause_on_exceptions_state(),
        PauseOnExceptionsState::PauseOnAllExceptions
    );
}
