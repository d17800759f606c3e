//! Demonstrates the pause/resume cycle of the debug server.
//!
//! A toy interpreter walks a script line by line and reports every statement
//! to the server. The `debugger;` statement pauses execution; the host then
//! replays a few front end commands (inspect, step, continue) from its nested
//! loop, the way an inspector connection would while the engine is suspended.
//!
//! Set `BOA_DEBUG_SERVER_LOG=debug` (or `trace`) to see the server's own log.

use boa_debug_server::{
    BreakpointSpec, ContextId, DebugListener, DebugServer, DebuggerHost, DeferredTask, HookSite,
    PauseEvent, ScriptSource, SourceId, TextPosition,
};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::{
    cell::RefCell,
    collections::VecDeque,
    error::Error,
    rc::Rc,
};

const CONTEXT: ContextId = ContextId::new(1);
const SCRIPT: SourceId = SourceId::new(1);

const SOURCE: &str = "let x = 1 + 1;
debugger;
let y = 2 + 2;
let z = x + y;
z;";

/// A front end whose commands are known in advance.
struct ScriptedFrontEnd {
    commands: RefCell<VecDeque<&'static str>>,
    tasks: RefCell<Vec<DeferredTask>>,
}

impl ScriptedFrontEnd {
    fn new(commands: &[&'static str]) -> Self {
        Self {
            commands: RefCell::new(commands.iter().copied().collect()),
            tasks: RefCell::default(),
        }
    }

    fn run_tasks(&self) {
        let tasks = std::mem::take(&mut *self.tasks.borrow_mut());
        for task in tasks {
            task();
        }
    }
}

impl DebuggerHost for ScriptedFrontEnd {
    fn run_event_loop_while_paused(&self, server: &DebugServer, _context: ContextId) {
        while !server.resume_requested() {
            let command = self.commands.borrow_mut().pop_front();
            eprintln!("[FrontEnd] {}", command.unwrap_or("continue (no more commands)"));
            match command {
                Some("frames") => {
                    for frame in server.update_call_stack().iter().flat_map(|chain| chain.iter()) {
                        eprintln!("[FrontEnd]   at {} ({})", frame.position(), frame.source());
                    }
                }
                Some("step") => server.step_over_statement(),
                _ => server.continue_program(),
            }
        }
    }

    fn schedule_task(&self, task: DeferredTask) {
        self.tasks.borrow_mut().push(task);
    }

    fn recompile_all_functions(&self) {
        eprintln!("[Engine] recompiling with debug hooks");
    }
}

struct ConsoleListener;

impl DebugListener for ConsoleListener {
    fn did_pause(&self, _server: &DebugServer, event: &PauseEvent) {
        match serde_json::to_string(event) {
            Ok(json) => eprintln!("\n[Debugger] Paused: {json}"),
            Err(err) => eprintln!("\n[Debugger] Paused ({err})"),
        }
    }

    fn did_continue(&self, _server: &DebugServer) {
        eprintln!("[Debugger] Resumed!");
    }

    fn did_parse_source(&self, _server: &DebugServer, source: &ScriptSource, _is_content_script: bool) {
        eprintln!("[Debugger] Parsed `{}` ({} statements)", source.url, source.statements.len());
    }
}

/// Runs every line of `text` as one statement.
fn interpret(server: &DebugServer, text: &str) {
    let entry = HookSite::new(CONTEXT, SCRIPT, TextPosition::default());
    server.will_execute_program(&entry);

    for (line, code) in (0..).zip(text.lines()) {
        let site = HookSite::new(CONTEXT, SCRIPT, TextPosition::new(line, 0));
        if code.trim() == "debugger;" {
            server.did_reach_breakpoint(&site);
        } else {
            server.at_statement(&site);
        }
        log::trace!("executed `{code}`");
    }

    server.did_execute_program(&entry);
}

fn log_level() -> LevelFilter {
    std::env::var("BOA_DEBUG_SERVER_LOG")
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or(LevelFilter::Warn)
}

fn main() -> Result<(), Box<dyn Error>> {
    SimpleLogger::new().with_level(log_level()).init()?;

    eprintln!("\n=== Testing Pause/Resume Mechanism ===\n");

    let front_end = Rc::new(ScriptedFrontEnd::new(&["frames", "step", "continue", "frames"]));
    let server = DebugServer::new(front_end.clone());
    server.add_listener(CONTEXT, Rc::new(ConsoleListener));
    front_end.run_tasks();

    let statements = (0..).zip(SOURCE.lines()).map(|(line, _)| TextPosition::new(line, 0));
    let source = ScriptSource::new(SCRIPT, "demo.js", SOURCE).with_statements(statements);
    server.source_parsed(CONTEXT, &source, None);

    let resolved = server.set_breakpoint(SCRIPT, BreakpointSpec::new(3, 0))?;
    eprintln!(
        "[Test] Breakpoint {} set at line {}",
        resolved.id, resolved.actual_line
    );

    eprintln!("[Test] Executing script with a debugger statement...");
    interpret(&server, SOURCE);

    eprintln!("\n=== Test Complete ===\n");
    Ok(())
}
