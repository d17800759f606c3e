//! Boa's in-process script debug server
//!
//! This crate tracks breakpoints, drives the pause/resume/step state machine
//! while an engine executes statements, keeps a snapshot of the active call
//! frames while paused and fans debug events out to registered listeners
//! (for example remote inspector front ends).
//!
//! # Overview
//!
//! - [`DebugServer`]: the façade the engine and the clients talk to
//! - [`BreakpointRegistry`]: breakpoints indexed by source and line
//! - [`PauseController`]: the execution state machine
//! - [`CallFrameChain`]: immutable, shared snapshots of the call stack
//! - [`ListenerDispatcher`]: per-context listener sets with reentrancy guards
//! - [`RecompileCoalescer`]: collapses recompilation requests into one pass
//!
//! # Architecture
//!
//! The engine calls the server's hook entry points synchronously from its
//! execution loop:
//!
//! - `source_parsed`: a script was compiled (or failed to)
//! - `call_event` / `return_event`: a function frame was entered / left
//! - `will_execute_program` / `did_execute_program`: a top-level program frame
//! - `at_statement`: a statement boundary, the only place where stepping and
//!   breakpoints pause
//! - `exception`: an exception is being thrown
//! - `did_reach_breakpoint`: a `debugger;` statement was executed
//!
//! Everything the server needs from its environment (the nested event loop
//! run while paused, condition evaluation, task scheduling, script
//! compilation) comes from a [`DebuggerHost`] injected at construction.
//! The whole server is single threaded: pausing re-enters the host's event
//! loop from inside the hook call, it never blocks on a lock.
//!
//! # Example
//!
//! ```rust,ignore
//! use boa_debug_server::{BreakpointSpec, ContextId, DebugServer, HookSite, TextPosition};
//!
//! let server = DebugServer::new(host);
//! server.add_listener(ContextId::new(1), listener);
//!
//! // Set a breakpoint on line 10, it resolves to the next statement.
//! let resolved = server.set_breakpoint(source_id, BreakpointSpec::new(10, 0))?;
//!
//! // Called by the engine; pauses and runs the host's nested loop.
//! server.at_statement(&HookSite::new(context, source_id, TextPosition::new(11, 0)));
//! ```

pub mod breakpoint;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod frame;
pub mod host;
pub mod listener;
pub mod recompile;
pub mod script;
pub mod server;

pub use breakpoint::{Breakpoint, BreakpointId, BreakpointRegistry, BreakpointSpec, ResolvedBreakpoint};
pub use config::DebugServerConfig;
pub use controller::{ExecutionState, PauseController, PauseOnExceptionsState, StepIntent};
pub use error::{BreakpointError, ConfigError, ScriptError};
pub use event::{HookSite, ParseError, PauseEvent, ScriptSource};
pub use frame::{CallFrame, CallFrameChain, FrameId, FrameInfo};
pub use host::{DebuggerHost, DeferredTask};
pub use listener::{DebugListener, DispatchOutcome, EventCategory, ListenerDispatcher, ListenerId};
pub use recompile::RecompileCoalescer;
pub use script::{LiveEdit, ScriptOutcome, ScriptSourceUpdate, ScriptValue};
pub use server::DebugServer;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier the engine assigns to a parsed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(u64);

impl SourceId {
    /// Wraps the engine's raw source identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the engine's raw source identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle of a top-level execution context (a realm / global object).
///
/// Listener sets and pause episodes are scoped by this handle, so events of
/// one context never reach listeners registered on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(u64);

impl ContextId {
    /// Wraps the host's raw context handle.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the host's raw context handle.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A zero-based position in a source text.
///
/// Positions order by line first, then by column.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TextPosition {
    /// Zero-based line number.
    pub line: u32,
    /// Zero-based column number.
    pub column: u32,
}

impl TextPosition {
    /// Creates a new position.
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for TextPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
