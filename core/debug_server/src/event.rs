//! Payloads exchanged with the engine and the listeners.
//!
//! Everything a listener receives is serializable, so a transport layer can
//! forward events to a remote front end as they are.

use crate::{
    ContextId, SourceId, TextPosition, breakpoint::BreakpointId, controller::ExecutionState,
    frame::CallFrameChain,
};
use serde::Serialize;

/// Where an engine hook fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSite {
    /// The top-level execution context running the code.
    pub context: ContextId,
    /// The executing source.
    pub source: SourceId,
    /// The current position in that source.
    pub position: TextPosition,
}

impl HookSite {
    /// Creates a new hook site.
    #[must_use]
    pub const fn new(context: ContextId, source: SourceId, position: TextPosition) -> Self {
        Self {
            context,
            source,
            position,
        }
    }
}

/// A source the engine compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptSource {
    /// The engine's identifier for the source.
    pub id: SourceId,
    /// Where the source came from, empty for anonymous code.
    pub url: String,
    /// The full source text.
    pub text: String,
    /// Position of the source's first character within its document.
    pub start: TextPosition,
    /// Every position the engine can stop at.
    pub statements: Vec<TextPosition>,
}

impl ScriptSource {
    /// Creates a source with no statement positions.
    pub fn new<U, T>(id: SourceId, url: U, text: T) -> Self
    where
        U: Into<String>,
        T: Into<String>,
    {
        Self {
            id,
            url: url.into(),
            text: text.into(),
            start: TextPosition::default(),
            statements: Vec::new(),
        }
    }

    /// Sets the statement positions.
    #[must_use]
    pub fn with_statements<I>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = TextPosition>,
    {
        self.statements = statements.into_iter().collect();
        self
    }

    /// Sets the position of the first character within the enclosing document.
    #[must_use]
    pub const fn with_start(mut self, start: TextPosition) -> Self {
        self.start = start;
        self
    }
}

/// A syntax error reported with a source that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseError {
    /// Zero-based line of the error.
    pub line: u32,
    /// The engine's error message.
    pub message: String,
}

impl ParseError {
    /// Creates a new parse error.
    pub fn new<M: Into<String>>(line: u32, message: M) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Sent to listeners when execution pauses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseEvent {
    /// The context that paused.
    pub context: ContextId,
    /// Why execution paused.
    pub reason: ExecutionState,
    /// The call stack at the pause location.
    pub call_frames: CallFrameChain,
    /// The breakpoint that triggered the pause, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_breakpoint: Option<BreakpointId>,
}
