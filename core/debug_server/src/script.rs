//! Script services: ad-hoc compilation and execution, and live edits.
//!
//! The engine does the actual work through the [`DebuggerHost`](crate::DebuggerHost);
//! the server only keeps track of which compiled scripts are still pending.

use crate::{SourceId, TextPosition, frame::CallFrameChain};
use rustc_hash::FxHashMap;
use serde::Serialize;

/// The host's representation of a script value (a remote-object style JSON value).
pub type ScriptValue = serde_json::Value;

/// Result of running a compiled script.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOutcome {
    /// The completion value, or the thrown value.
    pub result: ScriptValue,
    /// Whether the script threw.
    pub was_thrown: bool,
    /// Message of the thrown exception.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,
}

impl ScriptOutcome {
    /// A normal completion.
    #[must_use]
    pub const fn completed(result: ScriptValue) -> Self {
        Self {
            result,
            was_thrown: false,
            exception_message: None,
        }
    }

    /// A thrown exception.
    pub fn thrown<M: Into<String>>(result: ScriptValue, message: M) -> Self {
        Self {
            result,
            was_thrown: true,
            exception_message: Some(message.into()),
        }
    }
}

/// What the engine reports after accepting a live edit.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEdit {
    /// Statement positions of the edited source.
    pub statements: Vec<TextPosition>,
    /// Engine specific description of the change.
    pub result: ScriptValue,
}

/// What `set_script_source` returns to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptSourceUpdate {
    /// The rebuilt call stack, when the edit was applied while paused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_frames: Option<CallFrameChain>,
    /// Engine specific description of the change.
    pub result: ScriptValue,
}

/// Scripts compiled by `compile_script` that were neither run nor cleared.
#[derive(Debug, Default)]
pub(crate) struct CompiledScripts {
    pending: FxHashMap<SourceId, String>,
}

impl CompiledScripts {
    pub(crate) fn insert(&mut self, script: SourceId, source_url: String) {
        self.pending.insert(script, source_url);
    }

    /// Removes a script so it can run once.
    pub(crate) fn take(&mut self, script: SourceId) -> Option<String> {
        self.pending.remove(&script)
    }

    pub(crate) fn drain(&mut self) -> Vec<SourceId> {
        let mut scripts: Vec<_> = self.pending.drain().map(|(script, _)| script).collect();
        scripts.sort_unstable();
        scripts
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
