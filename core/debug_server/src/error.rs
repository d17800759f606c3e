//! Error types of the debug server.
//!
//! None of these are fatal: every failure leaves the live program untouched
//! and the caller may retry with corrected input.

use crate::{SourceId, TextPosition, breakpoint::BreakpointId};
use thiserror::Error;

/// Why a breakpoint request was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BreakpointError {
    /// The engine never reported a source with this id.
    #[error("unknown source `{0}`")]
    UnknownSource(SourceId),

    /// There is no instrumentable statement at or after the requested position.
    #[error("no statement at or after {position} in source `{source_id}`")]
    NoStatementPosition {
        /// The source the request targeted.
        source_id: SourceId,
        /// The position that was requested.
        position: TextPosition,
    },

    /// An identical breakpoint (same resolved position and condition) exists.
    #[error("breakpoint {existing} already covers {position} in source `{source_id}`")]
    Duplicate {
        /// The source the request targeted.
        source_id: SourceId,
        /// The resolved position.
        position: TextPosition,
        /// The breakpoint that is already there.
        existing: BreakpointId,
    },
}

/// Failures reported by the script services of the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// The source text did not compile.
    #[error("compilation failed: {message}")]
    Compilation {
        /// The engine's error message.
        message: String,
        /// Zero-based line of the error, when known.
        line: Option<u32>,
    },

    /// A live edit was refused by the engine.
    #[error("live edit rejected: {0}")]
    LiveEdit(String),

    /// Evaluating an expression threw.
    #[error("evaluation threw: {0}")]
    Evaluation(String),

    /// No pending compiled script has this id.
    #[error("unknown compiled script `{0}`")]
    UnknownScript(SourceId),

    /// The host does not provide this service.
    #[error("{0} is not supported by this host")]
    Unsupported(&'static str),
}

impl ScriptError {
    /// Creates a compilation error without position information.
    pub fn compilation<M: Into<String>>(message: M) -> Self {
        Self::Compilation {
            message: message.into(),
            line: None,
        }
    }
}

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML text was malformed or had fields of the wrong type.
    #[error("invalid debug server configuration: {0}")]
    Toml(#[from] toml::de::Error),
}
