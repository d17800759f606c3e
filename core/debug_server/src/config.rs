//! Debug server configuration.

use crate::{controller::PauseOnExceptionsState, error::ConfigError};
use serde::{Deserialize, Serialize};

/// Initial settings of a [`DebugServer`](crate::DebugServer).
///
/// Every field is optional when deserializing:
///
/// ```toml
/// breakpointsActivated = true
/// pauseOnExceptions = "uncaught"
/// stopOnEntry = false
/// reportContentScripts = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DebugServerConfig {
    /// Whether breakpoints take effect at startup.
    pub breakpoints_activated: bool,
    /// Initial exception policy.
    pub pause_on_exceptions: PauseOnExceptionsState,
    /// Pause at the very first statement.
    pub stop_on_entry: bool,
    /// Whether parse events of content scripts reach listeners.
    pub report_content_scripts: bool,
}

impl Default for DebugServerConfig {
    fn default() -> Self {
        Self {
            breakpoints_activated: true,
            pause_on_exceptions: PauseOnExceptionsState::DontPauseOnExceptions,
            stop_on_entry: false,
            report_content_scripts: true,
        }
    }
}

impl DebugServerConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}
