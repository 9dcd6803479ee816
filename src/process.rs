//! Data structures describing a script run.
//!
//! `LaunchRequest` is everything needed to start one run; `SessionState` is the
//! lifecycle of the process session that executes it.

use std::fmt;
use std::path::PathBuf;

use crate::launch::build_command;

/// Specification for one script run.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Interpreter that runs the script.
    pub executable: PathBuf,
    /// Script to run.
    pub script: PathBuf,
    /// Tokens appended after the script path.
    pub arguments: Vec<String>,
    /// Working directory for the child.
    pub cwd: Option<PathBuf>,
}

impl LaunchRequest {
    /// Full command line, executable first.
    pub fn command(&self) -> Vec<String> {
        build_command(&self.executable, &self.script, &self.arguments)
    }

    /// Command line as it would be typed in a shell, for display only.
    pub fn display_command(&self) -> String {
        shell_words::join(self.command())
    }
}

/// Lifecycle state of the process session.
///
/// A run moves `Idle -> Starting -> Running -> Exiting -> Idle`. A termination
/// request does not change the state; it only becomes visible once the child exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No process.
    #[default]
    Idle,
    /// Spawn requested, not yet confirmed.
    Starting,
    /// Child alive, streams being drained.
    Running,
    /// Exit observed, transcript being finalized.
    Exiting,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        self != SessionState::Idle
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Exiting => "exiting",
        };
        f.write_str(label)
    }
}
