//! Event definitions for the application event loop.
//!
//! The process session publishes its lifecycle and output here; the UI and the
//! headless runner consume them alongside terminal input.

use crossterm::event::KeyEvent;

use crate::output::LogLine;
use crate::process::SessionState;

/// Represents an event in the application's main event loop.
#[derive(Debug, Clone)]
pub enum Event {
    /// The session moved to a new lifecycle state.
    SessionState(SessionState),
    /// The child process was spawned.
    SessionStarted { pid: u32 },
    /// A line was produced; it has already been written to the transcript.
    Output(LogLine),
    /// The run finished and the session is idle again.
    SessionExited { code: Option<i32> },
    /// The selected script folder changed on disk.
    ScriptsChanged,
    /// A line typed on the launcher's own stdin (headless mode).
    Stdin(String),
    /// Ctrl+C or SIGTERM was delivered to the launcher.
    Interrupt,
    /// A keyboard event received from the user.
    Key(KeyEvent),
    /// The terminal window was resized.
    Resize { width: u16, height: u16 },
}
