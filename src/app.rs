//! Application state and UI logic.
//!
//! `App` holds everything the launcher screen shows: the folder and script
//! lists, the argument rows built from the selected script, the output of the
//! current run and the input line. Key presses are translated into `AppAction`s
//! that the event loop carries out against the catalog and the process session.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::extract::ExtractedArguments;
use crate::launch::{collect_arguments, ArgumentRow};
use crate::output::{LogBuffer, LogLine};
use crate::process::SessionState;

/// Pane that receives key presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Scripts,
    Arguments,
    Output,
    Input,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Scripts => Focus::Arguments,
            Focus::Arguments => Focus::Output,
            Focus::Output => Focus::Input,
            Focus::Input => Focus::Scripts,
        }
    }
}

/// Actions resulting from user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// No action required.
    None,
    /// Exit the application.
    Quit,
    /// Start the selected script.
    Run,
    /// Ask the running script to stop.
    Terminate,
    /// Send a line to the running script's stdin.
    SendInput(String),
    /// Another folder was selected; its scripts need listing.
    SelectFolder(usize),
    /// Extract the argument schema of a script.
    LoadArguments(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
struct StatusMessage {
    text: String,
    at: Instant,
    ttl: Option<Duration>,
    level: StatusLevel,
}

/// The main application state container.
#[derive(Debug)]
pub struct App {
    /// Names of the catalog folders.
    pub folders: Vec<String>,
    pub folder_index: usize,
    /// Scripts of the selected folder.
    pub scripts: Vec<PathBuf>,
    pub script_index: usize,
    /// Script whose arguments are currently loaded.
    pub loaded_script: Option<PathBuf>,
    pub extracted: ExtractedArguments,
    pub group_index: usize,
    pub rows: Vec<ArgumentRow>,
    pub row_index: usize,
    pub focus: Focus,
    /// Output of the current (or last) run.
    pub logs: LogBuffer,
    pub follow: bool,
    pub scroll: usize,
    /// Height of the output area (for scrolling calculations).
    pub log_view_height: usize,
    pub input_buffer: String,
    pub session: SessionState,
    pub pid: Option<u32>,
    pub last_exit: Option<Option<i32>>,
    pub log_path: Option<PathBuf>,
    /// Whether to strip ANSI codes from the display.
    pub strip_ansi: bool,
    /// Whether to use Unicode symbols.
    pub use_symbols: bool,
    /// Whether to show the help overlay.
    pub show_help: bool,
    /// Flag indicating if the application should exit.
    pub should_quit: bool,
    status_message: Option<StatusMessage>,
}

impl App {
    pub fn new(folders: Vec<String>, max_lines: usize, use_symbols: bool) -> Self {
        Self {
            folders,
            folder_index: 0,
            scripts: Vec::new(),
            script_index: 0,
            loaded_script: None,
            extracted: ExtractedArguments::default(),
            group_index: 0,
            rows: Vec::new(),
            row_index: 0,
            focus: Focus::Scripts,
            logs: LogBuffer::new(max_lines),
            follow: true,
            scroll: 0,
            log_view_height: 0,
            input_buffer: String::new(),
            session: SessionState::Idle,
            pid: None,
            last_exit: None,
            log_path: None,
            strip_ansi: true,
            use_symbols,
            show_help: false,
            should_quit: false,
            status_message: None,
        }
    }

    pub fn selected_folder(&self) -> Option<&str> {
        self.folders.get(self.folder_index).map(String::as_str)
    }

    pub fn selected_script(&self) -> Option<&Path> {
        self.scripts.get(self.script_index).map(PathBuf::as_path)
    }

    /// Replaces the script list, keeping the selection on the same file if it still exists.
    pub fn set_scripts(&mut self, scripts: Vec<PathBuf>) {
        let previous = self.selected_script().map(Path::to_path_buf);
        self.scripts = scripts;
        self.script_index = previous
            .and_then(|previous| self.scripts.iter().position(|path| *path == previous))
            .unwrap_or(0);
        if let Some(loaded) = &self.loaded_script {
            if !self.scripts.contains(loaded) {
                self.clear_arguments();
            }
        }
    }

    /// Installs the schemas extracted from `script` and shows the first group.
    pub fn load_arguments(&mut self, script: PathBuf, extracted: ExtractedArguments) {
        let groups = extracted.len();
        self.loaded_script = Some(script);
        self.extracted = extracted;
        self.group_index = 0;
        self.rebuild_rows();
        if groups == 0 {
            self.set_status_message("No arguments found");
        } else {
            let names = self.extracted.names().collect::<Vec<_>>().join(", ");
            self.set_status_message(format!("Loaded {} argument group(s): {}", groups, names));
        }
    }

    pub fn clear_arguments(&mut self) {
        self.loaded_script = None;
        self.extracted = ExtractedArguments::default();
        self.group_index = 0;
        self.rows.clear();
        self.row_index = 0;
    }

    pub fn selected_group(&self) -> Option<&str> {
        self.extracted
            .get_index(self.group_index)
            .map(|schema| schema.name.as_str())
    }

    /// Script and arguments for the next run.
    ///
    /// Argument rows only apply when they were loaded from the selected script.
    pub fn run_target(&self) -> Option<(PathBuf, Vec<String>)> {
        let script = self.selected_script()?.to_path_buf();
        let arguments = if self.loaded_script.as_deref() == Some(script.as_path()) {
            collect_arguments(&self.rows)
        } else {
            Vec::new()
        };
        Some((script, arguments))
    }

    pub fn on_session_state(&mut self, state: SessionState) {
        if state == SessionState::Starting {
            self.logs.clear();
            self.scroll = 0;
            self.follow = true;
            self.pid = None;
            self.last_exit = None;
        }
        self.session = state;
    }

    pub fn on_session_started(&mut self, pid: u32, log_path: Option<PathBuf>) {
        self.pid = Some(pid);
        if let Some(path) = &log_path {
            self.set_status_message(format!("Logging to: {}", path.display()));
        }
        self.log_path = log_path;
    }

    pub fn on_output(&mut self, line: LogLine) {
        let dropped = self.logs.push(line);
        if self.follow {
            self.ensure_follow();
        } else if dropped {
            self.scroll = self.scroll.saturating_sub(1);
        }
    }

    pub fn on_session_exited(&mut self, code: Option<i32>) {
        self.pid = None;
        self.last_exit = Some(code);
        match code {
            Some(0) => self.set_status_message("Script finished"),
            Some(code) => self.set_status_warning_for(
                format!("Script exited with code {}", code),
                Duration::from_secs(5),
            ),
            None => self.set_status_warning_for("Script stopped by signal", Duration::from_secs(5)),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            if let Some(action) = self.handle_control(key.code) {
                return action;
            }
        }
        if self.show_help {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?')) {
                self.show_help = false;
            }
            return AppAction::None;
        }
        if key.code == KeyCode::Tab {
            self.focus = self.focus.next();
            return AppAction::None;
        }
        match self.focus {
            Focus::Scripts => self.handle_scripts_key(key),
            Focus::Arguments => self.handle_arguments_key(key),
            Focus::Output => self.handle_output_key(key),
            Focus::Input => self.handle_input_key(key),
        }
    }

    fn handle_control(&mut self, code: KeyCode) -> Option<AppAction> {
        let action = match code {
            KeyCode::Char('r') => AppAction::Run,
            KeyCode::Char('c') => AppAction::Terminate,
            KeyCode::Char('q') => {
                self.should_quit = true;
                AppAction::Quit
            }
            KeyCode::Char('l') => {
                self.logs.clear();
                self.scroll = 0;
                AppAction::None
            }
            _ => return None,
        };
        Some(action)
    }

    /// Keys shared by the panes that do not take text.
    fn handle_common_key(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                AppAction::Quit
            }
            KeyCode::Char('?') => {
                self.show_help = true;
                AppAction::None
            }
            KeyCode::Char('f') => {
                self.toggle_follow();
                AppAction::None
            }
            KeyCode::Char('a') => {
                self.strip_ansi = !self.strip_ansi;
                AppAction::None
            }
            KeyCode::Char('p') => {
                self.cycle_group();
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn handle_scripts_key(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Up => {
                self.script_index = self.script_index.saturating_sub(1);
                AppAction::None
            }
            KeyCode::Down => {
                if self.script_index + 1 < self.scripts.len() {
                    self.script_index += 1;
                }
                AppAction::None
            }
            KeyCode::Left => self.step_folder(false),
            KeyCode::Right => self.step_folder(true),
            KeyCode::Enter => match self.selected_script() {
                Some(script) => AppAction::LoadArguments(script.to_path_buf()),
                None => AppAction::None,
            },
            _ => self.handle_common_key(key),
        }
    }

    fn handle_arguments_key(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Esc => {
                self.focus = Focus::Scripts;
                return AppAction::None;
            }
            KeyCode::Up => {
                self.row_index = self.row_index.saturating_sub(1);
                return AppAction::None;
            }
            KeyCode::Down => {
                if self.row_index + 1 < self.rows.len() {
                    self.row_index += 1;
                }
                return AppAction::None;
            }
            _ => {}
        }
        match self.rows.get_mut(self.row_index) {
            Some(ArgumentRow::Value { value, .. }) => {
                match key.code {
                    KeyCode::Backspace => {
                        value.pop();
                    }
                    KeyCode::Char(c) => value.push(c),
                    _ => {}
                }
                AppAction::None
            }
            Some(ArgumentRow::Flag { checked, .. }) => match key.code {
                KeyCode::Char(' ') | KeyCode::Enter => {
                    *checked = !*checked;
                    AppAction::None
                }
                _ => self.handle_common_key(key),
            },
            None => self.handle_common_key(key),
        }
    }

    fn handle_output_key(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Up => self.scroll_up(1),
            KeyCode::Down => self.scroll_down(1),
            KeyCode::PageUp => self.scroll_up(self.log_view_height.max(1)),
            KeyCode::PageDown => self.scroll_down(self.log_view_height.max(1)),
            KeyCode::Home => {
                self.scroll = 0;
                self.follow = false;
            }
            KeyCode::End => {
                self.follow = true;
                self.ensure_follow();
            }
            _ => return self.handle_common_key(key),
        }
        AppAction::None
    }

    fn handle_input_key(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Esc => {
                self.input_buffer.clear();
                self.focus = Focus::Scripts;
                AppAction::None
            }
            KeyCode::Enter => {
                let payload = std::mem::take(&mut self.input_buffer);
                AppAction::SendInput(payload)
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
                AppAction::None
            }
            KeyCode::Char(c) => {
                self.input_buffer.push(c);
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn step_folder(&mut self, forward: bool) -> AppAction {
        if self.folders.len() < 2 {
            return AppAction::None;
        }
        let count = self.folders.len();
        self.folder_index = if forward {
            (self.folder_index + 1) % count
        } else {
            (self.folder_index + count - 1) % count
        };
        self.script_index = 0;
        AppAction::SelectFolder(self.folder_index)
    }

    fn cycle_group(&mut self) {
        if self.extracted.len() < 2 {
            return;
        }
        self.group_index = (self.group_index + 1) % self.extracted.len();
        self.rebuild_rows();
        if let Some(group) = self.selected_group() {
            let message = format!("Argument group: {}", group);
            self.set_status_message(message);
        }
    }

    fn rebuild_rows(&mut self) {
        self.rows = self
            .extracted
            .get_index(self.group_index)
            .map(|schema| schema.arguments.iter().map(ArgumentRow::from_spec).collect())
            .unwrap_or_default();
        self.row_index = 0;
    }

    pub fn scroll_up(&mut self, amount: usize) {
        let max_scroll = self.max_scroll();
        let current = if self.follow { max_scroll } else { self.scroll };
        self.scroll = current.saturating_sub(amount).min(max_scroll);
        self.follow = false;
    }

    pub fn scroll_down(&mut self, amount: usize) {
        let max_scroll = self.max_scroll();
        let current = if self.follow { max_scroll } else { self.scroll };
        let next = (current + amount).min(max_scroll);
        self.scroll = next;
        self.follow = next == max_scroll;
    }

    pub fn ensure_follow(&mut self) {
        self.scroll = self.max_scroll();
    }

    pub fn set_log_view_height(&mut self, height: usize) {
        self.log_view_height = height;
        let max_scroll = self.max_scroll();
        if self.follow {
            self.scroll = max_scroll;
        } else {
            self.scroll = self.scroll.min(max_scroll);
        }
    }

    fn max_scroll(&self) -> usize {
        self.logs.len().saturating_sub(self.log_view_height.max(1))
    }

    fn toggle_follow(&mut self) {
        self.follow = !self.follow;
        if self.follow {
            self.ensure_follow();
        }
    }

    pub fn status_line(&self) -> String {
        let folder = self.selected_folder().unwrap_or("-");
        let script = self
            .selected_script()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "-".into());
        let state = match (self.session, self.pid, self.last_exit) {
            (SessionState::Running, Some(pid), _) => format!("running (pid {})", pid),
            (SessionState::Idle, _, Some(Some(code))) => format!("idle (last exit {})", code),
            (SessionState::Idle, _, Some(None)) => "idle (last run signalled)".to_string(),
            (state, _, _) => state.to_string(),
        };
        format!(
            "{} | {} | {} | lines: {} | follow: {} | ansi: {}",
            folder,
            script,
            state,
            self.logs.len(),
            if self.follow { "on" } else { "off" },
            if self.strip_ansi { "off" } else { "on" }
        )
    }

    pub fn status_message(&self) -> Option<(&str, StatusLevel)> {
        if let Some(message) = &self.status_message {
            let still_visible = match message.ttl {
                Some(ttl) => message.at.elapsed() < ttl,
                None => true,
            };
            if still_visible {
                return Some((message.text.as_str(), message.level));
            }
        }
        None
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.set_status_message_with_level(message, StatusLevel::Info, Some(Duration::from_secs(3)));
    }

    pub fn set_status_warning_for(&mut self, message: impl Into<String>, ttl: Duration) {
        self.set_status_message_with_level(message, StatusLevel::Warning, Some(ttl));
    }

    pub fn set_status_warning_persistent(&mut self, message: impl Into<String>) {
        self.set_status_message_with_level(message, StatusLevel::Warning, None);
    }

    fn set_status_message_with_level(
        &mut self,
        message: impl Into<String>,
        level: StatusLevel,
        ttl: Option<Duration>,
    ) {
        self.status_message = Some(StatusMessage {
            text: message.into(),
            at: Instant::now(),
            ttl,
            level,
        });
    }
}
