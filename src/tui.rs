//! Terminal User Interface (TUI) rendering and management.
//!
//! This module handles initializing the terminal in raw mode, restoring it on exit,
//! and drawing the launcher using `ratatui`.

use std::io::{self, Stdout};
use std::path::Path;

use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs};
use ratatui::Terminal;

use crate::app::{App, Focus, StatusLevel};
use crate::launch::ArgumentRow;
use crate::output::{clock, sanitize_text, LogLine, Severity, StreamKind};
use crate::process::SessionState;

/// Type alias for the specific terminal backend used.
pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Initializes the terminal for TUI mode.
///
/// Enables raw mode, enters the alternate screen, and creates a `ratatui` Terminal instance.
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restores the terminal to its original state.
pub fn restore_terminal(mut terminal: TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Draws the current application state to the terminal.
pub fn draw(app: &mut App, terminal: &mut TuiTerminal) -> io::Result<()> {
    let title = window_title(app);
    execute!(terminal.backend_mut(), SetTitle(title))?;
    terminal.draw(|frame| {
        let area = frame.size();
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),
                Constraint::Length(3),
                Constraint::Length(4),
            ])
            .split(area);
        let main = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
            .split(vertical[0]);
        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(1)])
            .split(main[0]);
        let args_height = (app.rows.len() as u16).clamp(1, 10) + 2;
        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(args_height), Constraint::Min(1)])
            .split(main[1]);

        let folders = Tabs::new(app.folders.iter().map(|name| Line::from(name.clone())).collect::<Vec<_>>())
            .select(app.folder_index)
            .block(panel("Folders", false))
            .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
        frame.render_widget(folders, left[0]);

        let marker = if app.use_symbols { "▶ " } else { "> " };
        let scripts = app
            .scripts
            .iter()
            .map(|path| {
                let loaded = app.loaded_script.as_deref() == Some(path.as_path());
                let style = if loaded {
                    Style::default().fg(Color::Cyan)
                } else {
                    Style::default().fg(Color::Gray)
                };
                ListItem::new(Line::from(Span::styled(file_name(path), style)))
            })
            .collect::<Vec<_>>();
        let script_count = scripts.len();
        let list = List::new(scripts)
            .block(panel("Scripts", app.focus == Focus::Scripts))
            .highlight_style(Style::default().add_modifier(Modifier::BOLD))
            .highlight_symbol(marker);
        frame.render_stateful_widget(
            list,
            left[1],
            &mut list_state(app.script_index, script_count),
        );

        let args_title = match app.selected_group() {
            Some(group) if app.extracted.len() > 1 => {
                format!("Arguments · {} ({}/{})", group, app.group_index + 1, app.extracted.len())
            }
            Some(group) => format!("Arguments · {}", group),
            None => "Arguments".to_string(),
        };
        let args_block = panel(&args_title, app.focus == Focus::Arguments);
        if app.rows.is_empty() {
            let hint = if app.loaded_script.is_some() {
                "No arguments found"
            } else {
                "Press Enter on a script to load its arguments"
            };
            let empty = Paragraph::new(hint)
                .style(Style::default().fg(Color::DarkGray))
                .block(args_block);
            frame.render_widget(empty, right[0]);
        } else {
            let items = app
                .rows
                .iter()
                .map(|row| ListItem::new(row_line(row, app.use_symbols)))
                .collect::<Vec<_>>();
            let rows = List::new(items)
                .block(args_block)
                .highlight_style(Style::default().add_modifier(Modifier::BOLD))
                .highlight_symbol(marker);
            frame.render_stateful_widget(
                rows,
                right[0],
                &mut list_state(app.row_index, app.rows.len()),
            );
        }

        let output_title = output_title(app);
        let output_block = panel(&output_title, app.focus == Focus::Output);
        let output_area = output_block.inner(right[1]);
        let height = output_area.height as usize;
        app.set_log_view_height(height);
        let lines = render_log_lines(app, height, output_area.width as usize);
        let empty = lines.lines.is_empty();
        frame.render_widget(Paragraph::new(lines).block(output_block), right[1]);
        if empty {
            let placeholder = Paragraph::new("No output yet").style(Style::default().fg(Color::DarkGray));
            frame.render_widget(placeholder, output_area);
        }

        let input_focused = app.focus == Focus::Input;
        let cursor = if !input_focused {
            ""
        } else if app.use_symbols {
            "▌"
        } else {
            "|"
        };
        let input_title = if app.session == SessionState::Running {
            "Input (Enter to send)"
        } else {
            "Input (no script running)"
        };
        let input = Paragraph::new(format!("{}{}", app.input_buffer, cursor))
            .block(panel(input_title, input_focused));
        frame.render_widget(input, vertical[1]);

        let default_help = if app.use_symbols {
            "Tab focus | ↑/↓ select | ←/→ folder | Enter load/send | p group | Space toggle | ^R run | ^C stop | ^L clear | f follow | a ansi | ? help | q quit"
        } else {
            "Tab focus | Up/Down select | Left/Right folder | Enter load/send | p group | Space toggle | ^R run | ^C stop | ^L clear | f follow | a ansi | ? help | q quit"
        };
        let (help_line, help_style) = match app.status_message() {
            Some((text, StatusLevel::Info)) => (text.to_string(), Style::default().fg(Color::Gray)),
            Some((text, StatusLevel::Warning)) => (text.to_string(), Style::default().fg(Color::Yellow)),
            None => (default_help.to_string(), Style::default().fg(Color::DarkGray)),
        };
        let status = Paragraph::new(Text::from(vec![
            Line::from(Span::styled(app.status_line(), session_style(app.session))),
            Line::from(Span::styled(help_line, help_style)),
        ]))
        .block(panel("", false));
        frame.render_widget(status, vertical[2]);

        if app.show_help {
            let popup_area = centered_rect(60, 70, area);
            let help_text = [
                "Navigation:",
                "  Tab        Cycle focus",
                "  Up/Down    Select script / argument / scroll output",
                "  Left/Right Switch folder",
                "  PageUp/Dn  Scroll output",
                "  Home/End   Scroll to top / follow",
                "",
                "Arguments:",
                "  Enter      Load arguments of the selected script",
                "  p          Cycle argument group",
                "  Space      Toggle flag",
                "  type       Edit value",
                "",
                "Run:",
                "  Ctrl+R     Run selected script",
                "  Ctrl+C     Send SIGTERM to the script",
                "  Enter      Send input line (input pane)",
                "  Ctrl+L     Clear output",
                "",
                "General:",
                "  f          Toggle auto-follow",
                "  a          Toggle ANSI stripping",
                "  ?          Toggle this help",
                "  q/Ctrl+Q   Quit",
            ]
            .join("\n");
            let help_block = Paragraph::new(help_text)
                .block(panel("Help", false))
                .style(Style::default().bg(Color::DarkGray).fg(Color::White));
            frame.render_widget(Clear, popup_area);
            frame.render_widget(help_block, popup_area);
        }
    })?;
    Ok(())
}

fn panel(title: &str, focused: bool) -> Block<'_> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(if focused {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::DarkGray)
        })
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn window_title(app: &App) -> String {
    match app.selected_script() {
        Some(script) => format!("scriptdeck · {}", file_name(script)),
        None => "scriptdeck".to_string(),
    }
}

fn output_title(app: &App) -> String {
    let Some(path) = &app.log_path else {
        return "Output".to_string();
    };
    format!("Output · {} ({})", file_name(path), app.session)
}

fn row_line(row: &ArgumentRow, use_symbols: bool) -> Line<'static> {
    match row {
        ArgumentRow::Value { name, value } => Line::from(vec![
            Span::styled(format!("{:<20}", name), Style::default().fg(Color::Cyan)),
            Span::raw(value.clone()),
        ]),
        ArgumentRow::Flag { name, checked } => {
            let mark = match (checked, use_symbols) {
                (true, true) => "☑ ",
                (false, true) => "☐ ",
                (true, false) => "[x] ",
                (false, false) => "[ ] ",
            };
            Line::from(vec![
                Span::raw(mark),
                Span::styled(name.clone(), Style::default().fg(Color::Cyan)),
            ])
        }
    }
}

fn render_log_lines(app: &App, height: usize, width: usize) -> Text<'static> {
    if height == 0 || app.logs.is_empty() {
        return Text::default();
    }
    let total = app.logs.len();
    let max_scroll = total.saturating_sub(height);
    let start = if app.follow {
        max_scroll
    } else {
        app.scroll.min(max_scroll)
    };
    let lines = app
        .logs
        .iter()
        .skip(start)
        .take(height)
        .map(|line| render_line(line, app.strip_ansi, width))
        .collect::<Vec<_>>();
    Text::from(lines)
}

fn render_line(line: &LogLine, strip_ansi: bool, width: usize) -> Line<'static> {
    let stamp = clock(&line.timestamp);
    let text = if strip_ansi {
        sanitize_text(&line.text, true).trim_end().to_string()
    } else {
        visible_escapes(&line.text)
    };
    let available = width.saturating_sub(stamp.chars().count() + 1);
    Line::from(vec![
        Span::styled(stamp, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::styled(truncate(&text, available), line_style(line)),
    ])
}

/// Color for a line: severity token first, then the source stream.
fn line_style(line: &LogLine) -> Style {
    match (line.severity(), line.stream) {
        (Some(Severity::Debug), _) => Style::default().fg(Color::Cyan).add_modifier(Modifier::DIM),
        (Some(Severity::Info), _) => Style::default().fg(Color::Green),
        (Some(Severity::Warning), _) => Style::default().fg(Color::Yellow),
        (Some(Severity::Error), _) => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        (Some(Severity::Critical), _) => Style::default()
            .fg(Color::White)
            .bg(Color::Red)
            .add_modifier(Modifier::BOLD),
        (None, StreamKind::Stderr) => Style::default().fg(Color::Red),
        (None, StreamKind::Info) => Style::default().fg(Color::Gray).add_modifier(Modifier::DIM),
        (None, StreamKind::Stdout) => Style::default(),
    }
}

fn session_style(state: SessionState) -> Style {
    match state {
        SessionState::Idle => Style::default(),
        SessionState::Starting | SessionState::Exiting => Style::default().fg(Color::Yellow),
        SessionState::Running => Style::default().fg(Color::Green),
    }
}

fn list_state(selected: usize, len: usize) -> ListState {
    let mut state = ListState::default();
    if len > 0 {
        state.select(Some(selected.min(len - 1)));
    }
    state
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Shows escape bytes as `^[` so raw color codes can be inspected.
fn visible_escapes(text: &str) -> String {
    text.replace('\u{1b}', "^[").replace('\r', "^M")
}

fn truncate(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out = text.chars().take(max.saturating_sub(1)).collect::<String>();
    out.push('~');
    out
}
