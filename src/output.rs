//! Output lines, buffering and formatting.
//!
//! A `LogLine` is one unit of output from a run. The same line is written to the
//! transcript as plain text and shown on screen with a color chosen from its
//! severity token or source stream.

use std::collections::VecDeque;
use std::sync::OnceLock;

use chrono::{DateTime, Local};
use regex::Regex;
use strip_ansi_escapes::strip;

/// Indicates the source stream of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard Output.
    Stdout,
    /// Standard Error.
    Stderr,
    /// Messages produced by the launcher itself.
    Info,
}

/// A single line of output from a run.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    /// The content of the line, without trailing newline.
    pub text: String,
    /// The stream it originated from.
    pub stream: StreamKind,
    /// Wall-clock time the line was observed.
    pub timestamp: DateTime<Local>,
}

impl LogLine {
    pub fn new(text: impl Into<String>, stream: StreamKind) -> Self {
        Self {
            text: text.into(),
            stream,
            timestamp: Local::now(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(text, StreamKind::Info)
    }

    /// `[HH:MM:SS] text` with color codes removed, as written to the transcript.
    pub fn plain(&self) -> String {
        format!("{} {}", clock(&self.timestamp), display_text(&self.text))
    }

    pub fn severity(&self) -> Option<Severity> {
        Severity::detect(&display_text(&self.text))
    }
}

/// Severity token found at the start of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn detect(text: &str) -> Option<Self> {
        static LEVEL: OnceLock<Option<Regex>> = OnceLock::new();
        let level = LEVEL
            .get_or_init(|| Regex::new(r"^(DEBUG|INFO|WARNING|ERROR|CRITICAL)").ok())
            .as_ref()?;
        let found = level.captures(text)?.get(1)?.as_str();
        match found {
            "DEBUG" => Some(Severity::Debug),
            "INFO" => Some(Severity::Info),
            "WARNING" => Some(Severity::Warning),
            "ERROR" => Some(Severity::Error),
            "CRITICAL" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// `[HH:MM:SS]`
pub fn clock(timestamp: &DateTime<Local>) -> String {
    timestamp.format("[%H:%M:%S]").to_string()
}

/// Text with ANSI codes and trailing whitespace removed.
pub fn display_text(text: &str) -> String {
    sanitize_text(text, true).trim_end().to_string()
}

/// Sanitizes text for display, optionally stripping ANSI escape codes.
///
/// If `strip_ansi` is true, ANSI codes are removed. Invalid UTF-8 sequences are replaced.
pub fn sanitize_text(text: &str, strip_ansi: bool) -> String {
    if !strip_ansi {
        return text.to_string();
    }
    let stripped = strip(text.as_bytes());
    String::from_utf8_lossy(&stripped).to_string()
}

/// Formats a line for a plain terminal, colored with ANSI SGR codes when `color` is set.
pub fn format_terminal_line(line: &LogLine, color: bool) -> String {
    let stamp = clock(&line.timestamp);
    let text = display_text(&line.text);
    if !color {
        return format!("{} {}", stamp, text);
    }
    let code = match (line.severity(), line.stream) {
        (Some(Severity::Debug), _) => "2;36",
        (Some(Severity::Info), _) => "32",
        (Some(Severity::Warning), _) => "33",
        (Some(Severity::Error), _) => "1;31",
        (Some(Severity::Critical), _) => "1;31;40",
        (None, StreamKind::Stderr) => "31",
        (None, StreamKind::Info) => "2",
        (None, StreamKind::Stdout) => "0",
    };
    if code == "0" {
        format!("\u{1b}[2m{}\u{1b}[0m {}", stamp, text)
    } else {
        format!("\u{1b}[2m{}\u{1b}[0m \u{1b}[{}m{}\u{1b}[0m", stamp, code, text)
    }
}

/// A fixed-capacity ring buffer for storing `LogLine`s.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    max_lines: usize,
    lines: VecDeque<LogLine>,
}

impl LogBuffer {
    /// Creates a new `LogBuffer` with the specified maximum capacity.
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            lines: VecDeque::with_capacity(max_lines.min(1024)),
        }
    }

    /// Adds a line to the buffer.
    ///
    /// Returns `true` if an old line was dropped to make room.
    pub fn push(&mut self, line: LogLine) -> bool {
        let mut dropped = false;
        self.lines.push_back(line);
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
            dropped = true;
        }
        dropped
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Returns the number of lines currently in the buffer.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns an iterator over the lines in the buffer.
    pub fn iter(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(text: &str, stream: StreamKind) -> LogLine {
        LogLine {
            text: text.to_string(),
            stream,
            timestamp: Local.with_ymd_and_hms(2024, 5, 1, 9, 4, 7).unwrap(),
        }
    }

    #[test]
    fn log_buffer_drops_oldest() {
        let mut buffer = LogBuffer::new(2);
        buffer.push(LogLine::new("a", StreamKind::Stdout));
        buffer.push(LogLine::new("b", StreamKind::Stdout));
        let dropped = buffer.push(LogLine::new("c", StreamKind::Stdout));
        assert!(dropped);
        let lines = buffer.iter().map(|l| l.text.clone()).collect::<Vec<_>>();
        assert_eq!(lines, vec!["b", "c"]);
    }

    #[test]
    fn plain_line_has_clock_and_no_color() {
        let line = at("\u{1b}[31mERROR\u{1b}[0m boom  ", StreamKind::Stderr);
        assert_eq!(line.plain(), "[09:04:07] ERROR boom");
    }

    #[test]
    fn severity_is_read_from_line_start() {
        assert_eq!(Severity::detect("WARNING: disk"), Some(Severity::Warning));
        assert_eq!(Severity::detect("CRITICAL failure"), Some(Severity::Critical));
        assert_eq!(Severity::detect("an ERROR later"), None);
        assert_eq!(Severity::detect("debug lowercase"), None);
    }

    #[test]
    fn terminal_line_colors_by_severity_then_stream() {
        let info = format_terminal_line(&at("INFO ready", StreamKind::Stderr), true);
        assert!(info.contains("\u{1b}[32mINFO ready"));
        let stderr = format_terminal_line(&at("oops", StreamKind::Stderr), true);
        assert!(stderr.contains("\u{1b}[31moops"));
        let plain = format_terminal_line(&at("oops", StreamKind::Stderr), false);
        assert_eq!(plain, "[09:04:07] oops");
    }
}
