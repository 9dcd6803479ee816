//! Static extraction of argparse-style argument schemas.
//!
//! Scans script source line by line for `add_argument(` registrations and recovers
//! the flag name plus the handful of keywords the launcher cares about. The scanned
//! script is never executed or imported, so this is safe on arbitrary or broken
//! source. It is heuristic: unusual formatting can produce wrong results.
//!
//! Only the first positional parameter of a registration becomes the argument name.
//! For `add_argument("-p", "--port")` the `--port` form is discarded.

use std::path::Path;

use anyhow::{Context, Result};
use serde::ser::{Serialize, Serializer};
use tracing::debug;

const MARKER: &str = "add_argument(";

/// How an argument consumes command-line tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Default `store`: the flag is followed by a value.
    Store,
    /// A toggle such as `store_true`: the flag stands alone.
    Flag,
    /// Any other action; treated as taking a value.
    Other(String),
}

/// One registered argument.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArgumentSpec {
    /// Flag string, e.g. `--port`.
    pub name: String,
    pub required: bool,
    pub default: Option<String>,
    pub action: Option<String>,
    /// Declared type, informational only.
    #[serde(rename = "type")]
    pub arg_type: String,
    pub help: String,
}

impl ArgumentSpec {
    fn named(name: String) -> Self {
        Self {
            name,
            required: false,
            default: None,
            action: None,
            arg_type: "str".to_string(),
            help: String::new(),
        }
    }

    pub fn action_kind(&self) -> ActionKind {
        match self.action.as_deref() {
            None | Some("store") => ActionKind::Store,
            Some("store_true" | "store_false" | "store_const" | "append_const" | "count") => {
                ActionKind::Flag
            }
            Some(action) if action.ends_with("BooleanOptionalAction") => ActionKind::Flag,
            Some(action) => ActionKind::Other(action.to_string()),
        }
    }
}

/// Arguments registered on one parser variable.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArgumentSchema {
    /// Variable name the arguments were registered on.
    pub name: String,
    pub arguments: Vec<ArgumentSpec>,
}

/// Schemas found in one source file, in first-seen order.
///
/// Serializes as a map of group name to argument list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedArguments {
    schemas: Vec<ArgumentSchema>,
}

impl ExtractedArguments {
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn get(&self, group: &str) -> Option<&ArgumentSchema> {
        self.schemas.iter().find(|schema| schema.name == group)
    }

    pub fn get_index(&self, index: usize) -> Option<&ArgumentSchema> {
        self.schemas.get(index)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.iter().map(|schema| schema.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArgumentSchema> {
        self.schemas.iter()
    }

    fn push(&mut self, group: String, spec: ArgumentSpec) {
        match self.schemas.iter_mut().find(|schema| schema.name == group) {
            Some(schema) => schema.arguments.push(spec),
            None => self.schemas.push(ArgumentSchema {
                name: group,
                arguments: vec![spec],
            }),
        }
    }
}

impl Serialize for ExtractedArguments {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.schemas
                .iter()
                .map(|schema| (&schema.name, &schema.arguments)),
        )
    }
}

/// Reads `path` once and extracts its argument schemas.
pub fn extract_file(path: &Path) -> Result<ExtractedArguments> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read script {}", path.display()))?;
    let source = String::from_utf8_lossy(&bytes);
    let extracted = extract(&source);
    debug!(
        script = %path.display(),
        groups = extracted.len(),
        "extracted argument schemas"
    );
    Ok(extracted)
}

/// Extracts argument schemas from script source text.
pub fn extract(source: &str) -> ExtractedArguments {
    let mut extracted = ExtractedArguments::default();
    for line in registration_lines(source) {
        if let Some((group, spec)) = parse_registration(&line) {
            extracted.push(group, spec);
        }
    }
    extracted
}

struct Pending {
    text: String,
    scanner: CallScanner,
}

// Joins registrations that span several physical lines into one logical line each.
fn registration_lines(source: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending: Option<Pending> = None;

    for raw in source.lines() {
        let is_comment = raw.trim_start().starts_with('#');
        if let Some(open) = pending.as_mut() {
            if !raw.contains(MARKER) || is_comment {
                let part = raw.trim();
                match open.scanner.feed(part) {
                    Scan::Closed(end) => {
                        open.text.push(' ');
                        open.text.push_str(&part[..=end]);
                        if let Some(done) = pending.take() {
                            lines.push(done.text);
                        }
                    }
                    Scan::Comment(at) => {
                        open.text.push(' ');
                        open.text.push_str(part[..at].trim_end());
                    }
                    Scan::Open => {
                        open.text.push(' ');
                        open.text.push_str(part);
                    }
                }
                continue;
            }
            debug!(dropped = %open.text, "unterminated add_argument call");
            pending = None;
        }

        if is_comment {
            continue;
        }
        let Some(at) = raw.find(MARKER) else {
            continue;
        };
        let open_paren = at + MARKER.len() - 1;
        let mut scanner = CallScanner::default();
        match scanner.feed(&raw[open_paren..]) {
            Scan::Closed(end) => lines.push(raw[..=open_paren + end].to_string()),
            Scan::Comment(end) => {
                pending = Some(Pending {
                    text: raw[..open_paren + end].trim_end().to_string(),
                    scanner,
                })
            }
            Scan::Open => {
                pending = Some(Pending {
                    text: raw.trim_end().to_string(),
                    scanner,
                })
            }
        }
    }

    if let Some(open) = pending {
        debug!(dropped = %open.text, "unterminated add_argument call at end of file");
    }
    lines
}

fn parse_registration(line: &str) -> Option<(String, ArgumentSpec)> {
    let at = line.find(MARKER)?;
    let group = line.split('.').next()?.trim();
    if group.is_empty() || group.len() >= at {
        return None;
    }

    let open_paren = at + MARKER.len() - 1;
    let mut scanner = CallScanner::default();
    let Scan::Closed(end) = scanner.feed(&line[open_paren..]) else {
        return None;
    };
    let params = &line[open_paren + 1..open_paren + end];

    let mut name = None;
    let mut required = false;
    let mut default = None;
    let mut action = None;
    let mut arg_type = None;
    let mut help = None;
    for param in split_params(params) {
        match split_keyword(param) {
            Some(("required", value)) => required = value.contains("True"),
            Some(("default", value)) => {
                if value.trim() != "None" {
                    default = Some(unquote(value));
                }
            }
            Some(("action", value)) => action = Some(unquote(value)),
            Some(("type", value)) => arg_type = Some(unquote(value)),
            Some(("help", value)) => help = Some(unquote(value)),
            Some(_) => {}
            None => {
                if name.is_none() {
                    name = Some(unquote(param));
                }
            }
        }
    }

    let name = name.filter(|name| !name.is_empty())?;
    let mut spec = ArgumentSpec::named(name);
    spec.required = required;
    spec.default = default;
    spec.action = action;
    if let Some(arg_type) = arg_type {
        spec.arg_type = arg_type;
    }
    spec.help = help.unwrap_or_default();
    Some((group.to_string(), spec))
}

// Splits on commas that sit outside strings and brackets.
fn split_params(text: &str) -> Vec<&str> {
    let mut quotes = QuoteState::default();
    let mut depth = 0usize;
    let mut start = 0;
    let mut params = Vec::new();
    for (i, c) in CodeChars::new(&mut quotes, text) {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                params.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&text[start..]);
    params
        .into_iter()
        .map(str::trim)
        .filter(|param| !param.is_empty())
        .collect()
}

// Returns `(keyword, value)` when the parameter is `identifier=value`.
fn split_keyword(param: &str) -> Option<(&str, &str)> {
    let mut quotes = QuoteState::default();
    let mut depth = 0usize;
    let mut previous = None;
    let mut chars = CodeChars::new(&mut quotes, param).peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '=' if depth == 0 => {
                let is_comparison = matches!(previous, Some('=' | '!' | '<' | '>'))
                    || matches!(chars.peek(), Some((_, '=')));
                if is_comparison {
                    return None;
                }
                let key = param[..i].trim();
                let is_identifier = !key.is_empty()
                    && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                return is_identifier.then(|| (key, &param[i + 1..]));
            }
            _ => {}
        }
        previous = Some(c);
    }
    None
}

/// Strips one matching pair of outer quotes (after any string prefix such as
/// `r` or `f`). Values that are not a single string literal are kept as written.
fn unquote(value: &str) -> String {
    let value = value.trim();
    let prefix_len = value
        .find(['"', '\''])
        .filter(|&at| at <= 2 && value[..at].chars().all(|c| "rRbBuUfF".contains(c)))
        .unwrap_or(0);
    let literal = &value[prefix_len..];
    for delimiter in ["\"\"\"", "'''", "\"", "'"] {
        if literal.len() >= 2 * delimiter.len()
            && literal.starts_with(delimiter)
            && literal.ends_with(delimiter)
        {
            let inner = &literal[delimiter.len()..literal.len() - delimiter.len()];
            return inner.trim().to_string();
        }
    }
    literal.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Quote {
    ch: char,
    triple: bool,
}

impl Quote {
    fn triple_delimiter(ch: char) -> &'static str {
        if ch == '"' {
            "\"\"\""
        } else {
            "'''"
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct QuoteState {
    open: Option<Quote>,
    escaped: bool,
}

impl QuoteState {
    fn end_line(&mut self) {
        self.escaped = false;
        if matches!(self.open, Some(Quote { triple: false, .. })) {
            self.open = None;
        }
    }
}

// Yields the characters of `text` that sit outside string literals.
struct CodeChars<'a> {
    state: &'a mut QuoteState,
    text: &'a str,
    pos: usize,
}

impl<'a> CodeChars<'a> {
    fn new(state: &'a mut QuoteState, text: &'a str) -> Self {
        Self {
            state,
            text,
            pos: 0,
        }
    }
}

impl Iterator for CodeChars<'_> {
    type Item = (usize, char);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(c) = self.text[self.pos..].chars().next() {
            let i = self.pos;
            self.pos += c.len_utf8();
            if self.state.escaped {
                self.state.escaped = false;
                continue;
            }
            match self.state.open {
                Some(quote) => {
                    if c == '\\' {
                        self.state.escaped = true;
                    } else if c == quote.ch {
                        if !quote.triple {
                            self.state.open = None;
                        } else if self.text[i..].starts_with(Quote::triple_delimiter(c)) {
                            self.pos = i + 3;
                            self.state.open = None;
                        }
                    }
                }
                None if c == '"' || c == '\'' => {
                    let triple = self.text[i..].starts_with(Quote::triple_delimiter(c));
                    if triple {
                        self.pos = i + 3;
                    }
                    self.state.open = Some(Quote { ch: c, triple });
                }
                None => return Some((i, c)),
            }
        }
        None
    }
}

enum Scan {
    /// Byte offset of the bracket that balances the first opening one.
    Closed(usize),
    /// A `#` comment starts at this offset; the call is still open.
    Comment(usize),
    Open,
}

#[derive(Debug, Default)]
struct CallScanner {
    quotes: QuoteState,
    depth: usize,
}

impl CallScanner {
    fn feed(&mut self, text: &str) -> Scan {
        for (i, c) in CodeChars::new(&mut self.quotes, text) {
            match c {
                '#' => return Scan::Comment(i),
                '(' | '[' | '{' => self.depth += 1,
                ')' | ']' | '}' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Scan::Closed(i);
                    }
                }
                _ => {}
            }
        }
        self.quotes.end_line();
        Scan::Open
    }
}
