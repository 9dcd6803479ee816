//! Argument rows and command-line assembly.

use std::path::Path;

use crate::extract::{ActionKind, ArgumentSpec};

/// Interpreter flag that disables output buffering in the child.
pub const UNBUFFERED_FLAG: &str = "-u";

/// One rendered argument input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentRow {
    /// A flag followed by a typed value.
    Value { name: String, value: String },
    /// A standalone flag toggled by a checkbox.
    Flag { name: String, checked: bool },
}

impl ArgumentRow {
    /// Builds the row matching the argument's action, prefilled with its default.
    pub fn from_spec(spec: &ArgumentSpec) -> Self {
        match spec.action_kind() {
            ActionKind::Flag => Self::Flag {
                name: spec.name.clone(),
                checked: false,
            },
            ActionKind::Store | ActionKind::Other(_) => Self::Value {
                name: spec.name.clone(),
                value: spec.default.clone().unwrap_or_default(),
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Value { name, .. } | Self::Flag { name, .. } => name,
        }
    }

    /// Command-line tokens this row contributes. Empty values and unchecked
    /// flags contribute nothing.
    pub fn tokens(&self) -> Vec<String> {
        match self {
            Self::Value { name, value } => {
                let value = value.trim();
                if value.is_empty() {
                    Vec::new()
                } else {
                    vec![name.clone(), value.to_string()]
                }
            }
            Self::Flag { name, checked } => {
                if *checked {
                    vec![name.clone()]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

/// Flattens rows into tokens, preserving row order.
pub fn collect_arguments(rows: &[ArgumentRow]) -> Vec<String> {
    rows.iter().flat_map(ArgumentRow::tokens).collect()
}

/// `[executable, "-u", script, ...arguments]`
pub fn build_command(executable: &Path, script: &Path, arguments: &[String]) -> Vec<String> {
    let mut command = Vec::with_capacity(3 + arguments.len());
    command.push(executable.to_string_lossy().into_owned());
    command.push(UNBUFFERED_FLAG.to_string());
    command.push(script.to_string_lossy().into_owned());
    command.extend(arguments.iter().cloned());
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, action: Option<&str>, default: Option<&str>) -> ArgumentSpec {
        ArgumentSpec {
            name: name.to_string(),
            required: false,
            default: default.map(str::to_string),
            action: action.map(str::to_string),
            arg_type: "str".to_string(),
            help: String::new(),
        }
    }

    #[test]
    fn rows_follow_action_kind() {
        let flag = ArgumentRow::from_spec(&spec("--debug", Some("store_true"), None));
        assert_eq!(
            flag,
            ArgumentRow::Flag {
                name: "--debug".into(),
                checked: false
            }
        );
        let value = ArgumentRow::from_spec(&spec("--ip", None, Some("10.0.190.70")));
        assert_eq!(
            value,
            ArgumentRow::Value {
                name: "--ip".into(),
                value: "10.0.190.70".into()
            }
        );
    }

    #[test]
    fn flag_row_emits_only_when_checked() {
        let mut row = ArgumentRow::Flag {
            name: "--debug".into(),
            checked: false,
        };
        assert!(row.tokens().is_empty());
        if let ArgumentRow::Flag { checked, .. } = &mut row {
            *checked = true;
        }
        assert_eq!(row.tokens(), vec!["--debug"]);
    }

    #[test]
    fn value_row_emits_only_when_non_empty() {
        let empty = ArgumentRow::Value {
            name: "--port".into(),
            value: "   ".into(),
        };
        assert!(empty.tokens().is_empty());
        let filled = ArgumentRow::Value {
            name: "--port".into(),
            value: " 8080 ".into(),
        };
        assert_eq!(filled.tokens(), vec!["--port", "8080"]);
    }

    #[test]
    fn command_preserves_row_order() {
        let rows = vec![
            ArgumentRow::Value {
                name: "--port".into(),
                value: "8080".into(),
            },
            ArgumentRow::Value {
                name: "--logfile".into(),
                value: String::new(),
            },
            ArgumentRow::Flag {
                name: "--debug".into(),
                checked: true,
            },
        ];
        let command = build_command(
            Path::new("/bin/py"),
            Path::new("run.py"),
            &collect_arguments(&rows),
        );
        assert_eq!(
            command,
            vec!["/bin/py", "-u", "run.py", "--port", "8080", "--debug"]
        );
    }
}
