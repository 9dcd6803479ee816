//! Configuration management for scriptdeck.
//!
//! This module defines the structure of `settings.toml` and resolves the
//! config directory that holds it alongside the script catalog.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const SETTINGS_FILE: &str = "settings.toml";

/// Top-level structure of `settings.toml`. Omitted fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub ui: UiSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Root for transcripts and diagnostics, relative to the config directory.
    pub log_dir: PathBuf,
    /// Age in days after which old log files are deleted at startup.
    pub retention_days: u64,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    /// Whether to use Unicode symbols in the TUI.
    pub symbols: bool,
    /// Maximum number of output lines kept in memory.
    pub max_lines: usize,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            symbols: true,
            max_lines: 10_000,
        }
    }
}

impl Settings {
    /// Directory for run transcripts and the diagnostics log.
    pub fn log_root(&self, config_dir: &Path) -> PathBuf {
        if self.logging.log_dir.is_absolute() {
            self.logging.log_dir.clone()
        } else {
            config_dir.join(&self.logging.log_dir)
        }
    }
}

/// `override_dir` when given, otherwise the platform config dir plus `scriptdeck`.
pub fn config_dir(override_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir.to_path_buf());
    }
    let base = dirs::config_dir().context("failed to resolve the user config directory")?;
    Ok(base.join("scriptdeck"))
}

/// Loads and parses settings from a file path.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    let settings: Settings = toml::from_str(&raw)
        .with_context(|| format!("failed to parse settings file {}", path.display()))?;
    Ok(settings)
}

/// Loads `settings.toml` from `config_dir`, writing defaults if it is missing.
pub fn load_or_init(config_dir: &Path) -> Result<Settings> {
    let path = config_dir.join(SETTINGS_FILE);
    if path.exists() {
        return load_settings(&path);
    }
    let settings = Settings::default();
    write_toml(&path, &settings)?;
    Ok(settings)
}

/// Serializes `value` to `path`, creating the parent directory.
pub fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let raw = toml::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    std::fs::write(path, raw).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_optional_fields() {
        let raw = r#"
[logging]
log_dir = "/var/log/scriptdeck"
retention_days = 7

[ui]
symbols = false
"#;
        let settings: Settings = toml::from_str(raw).unwrap();
        assert_eq!(settings.logging.log_dir, PathBuf::from("/var/log/scriptdeck"));
        assert_eq!(settings.logging.retention_days, 7);
        assert!(!settings.ui.symbols);
        assert_eq!(settings.ui.max_lines, 10_000);
        assert_eq!(
            settings.log_root(Path::new("/home/u/.config/scriptdeck")),
            PathBuf::from("/var/log/scriptdeck")
        );
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(
            settings.log_root(Path::new("/cfg")),
            PathBuf::from("/cfg/logs")
        );
    }

    #[test]
    fn load_or_init_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let created = load_or_init(dir.path()).unwrap();
        assert_eq!(created, Settings::default());
        assert!(dir.path().join(SETTINGS_FILE).exists());

        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            "[logging]\nretention_days = 3\n",
        )
        .unwrap();
        let loaded = load_or_init(dir.path()).unwrap();
        assert_eq!(loaded.logging.retention_days, 3);
        assert_eq!(loaded.logging.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn override_wins_over_platform_dir() {
        let dir = config_dir(Some(Path::new("/tmp/deck"))).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/deck"));
    }
}
