//! Script folder catalog.
//!
//! The catalog lives in `script_folders.toml` as a list of `[[folders]]` tables.
//! Relative paths inside it are resolved against the config directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::write_toml;
use crate::process::LaunchRequest;

pub const CATALOG_FILE: &str = "script_folders.toml";

/// One source of runnable scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFolder {
    /// Unique key.
    pub name: String,
    /// Directory scanned for scripts.
    pub path: PathBuf,
    /// Interpreter. A bare program name is looked up on `PATH`.
    #[serde(default = "default_executable")]
    pub executable: PathBuf,
    /// Working directory for runs; the launcher's own when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Glob matched against file names, e.g. `*.py`.
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
    /// File name prefixes that hide a script.
    #[serde(default = "default_exclude_start")]
    pub exclude_start: Vec<String>,
}

impl ScriptFolder {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            executable: default_executable(),
            cwd: None,
            file_extension: default_file_extension(),
            exclude_start: default_exclude_start(),
        }
    }
}

fn default_executable() -> PathBuf {
    PathBuf::from("python3")
}

fn default_file_extension() -> String {
    "*.py".to_string()
}

fn default_exclude_start() -> Vec<String> {
    vec!["__".to_string()]
}

/// The catalog written when none exists yet.
pub fn default_folders() -> Vec<ScriptFolder> {
    vec![ScriptFolder::new("scripts", "scripts")]
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("script folder `{0}` already exists")]
    Duplicate(String),
    #[error("no script folder named `{0}`")]
    Unknown(String),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    folders: Vec<ScriptFolder>,
}

/// Decides which file names in a folder are runnable scripts.
#[derive(Debug, Clone)]
pub struct ScriptFilter {
    matcher: GlobMatcher,
    exclude_start: Vec<String>,
}

impl ScriptFilter {
    pub fn new(folder: &ScriptFolder) -> Result<Self> {
        let pattern = folder.file_extension.trim();
        // `.py` is accepted as shorthand for `*.py`.
        let pattern = if pattern.starts_with('.') {
            format!("*{}", pattern)
        } else {
            pattern.to_string()
        };
        let matcher = Glob::new(&pattern)
            .with_context(|| format!("invalid file pattern {:?} for {}", pattern, folder.name))?
            .compile_matcher();
        Ok(Self {
            matcher,
            exclude_start: folder.exclude_start.clone(),
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy();
        if self
            .exclude_start
            .iter()
            .any(|prefix| !prefix.is_empty() && name.starts_with(prefix.as_str()))
        {
            return false;
        }
        self.matcher.is_match(name.as_ref())
    }
}

/// Loaded catalog plus the file it came from.
#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
    base: PathBuf,
    folders: Vec<ScriptFolder>,
}

impl Catalog {
    /// Loads `script_folders.toml` from `config_dir`, writing the default
    /// catalog first if the file does not exist.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CATALOG_FILE);
        if !path.exists() {
            let catalog = Self {
                path,
                base: config_dir.to_path_buf(),
                folders: default_folders(),
            };
            catalog.save()?;
            return Ok(catalog);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let file: CatalogFile = toml::from_str(&raw)
            .with_context(|| format!("failed to parse catalog {}", path.display()))?;
        Ok(Self {
            path,
            base: config_dir.to_path_buf(),
            folders: file.folders,
        })
    }

    pub fn save(&self) -> Result<()> {
        let file = CatalogFile {
            folders: self.folders.clone(),
        };
        write_toml(&self.path, &file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn folders(&self) -> &[ScriptFolder] {
        &self.folders
    }

    pub fn folder(&self, name: &str) -> Option<&ScriptFolder> {
        self.folders.iter().find(|folder| folder.name == name)
    }

    pub fn add(&mut self, folder: ScriptFolder) -> Result<(), CatalogError> {
        if self.folder(&folder.name).is_some() {
            return Err(CatalogError::Duplicate(folder.name));
        }
        self.folders.push(folder);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<ScriptFolder, CatalogError> {
        let index = self
            .folders
            .iter()
            .position(|folder| folder.name == name)
            .ok_or_else(|| CatalogError::Unknown(name.to_string()))?;
        Ok(self.folders.remove(index))
    }

    pub fn restore_defaults(&mut self) {
        self.folders = default_folders();
    }

    /// Directory scanned for `folder`'s scripts.
    pub fn folder_path(&self, folder: &ScriptFolder) -> PathBuf {
        self.resolve(&folder.path)
    }

    /// Scripts in `folder` that pass its filter, sorted by path.
    ///
    /// A folder that does not exist yet simply has no scripts.
    pub fn scripts(&self, folder: &ScriptFolder) -> Result<Vec<PathBuf>> {
        let dir = self.folder_path(folder);
        if !dir.is_dir() {
            debug!(folder = %folder.name, path = %dir.display(), "script folder missing");
            return Ok(Vec::new());
        }
        let filter = ScriptFilter::new(folder)?;
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("failed to list {}", dir.display()))?;
        let mut scripts = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
            let path = entry.path();
            if path.is_file() && filter.matches(&path) {
                scripts.push(path);
            }
        }
        scripts.sort();
        Ok(scripts)
    }

    /// Builds the launch request for `script` in `folder`.
    pub fn launch_request(
        &self,
        folder: &ScriptFolder,
        script: PathBuf,
        arguments: Vec<String>,
    ) -> LaunchRequest {
        LaunchRequest {
            executable: self.resolve_executable(&folder.executable),
            script,
            arguments,
            cwd: folder.cwd.as_deref().map(|cwd| self.resolve(cwd)),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }

    fn resolve_executable(&self, executable: &Path) -> PathBuf {
        if executable.components().count() <= 1 && executable.is_relative() {
            executable.to_path_buf()
        } else {
            self.resolve(executable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), "").unwrap();
    }

    #[test]
    fn parses_folders_with_defaults() {
        let raw = r#"
[[folders]]
name = "tools"
path = "/opt/tools"
executable = ".venv/bin/python"
cwd = "/opt"
file_extension = "*.py"
exclude_start = ["__", "_"]

[[folders]]
name = "misc"
path = "misc"
"#;
        let file: CatalogFile = toml::from_str(raw).unwrap();
        assert_eq!(file.folders.len(), 2);
        assert_eq!(file.folders[0].exclude_start, vec!["__", "_"]);
        assert_eq!(file.folders[0].cwd.as_deref(), Some(Path::new("/opt")));
        assert_eq!(file.folders[1], ScriptFolder::new("misc", "misc"));
    }

    #[test]
    fn missing_catalog_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::load(dir.path()).unwrap();
        assert!(dir.path().join(CATALOG_FILE).exists());
        assert_eq!(catalog.folders(), default_folders().as_slice());

        let reloaded = Catalog::load(dir.path()).unwrap();
        assert_eq!(reloaded.folders(), catalog.folders());
    }

    #[test]
    fn add_rejects_duplicates_and_remove_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::load(dir.path()).unwrap();
        catalog.add(ScriptFolder::new("ops", "/srv/ops")).unwrap();
        assert_eq!(
            catalog.add(ScriptFolder::new("ops", "/elsewhere")),
            Err(CatalogError::Duplicate("ops".into()))
        );
        assert_eq!(
            catalog.remove("nope"),
            Err(CatalogError::Unknown("nope".into()))
        );
        catalog.save().unwrap();

        let mut reloaded = Catalog::load(dir.path()).unwrap();
        assert_eq!(reloaded.folders().len(), 2);
        reloaded.remove("ops").unwrap();
        reloaded.restore_defaults();
        assert_eq!(reloaded.folders(), default_folders().as_slice());
    }

    #[test]
    fn scripts_are_filtered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let scripts_dir = dir.path().join("scripts");
        std::fs::create_dir_all(scripts_dir.join("nested.py")).unwrap();
        touch(&scripts_dir, "zeta.py");
        touch(&scripts_dir, "alpha.py");
        touch(&scripts_dir, "__init__.py");
        touch(&scripts_dir, "_private.py");
        touch(&scripts_dir, "notes.txt");

        let catalog = Catalog::load(dir.path()).unwrap();
        let folder = catalog.folder("scripts").unwrap();
        let names = catalog
            .scripts(folder)
            .unwrap()
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["_private.py", "alpha.py", "zeta.py"]);
    }

    #[test]
    fn missing_folder_has_no_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::load(dir.path()).unwrap();
        let folder = catalog.folder("scripts").unwrap();
        assert!(catalog.scripts(folder).unwrap().is_empty());
    }

    #[test]
    fn dotted_extension_is_shorthand_for_glob() {
        let mut folder = ScriptFolder::new("sh", "sh");
        folder.file_extension = ".sh".into();
        folder.exclude_start.clear();
        let filter = ScriptFilter::new(&folder).unwrap();
        assert!(filter.matches(Path::new("/x/deploy.sh")));
        assert!(filter.matches(Path::new("__odd.sh")));
        assert!(!filter.matches(Path::new("deploy.py")));
    }

    #[test]
    fn launch_request_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::load(dir.path()).unwrap();
        let mut folder = ScriptFolder::new("venv", "scripts");
        folder.executable = PathBuf::from(".venv/bin/python");
        folder.cwd = Some(PathBuf::from("work"));

        let request = catalog.launch_request(&folder, PathBuf::from("/s/run.py"), vec![]);
        assert_eq!(request.executable, dir.path().join(".venv/bin/python"));
        assert_eq!(request.cwd, Some(dir.path().join("work")));

        let plain = catalog.launch_request(
            &ScriptFolder::new("p", "scripts"),
            PathBuf::from("/s/run.py"),
            vec![],
        );
        assert_eq!(plain.executable, PathBuf::from("python3"));
        assert_eq!(plain.cwd, None);
    }
}
