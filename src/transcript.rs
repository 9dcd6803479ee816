//! Per-run transcript files.
//!
//! Every run gets its own file under `<log_root>/<script folder>/`. Lines are
//! flushed as they are written so a crash of the child (or of the launcher)
//! leaves everything seen so far on disk.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};
use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::output::LogLine;

/// Append-only transcript of one run.
#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    file: Option<File>,
}

impl LogSink {
    /// Creates the transcript file for `script` under `log_root`.
    pub fn open(log_root: &Path, script: &Path) -> io::Result<Self> {
        let path = transcript_path(log_root, script, &Local::now());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        debug!(path = %path.display(), "opened transcript");
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line and flushes it. Writes after `close` are ignored.
    pub fn write(&mut self, line: &LogLine) -> io::Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        writeln!(file, "{}", line.plain())?;
        file.flush()
    }

    pub fn close(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(err) = file.sync_all() {
                warn!(path = %self.path.display(), error = %err, "failed to sync transcript");
            }
        }
    }
}

/// `<log_root>/<script parent name>/<script stem>_<YYYYMMDD_HHMMSS>.log`
pub fn transcript_path(log_root: &Path, script: &Path, now: &DateTime<Local>) -> PathBuf {
    let folder = script
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = script
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "script".to_string());
    let mut dir = log_root.to_path_buf();
    if !folder.is_empty() {
        dir.push(folder);
    }
    dir.join(format!("{}_{}.log", stem, now.format("%Y%m%d_%H%M%S")))
}

/// Deletes files under `log_root` last modified more than `max_age_days` ago.
///
/// Returns the number of files removed. A missing root is not an error.
pub fn cleanup_old_logs(log_root: &Path, max_age_days: u64) -> usize {
    if !log_root.exists() {
        return 0;
    }
    let max_age = Duration::from_secs(max_age_days.saturating_mul(24 * 60 * 60));
    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return 0;
    };

    let mut removed = 0;
    let walker = WalkBuilder::new(log_root).standard_filters(false).build();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "failed to walk log directory");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }
        let path = entry.path();
        let modified = match entry.metadata().map(|meta| meta.modified()) {
            Ok(Ok(modified)) => modified,
            _ => continue,
        };
        if modified >= cutoff {
            continue;
        }
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(err) => warn!(path = %path.display(), error = %err, "failed to delete old log"),
        }
    }
    debug!(removed, root = %log_root.display(), "swept old logs");
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn path_uses_folder_stem_and_timestamp() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 2).unwrap();
        let path = transcript_path(Path::new("/logs"), Path::new("/work/tools/deploy.py"), &now);
        assert_eq!(path, PathBuf::from("/logs/tools/deploy_20240309_140502.log"));
    }

    #[test]
    fn writes_are_flushed_and_close_stops_writing() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("scripts").join("hello.py");
        let mut sink = LogSink::open(&dir.path().join("logs"), &script).unwrap();
        assert!(sink.path().starts_with(dir.path().join("logs").join("scripts")));

        sink.write(&LogLine::info("first")).unwrap();
        let contents = fs::read_to_string(sink.path()).unwrap();
        assert!(contents.starts_with('['));
        assert!(contents.trim_end().ends_with("] first"));

        sink.close();
        sink.write(&LogLine::info("ignored")).unwrap();
        let contents = fs::read_to_string(sink.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn cleanup_keeps_recent_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("tools");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("a_20240101_000000.log"), "x").unwrap();
        assert_eq!(cleanup_old_logs(dir.path(), 30), 0);
        assert!(nested.join("a_20240101_000000.log").exists());
    }

    #[test]
    fn cleanup_of_missing_root_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_old_logs(&dir.path().join("absent"), 1), 0);
    }
}
