//! Watching the selected script folder.
//!
//! A background thread receives raw notify events for one folder, drops the ones
//! that do not concern a script file, debounces bursts and then sends
//! `Event::ScriptsChanged` to the main event loop.

use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::{Event as NotifyEvent, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

use crate::catalog::ScriptFilter;
use crate::events::Event;

const DEBOUNCE: Duration = Duration::from_millis(200);

/// Keeps a folder watched. Dropping it stops the watcher and its thread.
pub struct FolderWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl FolderWatcher {
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

/// Starts watching `path` (non-recursively) for script files accepted by `filter`.
pub fn watch_folder(
    path: PathBuf,
    filter: ScriptFilter,
    tx: mpsc::Sender<Event>,
) -> Result<FolderWatcher> {
    let (raw_tx, raw_rx) = std::sync::mpsc::channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = raw_tx.send(res);
        },
        notify::Config::default(),
    )
    .context("failed to create watcher")?;
    watcher
        .watch(&path, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", path.display()))?;

    let label = path.display().to_string();
    std::thread::spawn(move || {
        debounce_loop(raw_rx, &filter, &tx);
        debug!(path = %label, "folder watcher stopped");
    });

    Ok(FolderWatcher {
        path,
        _watcher: watcher,
    })
}

fn debounce_loop(
    raw_rx: std::sync::mpsc::Receiver<notify::Result<NotifyEvent>>,
    filter: &ScriptFilter,
    tx: &mpsc::Sender<Event>,
) {
    loop {
        let event = match raw_rx.recv() {
            Ok(res) => res,
            Err(_) => return,
        };
        if !is_relevant(&event, filter) {
            continue;
        }

        let mut last = Instant::now();
        loop {
            let elapsed = last.elapsed();
            if elapsed >= DEBOUNCE {
                break;
            }
            match raw_rx.recv_timeout(DEBOUNCE - elapsed) {
                Ok(res) => {
                    if is_relevant(&res, filter) {
                        last = Instant::now();
                    }
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        if tx.blocking_send(Event::ScriptsChanged).is_err() {
            return;
        }
    }
}

fn is_relevant(event: &notify::Result<NotifyEvent>, filter: &ScriptFilter) -> bool {
    let Ok(event) = event else {
        return true;
    };
    if event.kind.is_access() {
        return false;
    }
    if event.paths.is_empty() {
        return true;
    }
    event.paths.iter().any(|path| filter.matches(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ScriptFolder;
    use notify::event::{AccessKind, CreateKind, EventKind};

    fn filter() -> ScriptFilter {
        ScriptFilter::new(&ScriptFolder::new("scripts", "scripts")).unwrap()
    }

    fn event(kind: EventKind, path: &str) -> notify::Result<NotifyEvent> {
        Ok(NotifyEvent::new(kind).add_path(PathBuf::from(path)))
    }

    #[test]
    fn only_script_files_are_relevant() {
        let filter = filter();
        let create = EventKind::Create(CreateKind::File);
        assert!(is_relevant(&event(create, "/s/tool.py"), &filter));
        assert!(!is_relevant(&event(create, "/s/notes.txt"), &filter));
        assert!(!is_relevant(&event(create, "/s/__init__.py"), &filter));
    }

    #[test]
    fn access_events_are_ignored() {
        let kind = EventKind::Access(AccessKind::Any);
        assert!(!is_relevant(&event(kind, "/s/tool.py"), &filter()));
    }

    #[test]
    fn watcher_errors_force_refresh() {
        let error: notify::Result<NotifyEvent> = Err(notify::Error::generic("lost"));
        assert!(is_relevant(&error, &filter()));
    }
}
