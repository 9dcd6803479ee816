//! Process execution for a single script run.
//!
//! `ProcessSession` spawns the interpreter, drains stdout and stderr on separate
//! tasks, forwards operator input to stdin and watches for exit. Every output line
//! is written to the run's transcript and published as `Event::Output` in one
//! step, so the transcript and the display always see the same lines.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::Event;
use crate::output::{LogLine, StreamKind};
use crate::process::{LaunchRequest, SessionState};
use crate::stream::LineReader;
use crate::transcript::LogSink;

/// How long a pipe may stay silent after the child has exited before its reader stops.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

const INTERRUPT_NOTICE: &str = "User interrupt. Sending SIGTERM to script process.";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A run is already active; the new one was not started.
    #[error("a script is already running")]
    AlreadyRunning,
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to create transcript under {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to send input: {0}")]
    Input(#[source] io::Error),
}

/// Details of a run that was spawned successfully.
#[derive(Debug, Clone)]
pub struct StartedRun {
    pub pid: u32,
    pub log_path: PathBuf,
}

/// Owns at most one child process at a time.
///
/// Methods called from the event loop never wait on the event channel: events
/// are published by session tasks, so a full channel cannot stall the consumer.
pub struct ProcessSession {
    shared: Arc<Shared>,
    log_root: PathBuf,
}

struct Shared {
    events: mpsc::Sender<Event>,
    state: watch::Sender<SessionState>,
    run: Mutex<RunInfo>,
    sink: Mutex<Option<LogSink>>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    // Last publishing task; the next one waits for it so runs never interleave.
    tail: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Default)]
struct RunInfo {
    pid: Option<u32>,
    exit_code: Option<i32>,
    log_path: Option<PathBuf>,
    terminate: Option<oneshot::Sender<()>>,
    terminating: bool,
}

impl ProcessSession {
    /// Creates an idle session writing transcripts under `log_root`.
    pub fn new(log_root: PathBuf, events: mpsc::Sender<Event>) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            shared: Arc::new(Shared {
                events,
                state,
                run: Mutex::new(RunInfo::default()),
                sink: Mutex::new(None),
                stdin: tokio::sync::Mutex::new(None),
                tail: Mutex::new(None),
            }),
            log_root,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    pub fn pid(&self) -> Option<u32> {
        lock(&self.shared.run).pid
    }

    /// Exit code of the most recent finished run.
    pub fn exit_code(&self) -> Option<i32> {
        lock(&self.shared.run).exit_code
    }

    /// Transcript of the current or most recent run.
    pub fn log_path(&self) -> Option<PathBuf> {
        lock(&self.shared.run).log_path.clone()
    }

    /// Whether a termination signal was requested for the running child.
    pub fn is_terminating(&self) -> bool {
        lock(&self.shared.run).terminating
    }

    /// Starts a run.
    ///
    /// The transcript is opened before spawning so the `Running:` announcement is
    /// part of it. If the spawn fails the transcript is closed and the session
    /// returns to idle. The matching events are published in the background.
    pub async fn start(&self, request: &LaunchRequest) -> Result<StartedRun, SessionError> {
        let claimed = self.shared.state.send_if_modified(|state| {
            if state.is_active() {
                return false;
            }
            *state = SessionState::Starting;
            true
        });
        if !claimed {
            return Err(SessionError::AlreadyRunning);
        }
        {
            let mut run = lock(&self.shared.run);
            *run = RunInfo::default();
        }
        let mut announce = vec![Event::SessionState(SessionState::Starting)];

        let sink = match LogSink::open(&self.log_root, &request.script) {
            Ok(sink) => sink,
            Err(source) => {
                self.shared.state.send_replace(SessionState::Idle);
                announce.push(Event::SessionState(SessionState::Idle));
                self.shared.publish_all(announce);
                return Err(SessionError::LogFile {
                    path: self.log_root.clone(),
                    source,
                });
            }
        };
        let log_path = sink.path().to_path_buf();
        *lock(&self.shared.sink) = Some(sink);
        lock(&self.shared.run).log_path = Some(log_path.clone());
        let running = LogLine::info(format!("Running: {}", request.display_command()));
        self.shared.record(&running);
        announce.push(Event::Output(running));

        let mut child = match spawn_child(request) {
            Ok(child) => child,
            Err(source) => {
                let program = request.executable.display().to_string();
                warn!(%program, error = %source, "failed to spawn script");
                let failed = LogLine::info(format!("Failed to start {}: {}", program, source));
                self.shared.record(&failed);
                self.shared.close_sink();
                self.shared.state.send_replace(SessionState::Idle);
                announce.push(Event::Output(failed));
                announce.push(Event::SessionState(SessionState::Idle));
                self.shared.publish_all(announce);
                return Err(SessionError::Spawn { program, source });
            }
        };

        let pid = child.id().unwrap_or(0);
        *self.shared.stdin.lock().await = child.stdin.take();
        let (terminate_tx, terminate_rx) = oneshot::channel();
        {
            let mut run = lock(&self.shared.run);
            run.pid = Some(pid);
            run.terminate = Some(terminate_tx);
        }
        info!(pid, script = %request.script.display(), "script started");
        self.shared.state.send_replace(SessionState::Running);
        announce.push(Event::SessionStarted { pid });
        announce.push(Event::SessionState(SessionState::Running));

        let shared = self.shared.clone();
        self.shared
            .spawn_ordered(supervise(shared, child, terminate_rx, announce));

        Ok(StartedRun { pid, log_path })
    }

    /// Writes `text` plus a newline to the child's stdin.
    ///
    /// Does nothing when no child is running. A closed pipe is not an error.
    pub async fn send_input(&self, text: &str) -> Result<(), SessionError> {
        if self.state() != SessionState::Running {
            return Ok(());
        }
        let mut stdin = self.shared.stdin.lock().await;
        let Some(pipe) = stdin.as_mut() else {
            return Ok(());
        };
        let mut payload = String::with_capacity(text.len() + 1);
        payload.push_str(text);
        payload.push('\n');
        let written = async {
            pipe.write_all(payload.as_bytes()).await?;
            pipe.flush().await
        }
        .await;
        match written {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                debug!("child closed stdin; dropping input");
                *stdin = None;
                Ok(())
            }
            Err(err) => Err(SessionError::Input(err)),
        }
    }

    /// Asks the running child to terminate. Returns without waiting for exit.
    ///
    /// The exit watch signals the child and logs the interrupt. Calling this while
    /// idle, or a second time for the same run, does nothing.
    pub fn terminate(&self) {
        if self.state() != SessionState::Running {
            return;
        }
        let sender = {
            let mut run = lock(&self.shared.run);
            let Some(sender) = run.terminate.take() else {
                return;
            };
            run.terminating = true;
            sender
        };
        if sender.send(()).is_err() {
            debug!("exit watch finished before termination request");
        }
    }

    /// Waits until the session is idle. Returns `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut state = self.shared.state.subscribe();
        let idle = tokio::time::timeout(
            timeout,
            state.wait_for(|state| *state == SessionState::Idle),
        )
        .await;
        matches!(idle, Ok(Ok(_)))
    }
}

impl Shared {
    async fn publish(&self, event: Event) {
        let _ = self.events.send(event).await;
    }

    /// Runs `task` after every previously spawned publishing task has finished.
    fn spawn_ordered<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tail = lock(&self.tail);
        let previous = tail.take();
        *tail = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            task.await;
        }));
    }

    fn publish_all(self: &Arc<Self>, events: Vec<Event>) {
        let shared = self.clone();
        self.spawn_ordered(async move {
            for event in events {
                shared.publish(event).await;
            }
        });
    }

    async fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
        self.publish(Event::SessionState(state)).await;
    }

    fn record(&self, line: &LogLine) {
        let mut sink = lock(&self.sink);
        if let Some(sink) = sink.as_mut() {
            if let Err(err) = sink.write(line) {
                warn!(path = %sink.path().display(), error = %err, "failed to write transcript");
            }
        }
    }

    // Transcript first, then display, so the two never disagree.
    async fn emit(&self, line: LogLine) {
        self.record(&line);
        self.publish(Event::Output(line)).await;
    }

    fn close_sink(&self) {
        if let Some(mut sink) = lock(&self.sink).take() {
            sink.close();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn spawn_child(request: &LaunchRequest) -> io::Result<Child> {
    let command_line = request.command();
    let Some((program, args)) = command_line.split_first() else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command line"));
    };
    let mut command = Command::new(program);
    command.args(args);
    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command.kill_on_drop(true);

    #[cfg(unix)]
    unsafe {
        command.pre_exec(|| {
            let _ = libc::setpgid(0, 0);
            Ok(())
        });
    }

    command.spawn()
}

/// Drains one pipe until it closes.
///
/// Once the child has exited the pipe may still be held open by processes it
/// left behind, so the reader gives up after `DRAIN_GRACE` without new output.
async fn read_stream<R>(
    shared: Arc<Shared>,
    stream: StreamKind,
    reader: R,
    mut exited: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = LineReader::new(reader);
    let mut child_gone = false;
    loop {
        let next = if child_gone {
            match tokio::time::timeout(DRAIN_GRACE, lines.next_line()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(?stream, "script output still open after exit; closing reader");
                    break;
                }
            }
        } else {
            tokio::select! {
                next = lines.next_line() => next,
                _ = exited.wait_for(|done| *done) => {
                    child_gone = true;
                    continue;
                }
            }
        };
        match next {
            Ok(Some(text)) => shared.emit(LogLine::new(text, stream)).await,
            Ok(None) => break,
            Err(err) => {
                warn!(?stream, error = %err, "failed to read script output");
                break;
            }
        }
    }
}

/// Publishes the start events, drains the pipes and reports the exit.
async fn supervise(
    shared: Arc<Shared>,
    mut child: Child,
    mut terminate: oneshot::Receiver<()>,
    announce: Vec<Event>,
) {
    for event in announce {
        shared.publish(event).await;
    }

    let (exited_tx, exited_rx) = watch::channel(false);
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(read_stream(
            shared.clone(),
            StreamKind::Stdout,
            stdout,
            exited_rx.clone(),
        )));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(read_stream(
            shared.clone(),
            StreamKind::Stderr,
            stderr,
            exited_rx,
        )));
    }

    let mut armed = true;
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            request = &mut terminate, if armed => {
                armed = false;
                if request.is_ok() {
                    let notice = LogLine::info(INTERRUPT_NOTICE);
                    shared.record(&notice);
                    signal_child(&mut child);
                    shared.publish(Event::Output(notice)).await;
                }
            }
        }
    };
    if armed && terminate.try_recv().is_ok() {
        shared.emit(LogLine::info(INTERRUPT_NOTICE)).await;
    }

    exited_tx.send_replace(true);
    shared.set_state(SessionState::Exiting).await;
    for reader in readers {
        if let Err(err) = reader.await {
            warn!(error = %err, "output reader failed");
        }
    }

    let (code, summary) = match &status {
        Ok(status) => (status.code(), describe_exit(status)),
        Err(err) => {
            warn!(error = %err, "failed to wait for script");
            (None, format!("status unavailable: {}", err))
        }
    };
    info!(?code, "script finished");
    shared
        .emit(LogLine::info(format!("=== SCRIPT FINISHED ({}) ===", summary)))
        .await;
    shared.close_sink();
    *shared.stdin.lock().await = None;
    {
        let mut run = lock(&shared.run);
        run.exit_code = code;
        run.pid = None;
        run.terminate = None;
        run.terminating = false;
    }
    shared.set_state(SessionState::Idle).await;
    shared.publish(Event::SessionExited { code }).await;
}

fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal {}", signal);
        }
    }
    "exit code unknown".to_string()
}

#[cfg(unix)]
fn signal_child(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    debug!(pid, "sending SIGTERM");
    let pid = pid as i32;
    unsafe {
        let _ = libc::kill(-pid, libc::SIGTERM);
        let _ = libc::kill(pid, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn signal_child(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        warn!(error = %err, "failed to terminate script");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::Path;

    use super::*;

    const WAIT: Duration = Duration::from_secs(15);

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let folder = dir.join("scripts");
        std::fs::create_dir_all(&folder).unwrap();
        let path = folder.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn sh(script: PathBuf) -> LaunchRequest {
        LaunchRequest {
            executable: PathBuf::from("sh"),
            script,
            arguments: Vec::new(),
            cwd: None,
        }
    }

    fn session(dir: &Path) -> (ProcessSession, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(256);
        (ProcessSession::new(dir.join("logs"), tx), rx)
    }

    async fn until(rx: &mut mpsc::Receiver<Event>, mut done: impl FnMut(&Event) -> bool) -> Vec<Event> {
        let mut events = Vec::new();
        tokio::time::timeout(WAIT, async {
            while let Some(event) = rx.recv().await {
                let stop = done(&event);
                events.push(event);
                if stop {
                    break;
                }
            }
        })
        .await
        .expect("timed out waiting for session events");
        events
    }

    async fn until_exit(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
        until(rx, |event| matches!(event, Event::SessionExited { .. })).await
    }

    fn states(events: &[Event]) -> Vec<SessionState> {
        events
            .iter()
            .filter_map(|event| match event {
                Event::SessionState(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    fn output(events: &[Event]) -> Vec<LogLine> {
        events
            .iter()
            .filter_map(|event| match event {
                Event::Output(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn run_walks_lifecycle_and_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "emit.sh",
            "echo out-1\necho err-1 >&2\necho out-2\nexit 3\n",
        );
        let (session, mut rx) = session(dir.path());

        let started = session.start(&sh(script)).await.unwrap();
        let events = until_exit(&mut rx).await;

        assert_eq!(
            states(&events),
            vec![
                SessionState::Starting,
                SessionState::Running,
                SessionState::Exiting,
                SessionState::Idle
            ]
        );
        assert!(matches!(events.last(), Some(Event::SessionExited { code: Some(3) })));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.exit_code(), Some(3));
        assert_eq!(session.pid(), None);

        let lines = output(&events);
        let stdout = lines
            .iter()
            .filter(|line| line.stream == StreamKind::Stdout)
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>();
        assert_eq!(stdout, vec!["out-1", "out-2"]);
        assert!(lines
            .iter()
            .any(|line| line.stream == StreamKind::Stderr && line.text == "err-1"));

        let transcript = std::fs::read_to_string(&started.log_path).unwrap();
        let mut logged = transcript
            .lines()
            .map(|line| line[11..].to_string())
            .collect::<Vec<_>>();
        let mut shown = lines.iter().map(|line| line.text.clone()).collect::<Vec<_>>();
        assert!(logged[0].starts_with("Running: sh -u "));
        assert_eq!(
            logged.last().map(String::as_str),
            Some("=== SCRIPT FINISHED (exit code 3) ===")
        );
        logged.sort();
        shown.sort();
        assert_eq!(logged, shown);
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "ask.sh", "read name\necho \"hello $name\"\n");
        let (session, mut rx) = session(dir.path());

        session.start(&sh(script.clone())).await.unwrap();
        let second = session.start(&sh(script)).await;
        assert!(matches!(second, Err(SessionError::AlreadyRunning)));

        session.send_input("deck").await.unwrap();
        let events = until_exit(&mut rx).await;
        assert!(output(&events).iter().any(|line| line.text == "hello deck"));
        assert_eq!(session.exit_code(), Some(0));
        assert_eq!(
            states(&events)
                .iter()
                .filter(|state| **state == SessionState::Starting)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn input_and_terminate_are_noops_when_idle() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "quick.sh", "echo done\n");
        let (session, mut rx) = session(dir.path());

        session.send_input("nobody listening").await.unwrap();
        session.terminate();
        assert_eq!(session.state(), SessionState::Idle);

        session.start(&sh(script)).await.unwrap();
        until_exit(&mut rx).await;
        session.send_input("too late").await.unwrap();
        session.terminate();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn terminate_signals_child_and_exit_watch_reports() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "sleepy.sh", "echo ready\nsleep 30\n");
        let (session, mut rx) = session(dir.path());

        session.start(&sh(script)).await.unwrap();
        until(&mut rx, |event| {
            matches!(event, Event::Output(line) if line.text == "ready")
        })
        .await;

        session.terminate();
        assert!(session.is_terminating());
        assert_eq!(session.state(), SessionState::Running);
        session.terminate();

        let events = until_exit(&mut rx).await;
        let lines = output(&events);
        assert_eq!(
            lines
                .iter()
                .filter(|line| line.text.starts_with("User interrupt"))
                .count(),
            1
        );
        assert!(matches!(events.last(), Some(Event::SessionExited { code: None })));
        assert!(lines
            .iter()
            .any(|line| line.text == "=== SCRIPT FINISHED (signal 15) ==="));

        session.terminate();
        assert!(!session.is_terminating());
        assert!(session.wait_idle(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn spawn_failure_closes_transcript_and_returns_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "never.sh", "echo unreachable\n");
        let (session, mut rx) = session(dir.path());
        let request = LaunchRequest {
            executable: dir.path().join("missing-interpreter"),
            script,
            arguments: Vec::new(),
            cwd: None,
        };

        let result = session.start(&request).await;
        assert!(matches!(result, Err(SessionError::Spawn { .. })));
        assert_eq!(session.state(), SessionState::Idle);

        let events = until(&mut rx, |event| {
            matches!(event, Event::SessionState(SessionState::Idle))
        })
        .await;
        assert_eq!(states(&events), vec![SessionState::Starting, SessionState::Idle]);

        let log_path = session.log_path().unwrap();
        let transcript = std::fs::read_to_string(log_path).unwrap();
        assert!(transcript.contains("Running: "));
        assert!(transcript.contains("Failed to start"));
    }

    #[tokio::test]
    async fn arguments_reach_the_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "args.sh", "for a in \"$@\"; do echo \"[$a]\"; done\n");
        let (session, mut rx) = session(dir.path());
        let mut request = sh(script);
        request.arguments = vec!["--port".into(), "80 80".into(), "--debug".into()];

        session.start(&request).await.unwrap();
        let events = until_exit(&mut rx).await;
        let stdout = output(&events)
            .into_iter()
            .filter(|line| line.stream == StreamKind::Stdout)
            .map(|line| line.text)
            .collect::<Vec<_>>();
        assert_eq!(stdout, vec!["[--port]", "[80 80]", "[--debug]"]);
    }

    #[tokio::test]
    async fn flooding_child_cannot_stall_start_or_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "flood.sh", "while true; do echo spam; done\n");
        let (tx, mut rx) = mpsc::channel(1);
        let session = ProcessSession::new(dir.path().join("logs"), tx);

        let started = tokio::time::timeout(Duration::from_secs(5), session.start(&sh(script)))
            .await
            .expect("start waited on the event consumer")
            .unwrap();
        until(&mut rx, |event| {
            matches!(event, Event::Output(line) if line.text == "spam")
        })
        .await;
        // Let the readers fill the channel again before asking to stop.
        tokio::time::sleep(Duration::from_millis(100)).await;

        session.terminate();
        assert!(session.is_terminating());

        let events = until_exit(&mut rx).await;
        assert!(matches!(events.last(), Some(Event::SessionExited { code: None })));
        let lines = output(&events);
        assert_eq!(
            lines
                .iter()
                .filter(|line| line.text == INTERRUPT_NOTICE)
                .count(),
            1
        );

        let transcript = std::fs::read_to_string(&started.log_path).unwrap();
        assert!(transcript.contains(INTERRUPT_NOTICE));
        assert!(transcript
            .trim_end()
            .ends_with("=== SCRIPT FINISHED (signal 15) ==="));
    }

    #[tokio::test]
    async fn burst_before_exit_reaches_slow_consumer_and_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "burst.sh",
            "i=0\nwhile [ $i -lt 2000 ]; do echo line-$i; i=$((i+1)); done\n",
        );
        let (session, mut rx) = session(dir.path());

        let started = session.start(&sh(script)).await.unwrap();
        let mut events = Vec::new();
        tokio::time::timeout(Duration::from_secs(60), async {
            while let Some(event) = rx.recv().await {
                let done = matches!(event, Event::SessionExited { .. });
                events.push(event);
                if done {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("timed out draining a slow consumer");

        let expected = (0..2000).map(|i| format!("line-{}", i)).collect::<Vec<_>>();
        let shown = output(&events)
            .into_iter()
            .filter(|line| line.stream == StreamKind::Stdout)
            .map(|line| line.text)
            .collect::<Vec<_>>();
        assert_eq!(shown, expected);

        let transcript = std::fs::read_to_string(&started.log_path).unwrap();
        let logged = transcript
            .lines()
            .map(|line| &line[11..])
            .filter(|text| text.starts_with("line-"))
            .collect::<Vec<_>>();
        assert_eq!(logged, expected);
        assert!(transcript
            .trim_end()
            .ends_with("=== SCRIPT FINISHED (exit code 0) ==="));
    }

    #[tokio::test]
    async fn leftover_background_process_does_not_hold_the_run_open() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "detach.sh", "echo start\nsleep 8 &\necho end\n");
        let (session, mut rx) = session(dir.path());

        let began = std::time::Instant::now();
        session.start(&sh(script)).await.unwrap();
        let events = until_exit(&mut rx).await;

        assert!(began.elapsed() < Duration::from_secs(6));
        assert!(matches!(events.last(), Some(Event::SessionExited { code: Some(0) })));
        let lines = output(&events);
        assert!(lines.iter().any(|line| line.text == "end"));
        assert!(lines
            .iter()
            .any(|line| line.text == "=== SCRIPT FINISHED (exit code 0) ==="));
    }
}
