//! scriptdeck: a terminal launcher for catalogued scripts.
//!
//! This is the entry point of the application. It parses command-line arguments,
//! loads configuration, and either runs the TUI event loop or one of the
//! headless subcommands.

mod app;
mod catalog;
mod config;
mod events;
mod extract;
mod launch;
mod logging;
mod output;
mod process;
mod runner;
mod stream;
mod transcript;
mod tui;
mod watch;

use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::{App, AppAction};
use crate::catalog::{Catalog, CatalogError, ScriptFilter, ScriptFolder};
use crate::config::Settings;
use crate::events::Event;
use crate::output::format_terminal_line;
use crate::runner::{ProcessSession, SessionError};
use crate::watch::FolderWatcher;

/// How long quitting waits for a running script to exit after SIGTERM.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "scriptdeck",
    version,
    about = "Terminal launcher for catalogued scripts",
    styles = help_styles(),
    color = clap::ColorChoice::Always,
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Directory holding settings.toml and script_folders.toml.
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    /// Root directory for run transcripts (overrides settings.toml).
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a script without the TUI, streaming its output to stdout.
    Run {
        /// Catalog folder name.
        folder: String,
        /// Script file name or stem within the folder.
        script: String,
        /// Tokens passed to the script after `--`.
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Print the arguments a script registers.
    Args {
        script: PathBuf,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Manage the script folder catalog.
    Folders {
        #[command(subcommand)]
        command: FolderCommand,
    },
    /// Show help information.
    Help,
    /// Show version information.
    Version,
}

#[derive(Debug, Subcommand)]
enum FolderCommand {
    /// List catalog folders.
    List,
    /// Add a folder to the catalog.
    Add {
        name: String,
        path: PathBuf,
        /// Interpreter (default: python3).
        #[arg(long)]
        executable: Option<PathBuf>,
        /// Working directory for runs (default: the folder itself).
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// File name glob (default: *.py).
        #[arg(long)]
        pattern: Option<String>,
        /// File name prefix to hide; repeatable (default: __).
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },
    /// Remove a folder from the catalog.
    Remove { name: String },
    /// Replace the catalog with the default one.
    RestoreDefault,
}

/// Resolved directories and settings for one invocation.
struct Environment {
    config_dir: PathBuf,
    settings: Settings,
    log_root: PathBuf,
}

impl Environment {
    fn load(cli: &Cli) -> Result<Self> {
        let config_dir = config::config_dir(cli.config_dir.as_deref())?;
        let settings = config::load_or_init(&config_dir)?;
        let log_root = cli
            .log_dir
            .clone()
            .unwrap_or_else(|| settings.log_root(&config_dir));
        Ok(Self {
            config_dir,
            settings,
            log_root,
        })
    }

    fn sweep_logs(&self) {
        let removed =
            transcript::cleanup_old_logs(&self.log_root, self.settings.logging.retention_days);
        if removed > 0 {
            info!(removed, "deleted old logs");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Some(Commands::Help) => {
            Cli::command().print_help()?;
            println!();
            return Ok(());
        }
        Some(Commands::Version) => {
            println!("scriptdeck {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    let env = Environment::load(&cli)?;
    let log_guard = logging::init(&env.log_root)?;
    debug!(path = %log_guard.path.display(), "diagnostics log");

    match cli.command {
        Some(Commands::Run {
            folder,
            script,
            args,
        }) => {
            env.sweep_logs();
            let code = run_headless(&env, &folder, &script, args).await?;
            drop(log_guard);
            std::process::exit(code);
        }
        Some(Commands::Args { script, json }) => print_arguments(&script, json),
        Some(Commands::Folders { command }) => manage_folders(&env, command),
        Some(Commands::Help) | Some(Commands::Version) => Ok(()),
        None => {
            env.sweep_logs();
            run_tui(&env).await
        }
    }
}

async fn run_tui(env: &Environment) -> Result<()> {
    let catalog = Catalog::load(&env.config_dir)?;
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let session = ProcessSession::new(env.log_root.clone(), event_tx.clone());
    let names = catalog
        .folders()
        .iter()
        .map(|folder| folder.name.clone())
        .collect();
    let mut app = App::new(names, env.settings.ui.max_lines, env.settings.ui.symbols);
    let mut watcher = None;
    select_folder(&catalog, &mut app, &mut watcher, &event_tx);

    let mut terminal = tui::init_terminal()?;
    spawn_input_listener(event_tx.clone());
    spawn_signal_listener(event_tx.clone());

    let mut ticker = tokio::time::interval(Duration::from_millis(150));
    let mut result = Ok(());

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    Event::SessionState(state) => app.on_session_state(state),
                    Event::SessionStarted { pid } => app.on_session_started(pid, session.log_path()),
                    Event::Output(line) => app.on_output(line),
                    Event::SessionExited { code } => app.on_session_exited(code),
                    Event::ScriptsChanged => refresh_scripts(&catalog, &mut app),
                    Event::Interrupt => {
                        session.terminate();
                        app.should_quit = true;
                    }
                    Event::Key(key) => {
                        let action = app.handle_key(key);
                        handle_app_action(action, &mut app, &catalog, &session, &mut watcher, &event_tx)
                            .await;
                    }
                    Event::Resize { .. } => {
                        let _ = terminal.autoresize();
                    }
                    Event::Stdin(_) => {}
                }
            }
            _ = ticker.tick() => {}
        }

        if let Err(err) = tui::draw(&mut app, &mut terminal) {
            result = Err(err.into());
            break;
        }
        if app.should_quit {
            break;
        }
    }

    if session.state().is_active() {
        session.terminate();
        let drain = async { while event_rx.recv().await.is_some() {} };
        tokio::select! {
            idle = session.wait_idle(SHUTDOWN_GRACE) => {
                if !idle {
                    warn!("script still running at exit; killing it");
                }
            }
            _ = drain => {}
        }
    }
    tui::restore_terminal(terminal)?;
    result
}

async fn handle_app_action(
    action: AppAction,
    app: &mut App,
    catalog: &Catalog,
    session: &ProcessSession,
    watcher: &mut Option<FolderWatcher>,
    event_tx: &mpsc::Sender<Event>,
) {
    match action {
        AppAction::Run => {
            let folder = app.selected_folder().and_then(|name| catalog.folder(name));
            let (Some(folder), Some((script, arguments))) = (folder, app.run_target()) else {
                app.set_status_warning_for("No script selected", Duration::from_secs(2));
                return;
            };
            let request = catalog.launch_request(folder, script, arguments);
            match session.start(&request).await {
                Ok(started) => debug!(pid = started.pid, "run started from TUI"),
                Err(SessionError::AlreadyRunning) => {
                    app.set_status_warning_for("A script is already running", Duration::from_secs(3))
                }
                Err(err) => app.set_status_warning_for(err.to_string(), Duration::from_secs(5)),
            }
        }
        AppAction::Terminate => {
            if session.is_terminating() {
                app.set_status_message("Termination already requested");
            } else if session.state().is_active() {
                debug!(pid = ?session.pid(), "terminating script");
                session.terminate();
            } else {
                app.set_status_message("No script running");
            }
        }
        AppAction::SendInput(text) => {
            if !session.state().is_active() {
                app.set_status_message("No script running");
                return;
            }
            if let Err(err) = session.send_input(&text).await {
                warn!(error = %err, "input forwarding failed");
                app.set_status_warning_for(err.to_string(), Duration::from_secs(3));
            }
        }
        AppAction::SelectFolder(_) => select_folder(catalog, app, watcher, event_tx),
        AppAction::LoadArguments(script) => match extract::extract_file(&script) {
            Ok(extracted) => app.load_arguments(script, extracted),
            Err(err) => app.set_status_warning_for(format!("{:#}", err), Duration::from_secs(5)),
        },
        AppAction::Quit | AppAction::None => {}
    }
}

/// Lists the selected folder's scripts and moves the watcher to it.
fn select_folder(
    catalog: &Catalog,
    app: &mut App,
    watcher: &mut Option<FolderWatcher>,
    event_tx: &mpsc::Sender<Event>,
) {
    *watcher = None;
    app.clear_arguments();
    refresh_scripts(catalog, app);
    let Some(folder) = app.selected_folder().and_then(|name| catalog.folder(name)) else {
        return;
    };
    let path = catalog.folder_path(folder);
    if !path.is_dir() {
        return;
    }
    let started = ScriptFilter::new(folder)
        .and_then(|filter| watch::watch_folder(path, filter, event_tx.clone()));
    match started {
        Ok(handle) => {
            debug!(path = %handle.path().display(), "watching script folder");
            *watcher = Some(handle);
        }
        Err(err) => warn!(folder = %folder.name, error = %err, "failed to watch folder"),
    }
}

fn refresh_scripts(catalog: &Catalog, app: &mut App) {
    let Some(folder) = app.selected_folder().and_then(|name| catalog.folder(name)) else {
        app.set_scripts(Vec::new());
        return;
    };
    match catalog.scripts(folder) {
        Ok(scripts) => app.set_scripts(scripts),
        Err(err) => {
            app.set_scripts(Vec::new());
            app.set_status_warning_persistent(format!("{:#}", err));
        }
    }
}

async fn run_headless(
    env: &Environment,
    folder_name: &str,
    script_name: &str,
    tokens: Vec<String>,
) -> Result<i32> {
    let catalog = Catalog::load(&env.config_dir)?;
    let folder = catalog
        .folder(folder_name)
        .ok_or_else(|| CatalogError::Unknown(folder_name.to_string()))?;
    let script = find_script(&catalog, folder, script_name)?;
    let request = catalog.launch_request(folder, script, tokens);

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let session = ProcessSession::new(env.log_root.clone(), event_tx.clone());
    let started = session.start(&request).await?;
    eprintln!("Logging to: {}", started.log_path.display());
    spawn_stdin_listener(event_tx.clone());
    spawn_signal_listener(event_tx.clone());

    let color = std::io::stdout().is_terminal();
    let mut stdout = std::io::stdout();
    while let Some(event) = event_rx.recv().await {
        match event {
            Event::Output(line) => {
                writeln!(stdout, "{}", format_terminal_line(&line, color))?;
                stdout.flush()?;
            }
            Event::Stdin(text) => {
                if let Err(err) = session.send_input(&text).await {
                    warn!(error = %err, "input forwarding failed");
                    eprintln!("{}", err);
                }
            }
            Event::Interrupt => session.terminate(),
            Event::SessionExited { .. } => break,
            _ => {}
        }
    }
    Ok(session.exit_code().unwrap_or(1))
}

/// Builds a catalog entry from `folders add` options. Runs start in the folder
/// itself unless another working directory is given.
fn new_folder(
    name: String,
    path: PathBuf,
    executable: Option<PathBuf>,
    cwd: Option<PathBuf>,
    pattern: Option<String>,
    exclude: Vec<String>,
) -> ScriptFolder {
    let mut folder = ScriptFolder::new(name, path);
    if let Some(executable) = executable {
        folder.executable = executable;
    }
    folder.cwd = Some(cwd.unwrap_or_else(|| folder.path.clone()));
    if let Some(pattern) = pattern {
        folder.file_extension = pattern;
    }
    if !exclude.is_empty() {
        folder.exclude_start = exclude;
    }
    folder
}

/// Finds `name` (file name or stem) among the folder's listed scripts.
fn find_script(catalog: &Catalog, folder: &ScriptFolder, name: &str) -> Result<PathBuf> {
    let scripts = catalog.scripts(folder)?;
    let by_name = scripts
        .iter()
        .find(|path| path.file_name().is_some_and(|file| file == name));
    let found = by_name.or_else(|| {
        scripts
            .iter()
            .find(|path| path.file_stem().is_some_and(|stem| stem == name))
    });
    match found {
        Some(path) => Ok(path.clone()),
        None => bail!("no script named {:?} in folder {:?}", name, folder.name),
    }
}

fn print_arguments(script: &Path, json: bool) -> Result<()> {
    let extracted = extract::extract_file(script)?;
    if json {
        let rendered =
            serde_json::to_string_pretty(&extracted).context("failed to render arguments")?;
        println!("{}", rendered);
        return Ok(());
    }
    if extracted.is_empty() {
        println!("No arguments found in {}", script.display());
        return Ok(());
    }
    for schema in extracted.iter() {
        println!("{}:", schema.name);
        for argument in &schema.arguments {
            let mut notes = Vec::new();
            if argument.required {
                notes.push("required".to_string());
            }
            if let Some(default) = &argument.default {
                notes.push(format!("default {}", default));
            }
            if let Some(action) = &argument.action {
                notes.push(action.clone());
            }
            if argument.arg_type != "str" {
                notes.push(argument.arg_type.clone());
            }
            let notes = if notes.is_empty() {
                String::new()
            } else {
                format!(" [{}]", notes.join(", "))
            };
            println!("  {:<24}{}{}", argument.name, argument.help, notes);
        }
    }
    Ok(())
}

fn manage_folders(env: &Environment, command: FolderCommand) -> Result<()> {
    let mut catalog = Catalog::load(&env.config_dir)?;
    match command {
        FolderCommand::List => {
            for folder in catalog.folders() {
                println!(
                    "{:<16} {}  ({}, {})",
                    folder.name,
                    catalog.folder_path(folder).display(),
                    folder.executable.display(),
                    folder.file_extension
                );
            }
            return Ok(());
        }
        FolderCommand::Add {
            name,
            path,
            executable,
            cwd,
            pattern,
            exclude,
        } => {
            let folder = new_folder(name, path, executable, cwd, pattern, exclude);
            ScriptFilter::new(&folder)?;
            let name = folder.name.clone();
            catalog.add(folder)?;
            println!("Added folder {}", name);
        }
        FolderCommand::Remove { name } => {
            catalog.remove(&name)?;
            println!("Removed folder {}", name);
        }
        FolderCommand::RestoreDefault => {
            catalog.restore_defaults();
            println!("Restored default folders");
        }
    }
    catalog.save()?;
    info!(path = %catalog.path().display(), "catalog updated");
    Ok(())
}

fn spawn_input_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || loop {
        if crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false) {
            let sent = match crossterm::event::read() {
                Ok(crossterm::event::Event::Key(key))
                    if key.kind == crossterm::event::KeyEventKind::Press =>
                {
                    tx.blocking_send(Event::Key(key))
                }
                Ok(crossterm::event::Event::Resize(width, height)) => {
                    tx.blocking_send(Event::Resize { width, height })
                }
                _ => Ok(()),
            };
            if sent.is_err() {
                break;
            }
        }
    });
}

fn spawn_signal_listener(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                if tx.send(Event::Interrupt).await.is_err() {
                    break;
                }
            }
        }
        #[cfg(not(unix))]
        {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(Event::Interrupt).await.is_err() {
                    break;
                }
            }
        }
    });
}

fn spawn_stdin_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.blocking_send(Event::Stdin(line)).is_err() {
                break;
            }
        }
    });
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
        .valid(Style::new().fg_color(Some(AnsiColor::Green.into())))
        .invalid(
            Style::new()
                .fg_color(Some(AnsiColor::Red.into()))
                .effects(Effects::BOLD),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_collects_tokens_after_separator() {
        let cli = Cli::try_parse_from([
            "scriptdeck",
            "--config-dir",
            "/tmp/deck",
            "run",
            "tools",
            "deploy",
            "--",
            "--port",
            "8080",
        ])
        .unwrap();
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/deck")));
        match cli.command {
            Some(Commands::Run {
                folder,
                script,
                args,
            }) => {
                assert_eq!(folder, "tools");
                assert_eq!(script, "deploy");
                assert_eq!(args, vec!["--port", "8080"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn folder_add_accepts_repeated_excludes() {
        let cli = Cli::try_parse_from([
            "scriptdeck",
            "folders",
            "add",
            "ops",
            "/srv/ops",
            "--exclude",
            "_",
            "--exclude",
            "test_",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Folders {
                command: FolderCommand::Add { name, exclude, .. },
            }) => {
                assert_eq!(name, "ops");
                assert_eq!(exclude, vec!["_", "test_"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn added_folder_runs_in_its_own_directory_by_default() {
        let folder = new_folder("ops".into(), PathBuf::from("/srv/ops"), None, None, None, Vec::new());
        assert_eq!(folder.cwd, Some(PathBuf::from("/srv/ops")));
        assert_eq!(folder.executable, PathBuf::from("python3"));
        assert_eq!(folder.exclude_start, vec!["__"]);

        let folder = new_folder(
            "ops".into(),
            PathBuf::from("/srv/ops"),
            Some(PathBuf::from("/usr/bin/python3.12")),
            Some(PathBuf::from("/tmp")),
            Some("*.pyw".into()),
            vec!["_".into()],
        );
        assert_eq!(folder.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(folder.file_extension, "*.pyw");
        assert_eq!(folder.exclude_start, vec!["_"]);
    }

    #[test]
    fn find_script_matches_name_then_stem() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = dir.path().join("scripts");
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(scripts.join("deploy.py"), "").unwrap();
        std::fs::write(scripts.join("backup.py"), "").unwrap();

        let catalog = Catalog::load(dir.path()).unwrap();
        let folder = catalog.folder("scripts").unwrap();
        assert_eq!(
            find_script(&catalog, folder, "deploy.py").unwrap(),
            scripts.join("deploy.py")
        );
        assert_eq!(
            find_script(&catalog, folder, "backup").unwrap(),
            scripts.join("backup.py")
        );
        assert!(find_script(&catalog, folder, "missing").is_err());
    }
}
