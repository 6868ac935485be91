mod config;
mod core;
mod i18n;
mod plugins;

use anyhow::{anyhow, Context};
use clap::{Arg, ArgAction, ArgMatches, Command};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::core::cleanup::CleanupService;
use crate::core::controller::SessionController;
use crate::core::error::SessionError;
use crate::core::events::{ChannelDispatcher, UiEvent};
use crate::core::model::{FetchMode, QualityTier, SessionId, SessionState};
use crate::i18n::{get_messages, Messages};
use crate::plugins::notify::LogNotifier;
use crate::plugins::registry::{EngineContext, EngineRegistry, FetchCliConfig, SimulateSettings, YtDlpSettings};
use crate::plugins::storage::ModeDirStorage;

fn build_cli(registry: &EngineRegistry) -> Command {
    let fetch = Command::new("fetch")
        .about("Fetch a video or playlist as audio or video")
        .arg(Arg::new("url").help("Video or playlist URL").required(true).num_args(1))
        .arg(
            Arg::new("audio")
                .long("audio")
                .help("Audio only")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quality")
                .long("quality")
                .help("max, or a height: 2160, 1440, 1080, 720, 480, 360 (ignored with --audio)")
                .default_value("max")
                .num_args(1),
        )
        .arg(
            Arg::new("out_dir")
                .long("out-dir")
                .help("Base output directory; files land in <dir>/audio or <dir>/video")
                .num_args(1),
        )
        .arg(
            Arg::new("engine")
                .long("engine")
                .help("Fetch engine")
                .value_parser(registry.names())
                .default_value("ytdlp")
                .num_args(1),
        );
    let fetch = registry.augment_fetch_command(fetch);

    let purge = Command::new("purge")
        .about("Delete partial download artifacts from a directory")
        .arg(Arg::new("dir").help("Directory to clean").required(true).num_args(1));

    Command::new("tubesession")
        .about("Single-session media fetcher with pause, resume and cancel")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .help("JSON config file")
                .global(true)
                .num_args(1),
        )
        .arg(
            Arg::new("locale")
                .long("locale")
                .help("UI language: en, zh")
                .global(true)
                .num_args(1),
        )
        .arg(
            Arg::new("log_level")
                .long("log-level")
                .help("Log filter, e.g. info or tubesession=debug (RUST_LOG wins)")
                .default_value("warn")
                .global(true)
                .num_args(1),
        )
        .subcommand(fetch)
        .subcommand(purge)
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let registry = EngineRegistry::with_defaults();
    let matches = build_cli(&registry).get_matches();

    let level = matches.get_one::<String>("log_level").map(String::as_str).unwrap_or("warn");
    init_tracing(level);

    let mut config = AppConfig::load(matches.get_one::<String>("config").map(Path::new))?;
    if let Some(l) = matches.get_one::<String>("locale") {
        config.locale = l.clone();
    }

    match matches.subcommand() {
        Some(("fetch", m)) => run_fetch(&registry, config, m).await,
        Some(("purge", m)) => {
            let dir = m.get_one::<String>("dir").map(PathBuf::from).context("missing dir")?;
            let removed = CleanupService::new(config.partial_suffixes.clone()).purge(&dir).await;
            println!("Removed {} partial file(s) from {}", removed, dir.display());
            Ok(ExitCode::SUCCESS)
        }
        _ => Ok(ExitCode::SUCCESS),
    }
}

async fn run_fetch(registry: &EngineRegistry, mut config: AppConfig, m: &ArgMatches) -> anyhow::Result<ExitCode> {
    if let Some(dir) = m.get_one::<String>("out_dir") {
        config.out_dir = PathBuf::from(dir);
    }
    let url = m.get_one::<String>("url").context("missing url")?.clone();
    let mode = if m.get_flag("audio") { FetchMode::Audio } else { FetchMode::Video };
    let quality_raw = m.get_one::<String>("quality").map(String::as_str).unwrap_or("max");
    let quality = QualityTier::parse(quality_raw).ok_or_else(|| anyhow!("unsupported quality: {}", quality_raw))?;
    let engine_name = m.get_one::<String>("engine").map(String::as_str).unwrap_or("ytdlp");
    let engine = registry
        .engine(engine_name)
        .ok_or_else(|| anyhow!("unknown engine: {}", engine_name))?;

    let mut cfg = FetchCliConfig {
        config,
        ytdlp: YtDlpSettings::default(),
        simulate: SimulateSettings::default(),
    };
    registry.apply_fetch_matches(m, &mut cfg)?;

    let config = Arc::new(cfg.config);
    let msgs = get_messages(config.locale());
    let storage = Arc::new(ModeDirStorage::new(config.out_dir.clone()));
    let ctx = EngineContext { config, ytdlp: cfg.ytdlp, simulate: cfg.simulate };

    let (dispatcher, mut events) = ChannelDispatcher::new(Handle::current());
    let controller = SessionController::new(ctx, engine, Arc::new(dispatcher), storage, Handle::current())
        .with_notifier(Arc::new(LogNotifier::new()));

    let session = match controller.start(&url, mode, quality) {
        Ok(id) => id,
        Err(SessionError::Validation(detail)) => {
            eprintln!("{} ({})", msgs.invalid_url, detail);
            return Ok(ExitCode::from(2));
        }
        Err(SessionError::Busy) => {
            eprintln!("{}", msgs.busy);
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => {
            eprintln!("{}: {}", msgs.failed_prefix, e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut commands = spawn_stdin_reader();
    let mut ui = FetchView::new(session, msgs)?;
    ui.bar.println(msgs.controls_hint);

    loop {
        tokio::select! {
            Some(evt) = events.recv() => {
                if ui.apply(evt) {
                    break;
                }
            }
            Some(line) = commands.recv() => {
                match line.trim() {
                    "p" | "pause" => { controller.pause(); }
                    "r" | "resume" => { controller.resume(); }
                    "c" | "cancel" | "q" | "quit" => { controller.cancel(); }
                    "" => {}
                    other => ui.bar.println(format!("? {}", other)),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                controller.cancel();
            }
        }
    }

    // Cancelled sessions finish cleanup before the process exits.
    let state = controller.wait_terminal(Duration::from_secs(10)).await;
    controller.acknowledge();
    Ok(match state {
        Some(SessionState::Failed) | None => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

/// Lines from stdin. A plain thread, so a blocked read never holds up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Terminal rendering of one session.
struct FetchView {
    session: SessionId,
    msgs: &'static Messages,
    bar: ProgressBar,
    sty_spin: ProgressStyle,
    sty_bar: ProgressStyle,
    state: SessionState,
    detail: String,
}

impl FetchView {
    fn new(session: SessionId, msgs: &'static Messages) -> anyhow::Result<Self> {
        let sty_spin = ProgressStyle::with_template("{spinner:.green} {prefix} {wide_msg}")?.tick_chars("|/-\\ ");
        let sty_bar = ProgressStyle::with_template("{prefix} {bar:40.cyan/blue} {percent:>3}% {wide_msg}")?;
        let bar = ProgressBar::new_spinner();
        bar.set_style(sty_spin.clone());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message(msgs.resolving);
        Ok(Self {
            session,
            msgs,
            bar,
            sty_spin,
            sty_bar,
            state: SessionState::Resolving,
            detail: String::new(),
        })
    }

    /// Returns true once the session is over and its outcome printed.
    fn apply(&mut self, evt: UiEvent) -> bool {
        match evt {
            UiEvent::StateChanged { session, state } if session == self.session => {
                self.state = state;
                match state {
                    SessionState::Paused => self.bar.set_message(format!("{} | {}", self.msgs.paused, self.detail)),
                    SessionState::Cancelling => self.bar.set_message(self.msgs.cancelling),
                    SessionState::Active => self.bar.set_message(self.detail.clone()),
                    SessionState::Cancelled => {
                        self.bar.finish_with_message(self.msgs.cancelled);
                        return true;
                    }
                    _ => {}
                }
            }
            UiEvent::Progress { session, snapshot } if session == self.session => {
                let Some(s) = snapshot.take() else { return false };
                let name = s.current_item_name.clone().unwrap_or_default();
                self.detail = format!("{} | {} | {}", s.size_text(), s.speed_text(), name);
                if s.is_indeterminate() {
                    self.bar.set_style(self.sty_spin.clone());
                } else {
                    if self.bar.length() != Some(10_000) {
                        self.bar.set_style(self.sty_bar.clone());
                        self.bar.set_length(10_000);
                    }
                    self.bar.set_position((s.percent * 100.0) as u64);
                }
                if self.state != SessionState::Paused {
                    self.bar.set_message(self.detail.clone());
                }
            }
            UiEvent::Items { session, items } if session == self.session => {
                if let Some(items) = items.take() {
                    if items.total > 1 {
                        self.bar.set_prefix(format!("[{} {}/{}]", self.msgs.items_label, items.index, items.total));
                    }
                }
            }
            UiEvent::Succeeded { session, message } if session == self.session => {
                self.bar.finish_with_message(message);
                return true;
            }
            UiEvent::Failed { session, message } if session == self.session => {
                self.bar.abandon_with_message(message);
                return true;
            }
            _ => {}
        }
        false
    }
}
