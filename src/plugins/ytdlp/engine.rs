use crate::core::error::FetchError;
use crate::core::gate::Checkpoint;
use crate::core::model::{FetchMode, FetchRequest, FetchSummary, QualityTier};
use crate::core::progress::RawProgress;
use crate::plugins::registry::{EngineContext, FetchEngine, YtDlpSettings};
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::collections::VecDeque;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

const PROGRESS_TAG: &str = "[tsprog]";
const PROGRESS_TEMPLATE: &str = "download:[tsprog]%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.filename)s";
const STDERR_TAIL: usize = 20;
/// How often a silent child is checked for cancellation.
const TICK: Duration = Duration::from_millis(100);
/// Stdout lines buffered ahead of the worker. Bounded, so a paused worker
/// eventually stalls the child on its pipe.
const LINE_BACKLOG: usize = 64;

pub struct YtDlpEngine;

impl YtDlpEngine {
    pub fn new() -> Self {
        Self
    }
}

impl FetchEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "ytdlp"
    }

    fn fetch(
        &self,
        request: &FetchRequest,
        ctx: &EngineContext,
        checkpoint: &Checkpoint,
    ) -> Result<FetchSummary, FetchError> {
        let bin = ctx
            .config
            .ytdlp()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| FetchError::ToolMissing { tool: "yt-dlp".to_string() })?;

        checkpoint.report(RawProgress::Resolving { title: None })?;
        let meta = fetch_metadata(&bin, request, &ctx.ytdlp, checkpoint)?;
        info!(title = ?meta.title, items = meta.item_count(), "resolved media");
        checkpoint.report(RawProgress::Resolving { title: meta.title.clone() })?;
        let total = meta.item_count();
        if total > 1 {
            checkpoint.report(RawProgress::ItemTotalKnown { total })?;
        }

        let mut cmd = command(&bin);
        cmd.args(download_args(request, &ctx.ytdlp));
        debug!(?cmd, "spawning yt-dlp download");
        let mut child = spawn(cmd)?;
        let stderr = drain_stderr(&mut child);
        let lines = stream_lines(&mut child);

        let plan = meta.stream_plan(request.mode);
        let mut streams = StreamTally::new(plan.clone());
        let mut files = Vec::new();
        let mut current_item = 1u32;
        let mut last_file: Option<String> = None;

        loop {
            let line = match lines.recv_timeout(TICK) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(c) = checkpoint.wait() {
                        kill(&mut child);
                        return Err(c.into());
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let event = if let Some(n) = parse_item_start(&line) {
                // A new playlist entry closes the previous one.
                if n > current_item {
                    current_item = n;
                    streams = StreamTally::new(plan.clone());
                    files.extend(last_file.as_deref().map(PathBuf::from));
                    Some(RawProgress::Finished { filename: last_file.take() })
                } else {
                    None
                }
            } else if let Some(path) = parse_destination(&line) {
                last_file = Some(path.to_string());
                None
            } else {
                parse_progress_line(&line).and_then(|p| match p {
                    Progress::Downloading { bytes_done, bytes_total, speed_bps, filename } => {
                        if let Some(f) = &filename {
                            last_file = Some(f.clone());
                        }
                        let (bytes_done, bytes_total) = streams.sample(bytes_done, bytes_total);
                        Some(RawProgress::Downloading { bytes_done, bytes_total, speed_bps, filename })
                    }
                    // Per stream, not per item: a merged video finishes twice.
                    Progress::StreamFinished => {
                        streams.stream_finished();
                        None
                    }
                })
            };

            if let Some(event) = event {
                if let Err(c) = checkpoint.report(event) {
                    kill(&mut child);
                    return Err(c.into());
                }
            }
        }

        let status = child.wait().context("wait for yt-dlp")?;
        let tail = stderr.join().unwrap_or_default();
        if !status.success() {
            return Err(failure(status, &tail));
        }
        if let Some(f) = last_file {
            files.push(PathBuf::from(&f));
            checkpoint.report(RawProgress::Finished { filename: Some(f) })?;
        }
        Ok(FetchSummary { item_count: total.max(current_item), files })
    }
}

/// Builds a `Command` that does not pop a console window on Windows.
fn command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    configure_for_background(&mut cmd);
    cmd
}

#[cfg(windows)]
fn configure_for_background(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn configure_for_background(_cmd: &mut Command) {}

fn spawn(mut cmd: Command) -> Result<Child, FetchError> {
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FetchError::ToolMissing { tool: "yt-dlp".to_string() },
        _ => FetchError::Other(anyhow!("failed to start yt-dlp: {}", e)),
    })
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("kill yt-dlp: {}", e);
    }
    // Reap so no zombie outlives the session.
    let _ = child.wait();
}

/// Keeps the last few stderr lines for the failure message.
fn drain_stderr(child: &mut Child) -> JoinHandle<Vec<String>> {
    let stderr = child.stderr.take();
    thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL);
        if let Some(stderr) = stderr {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                if line.trim().is_empty() {
                    continue;
                }
                if line.starts_with("WARNING:") {
                    warn!("yt-dlp: {}", line);
                }
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
        Vec::from(tail)
    })
}

fn stream_lines(child: &mut Child) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::sync_channel(LINE_BACKLOG);
    if let Some(stdout) = child.stdout.take() {
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }
    rx
}

fn failure(status: ExitStatus, tail: &[String]) -> FetchError {
    let text = tail.join("\n");
    let lower = text.to_ascii_lowercase();
    if lower.contains("ffmpeg not found") || lower.contains("ffprobe and ffmpeg not found") {
        return FetchError::ToolMissing { tool: "ffmpeg".to_string() };
    }
    let last_error = tail
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| tail.last())
        .cloned()
        .unwrap_or_else(|| format!("yt-dlp exited with {}", status));
    FetchError::Engine(last_error)
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(rename = "_type")]
    kind: Option<String>,
    title: Option<String>,
    playlist_count: Option<u32>,
    #[serde(default)]
    entries: Vec<serde_json::Value>,
    /// Present when one item is fetched as separate streams (video + audio).
    requested_formats: Option<Vec<FormatInfo>>,
}

#[derive(Debug, Deserialize)]
struct FormatInfo {
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
}

impl FormatInfo {
    fn size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx).filter(|v| *v > 0.0).map(|v| v as u64)
    }
}

impl Metadata {
    /// Expected size of each stream of one item, `None` where unknown.
    /// Flat playlist entries carry no formats, so a video entry is assumed
    /// to be merged from two streams.
    fn stream_plan(&self, mode: FetchMode) -> Vec<Option<u64>> {
        match &self.requested_formats {
            Some(formats) if !formats.is_empty() => formats.iter().map(FormatInfo::size).collect(),
            _ if self.kind.as_deref() == Some("playlist") && mode == FetchMode::Video => vec![None, None],
            _ => vec![None],
        }
    }

    fn item_count(&self) -> u32 {
        if self.kind.as_deref() != Some("playlist") {
            return 1;
        }
        let listed = u32::try_from(self.entries.len()).unwrap_or(u32::MAX);
        self.playlist_count.unwrap_or(0).max(listed).max(1)
    }
}

fn fetch_metadata(
    bin: &std::path::Path,
    request: &FetchRequest,
    settings: &YtDlpSettings,
    checkpoint: &Checkpoint,
) -> Result<Metadata, FetchError> {
    let mut cmd = command(bin);
    cmd.args(["--flat-playlist", "--dump-single-json", "--no-warnings"]);
    cmd.arg("-f").arg(format_selector(request.mode, request.quality));
    if let Some(c) = &settings.cookies {
        cmd.arg("--cookies").arg(c);
    }
    cmd.arg(&request.url);
    debug!(?cmd, "spawning yt-dlp metadata query");

    let mut child = spawn(cmd)?;
    let stderr = drain_stderr(&mut child);
    let mut stdout = child.stdout.take();
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(out) = stdout.as_mut() {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });

    let status = loop {
        if let Some(status) = child.try_wait().context("poll yt-dlp")? {
            break status;
        }
        if let Err(c) = checkpoint.idle(TICK) {
            kill(&mut child);
            return Err(c.into());
        }
    };
    let out = reader.join().unwrap_or_default();
    let tail = stderr.join().unwrap_or_default();
    if !status.success() {
        return Err(failure(status, &tail));
    }
    serde_json::from_slice(&out)
        .context("parse yt-dlp metadata")
        .map_err(FetchError::from)
}

/// `-f` argument for the mode and quality.
fn format_selector(mode: FetchMode, quality: QualityTier) -> String {
    match (mode, quality) {
        (FetchMode::Audio, _) => "bestaudio/best".to_string(),
        (FetchMode::Video, QualityTier::Max) => "bv*+ba/b".to_string(),
        (FetchMode::Video, QualityTier::Height(h)) => format!("bv*[height<={h}]+ba/b[height<={h}]"),
    }
}

fn download_args(request: &FetchRequest, settings: &YtDlpSettings) -> Vec<String> {
    let mut args = vec![
        "--newline".to_string(),
        "--continue".to_string(),
        "--no-colors".to_string(),
        "--progress-template".to_string(),
        PROGRESS_TEMPLATE.to_string(),
        "-f".to_string(),
        format_selector(request.mode, request.quality),
    ];
    match request.mode {
        FetchMode::Audio => args.extend([
            "-x".to_string(),
            "--audio-format".to_string(),
            settings.audio_format.clone(),
            "--audio-quality".to_string(),
            "192K".to_string(),
        ]),
        FetchMode::Video => args.extend(["--merge-output-format".to_string(), "mp4".to_string()]),
    }
    if let Some(c) = &settings.cookies {
        args.push("--cookies".to_string());
        args.push(c.display().to_string());
    }
    args.extend(settings.extra_args.iter().cloned());
    args.extend([
        "-P".to_string(),
        request.output_dir.display().to_string(),
        "-o".to_string(),
        "%(title)s.%(ext)s".to_string(),
        "--".to_string(),
        request.url.clone(),
    ]);
    args
}

/// Byte accounting across the streams of one item, so that the reported
/// `done / total` covers the whole item and never restarts mid-item.
#[derive(Debug)]
struct StreamTally {
    plan: Vec<Option<u64>>,
    index: usize,
    /// Bytes of the streams already finished.
    carried: u64,
    current: u64,
}

impl StreamTally {
    fn new(plan: Vec<Option<u64>>) -> Self {
        Self { plan, index: 0, carried: 0, current: 0 }
    }

    /// Item-wide `(done, total)` for one sample of the current stream.
    /// Streams of unknown size are estimated at the current stream's size.
    fn sample(&mut self, done: u64, total: Option<u64>) -> (u64, Option<u64>) {
        self.current = total.map_or(done, |t| t.max(done));
        let item_total = total.map(|t| {
            let rest: u64 = self.plan.iter().skip(self.index + 1).map(|s| s.unwrap_or(t)).sum();
            self.carried + t + rest
        });
        (self.carried + done, item_total)
    }

    fn stream_finished(&mut self) {
        self.carried += self.current;
        self.current = 0;
        self.index += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Progress {
    Downloading {
        bytes_done: u64,
        bytes_total: Option<u64>,
        speed_bps: Option<f64>,
        filename: Option<String>,
    },
    StreamFinished,
}

fn field(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty() && s != "NA" && s != "None").then_some(s)
}

/// Parses one `[tsprog]status|done|total|estimate|speed|filename` line.
fn parse_progress_line(line: &str) -> Option<Progress> {
    let rest = line.trim_start().strip_prefix(PROGRESS_TAG)?;
    let mut parts = rest.splitn(6, '|');
    let status = parts.next()?.trim();
    let done = parts.next().and_then(field);
    let total = parts.next().and_then(field);
    let estimate = parts.next().and_then(field);
    let speed = parts.next().and_then(field);
    let filename = parts.next().and_then(field).map(str::to_string);

    match status {
        "downloading" => {
            let bytes_done = done.and_then(|v| v.parse::<f64>().ok()).map(|v| v as u64).unwrap_or(0);
            let bytes_total = total
                .or(estimate)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| *v > 0.0)
                .map(|v| v as u64);
            let speed_bps = speed.and_then(|v| v.parse::<f64>().ok());
            Some(Progress::Downloading { bytes_done, bytes_total, speed_bps, filename })
        }
        "finished" => Some(Progress::StreamFinished),
        _ => None,
    }
}

/// `[download] Downloading item 3 of 12`
fn parse_item_start(line: &str) -> Option<u32> {
    let rest = line.trim().strip_prefix("[download] Downloading item ")?;
    let (n, _) = rest.split_once(" of ")?;
    n.trim().parse().ok()
}

/// `[ExtractAudio] Destination: x.mp3`, `[Merger] Merging formats into "x.mp4"`
fn parse_destination(line: &str) -> Option<&str> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("[ExtractAudio] Destination: ") {
        return Some(rest.trim());
    }
    let rest = line.strip_prefix("[Merger] Merging formats into ")?;
    Some(rest.trim().trim_matches('"'))
}


/// Runs the real fetch loop against a shell script standing in for yt-dlp.
#[cfg(all(test, unix))]
mod script_tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::core::events::{UiDispatcher, UiEvent};
    use crate::core::format::round_percent;
    use crate::core::gate::{ControlGate, ProgressSink};
    use crate::core::model::{SessionId, SessionState};
    use crate::core::progress::ProgressAggregator;
    use crate::plugins::registry::SimulateSettings;
    use parking_lot::Mutex;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Instant;

    struct Discard;
    impl UiDispatcher for Discard {
        fn schedule(&self, _event: UiEvent, _delay: Duration) {}
    }

    /// Collects raw events and folds them into a real aggregator.
    struct Feed {
        raw: Mutex<Vec<RawProgress>>,
        aggregator: ProgressAggregator,
    }

    impl Feed {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                raw: Mutex::new(Vec::new()),
                aggregator: ProgressAggregator::new(SessionId::new_v4(), Arc::new(Discard), None),
            })
        }

        fn downloading(&self) -> usize {
            self.raw.lock().iter().filter(|e| matches!(e, RawProgress::Downloading { .. })).count()
        }
    }

    impl ProgressSink for Feed {
        fn on_progress(&self, event: RawProgress) {
            self.raw.lock().push(event.clone());
            self.aggregator.update(event);
        }
    }

    /// Writes an executable `yt-dlp` that prints `metadata` for the metadata
    /// call and runs `download` for anything else.
    fn fake_ytdlp(dir: &Path, metadata: &str, download: &str) -> PathBuf {
        let path = dir.join("yt-dlp");
        let script = format!(
            "#!/bin/sh\ncase \"$*\" in\n  --version) exit 0 ;;\n  *--dump-single-json*)\n    cat <<'JSON'\n{metadata}\nJSON\n    ;;\n  *)\n{download}\n    ;;\nesac\n"
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        // ETXTBSY while another test thread still holds a forked copy of the write fd.
        for _ in 0..50 {
            match Command::new(&path).arg("--version").status() {
                Err(e) if e.raw_os_error() == Some(26) => thread::sleep(Duration::from_millis(10)),
                _ => break,
            }
        }
        path
    }

    fn ctx(bin: PathBuf) -> EngineContext {
        let mut config = AppConfig::default();
        config.ytdlp_path = Some(bin);
        EngineContext { config: Arc::new(config), ytdlp: YtDlpSettings::default(), simulate: SimulateSettings::default() }
    }

    fn request(dir: &Path, mode: FetchMode) -> FetchRequest {
        FetchRequest {
            url: "https://www.youtube.com/watch?v=abc123".to_string(),
            output_dir: dir.to_path_buf(),
            mode,
            quality: QualityTier::Max,
        }
    }

    fn checkpoint(feed: Arc<Feed>) -> (Arc<ControlGate>, Checkpoint) {
        let gate = Arc::new(ControlGate::new(Duration::from_millis(20)));
        gate.transition(SessionState::Active);
        let cp = Checkpoint::new(gate.clone(), feed);
        (gate, cp)
    }

    const SINGLE: &str = r#"{"_type":"video","title":"clip"}"#;

    #[test]
    fn merged_video_percent_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_ytdlp(
            dir.path(),
            SINGLE,
            "echo '[tsprog]downloading|500|1000|NA|100|clip.f137.mp4'\n\
             echo '[tsprog]downloading|1000|1000|NA|100|clip.f137.mp4'\n\
             echo '[tsprog]finished|1000|1000|NA|NA|clip.f137.mp4'\n\
             echo '[tsprog]downloading|100|1000|NA|100|clip.f140.m4a'\n\
             echo '[tsprog]downloading|500|1000|NA|100|clip.f140.m4a'\n\
             echo '[tsprog]finished|1000|1000|NA|NA|clip.f140.m4a'\n\
             echo '[Merger] Merging formats into \"clip.mp4\"'",
        );
        let feed = Feed::new();
        let (_gate, cp) = checkpoint(feed.clone());
        let summary = YtDlpEngine::new().fetch(&request(dir.path(), FetchMode::Video), &ctx(bin), &cp).unwrap();
        assert_eq!(summary.files, vec![PathBuf::from("clip.mp4")]);

        // Replay into a fresh aggregator to see the snapshot after each sample.
        let check = Feed::new();
        let mut seen = Vec::new();
        for event in feed.raw.lock().iter().cloned() {
            check.on_progress(event.clone());
            if let RawProgress::Downloading { bytes_done, bytes_total: Some(total), .. } = event {
                let snap = check.aggregator.snapshot();
                assert_eq!(snap.percent, round_percent(bytes_done as f64 / total as f64 * 100.0));
                seen.push(snap.percent);
            }
        }
        assert_eq!(seen, vec![25.0, 50.0, 55.0, 75.0]);
        assert_eq!(feed.aggregator.snapshot().percent, 100.0);
    }

    #[test]
    fn playlist_total_comes_first_and_each_entry_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let mut download = String::new();
        for (n, name) in ["a", "b", "c"].iter().enumerate() {
            download.push_str(&format!(
                "echo '[download] Downloading item {} of 3'\n\
                 echo '[tsprog]downloading|50|100|NA|NA|{name}.webm'\n\
                 echo '[tsprog]finished|100|100|NA|NA|{name}.webm'\n\
                 echo '[ExtractAudio] Destination: {name}.mp3'\n",
                n + 1
            ));
        }
        let bin = fake_ytdlp(
            dir.path(),
            r#"{"_type":"playlist","title":"mix","entries":[{"id":"a"},{"id":"b"},{"id":"c"}]}"#,
            &download,
        );
        let feed = Feed::new();
        let (_gate, cp) = checkpoint(feed.clone());
        let summary = YtDlpEngine::new().fetch(&request(dir.path(), FetchMode::Audio), &ctx(bin), &cp).unwrap();

        assert_eq!(summary.item_count, 3);
        assert_eq!(summary.files, ["a.mp3", "b.mp3", "c.mp3"].map(PathBuf::from).to_vec());
        let raw = feed.raw.lock();
        let total_at = raw.iter().position(|e| matches!(e, RawProgress::ItemTotalKnown { total: 3 })).unwrap();
        let first_sample = raw.iter().position(|e| matches!(e, RawProgress::Downloading { .. })).unwrap();
        assert!(total_at < first_sample);
        let finished: Vec<_> = raw
            .iter()
            .filter_map(|e| match e {
                RawProgress::Finished { filename } => filename.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(finished, vec!["a.mp3", "b.mp3", "c.mp3"]);
        assert_eq!(feed.aggregator.items().index, 3);
        assert_eq!(feed.aggregator.snapshot().percent, 100.0);
    }

    #[test]
    fn nonzero_exit_is_an_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_ytdlp(dir.path(), SINGLE, "echo 'ERROR: Video unavailable' >&2\nexit 1");
        let (_gate, cp) = checkpoint(Feed::new());
        let err = YtDlpEngine::new().fetch(&request(dir.path(), FetchMode::Video), &ctx(bin), &cp).unwrap_err();
        assert!(matches!(err, FetchError::Engine(ref m) if m == "ERROR: Video unavailable"));
    }

    #[test]
    fn cancel_stops_a_silent_child() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_ytdlp(dir.path(), SINGLE, "exec sleep 30");
        let (gate, cp) = checkpoint(Feed::new());
        let ctx = ctx(bin);
        let req = request(dir.path(), FetchMode::Video);

        let started = Instant::now();
        let worker = thread::spawn(move || YtDlpEngine::new().fetch(&req, &ctx, &cp));
        thread::sleep(Duration::from_millis(300));
        gate.request_cancel();
        let result = worker.join().unwrap();
        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cancel_while_paused_stops_a_chatty_child() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_ytdlp(
            dir.path(),
            SINGLE,
            "i=0\nwhile true; do\n  i=$((i+1))\n  echo \"[tsprog]downloading|$i|1000000|NA|NA|clip.mp4\"\n  sleep 0.01\ndone",
        );
        let feed = Feed::new();
        let (gate, cp) = checkpoint(feed.clone());
        let ctx = ctx(bin);
        let req = request(dir.path(), FetchMode::Video);

        let started = Instant::now();
        let worker = thread::spawn(move || YtDlpEngine::new().fetch(&req, &ctx, &cp));
        while feed.downloading() < 3 {
            assert!(started.elapsed() < Duration::from_secs(5), "no progress from child");
            thread::sleep(Duration::from_millis(10));
        }
        assert!(gate.pause());
        thread::sleep(Duration::from_millis(100));
        let held = feed.downloading();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(feed.downloading(), held);

        gate.request_cancel();
        let result = worker.join().unwrap();
        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
