use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::core::cleanup::DEFAULT_PARTIAL_SUFFIXES;
use crate::i18n::Locale;

const DEFAULT_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

/// Process-wide settings. Built once in `main` (file, then CLI overrides)
/// and shared read-only behind an `Arc`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub out_dir: PathBuf,
    pub allowed_hosts: Vec<String>,
    pub partial_suffixes: Vec<String>,
    pub cleanup_delay_ms: u64,
    pub checkpoint_poll_ms: u64,
    pub message_ttl_ms: u64,
    pub max_error_len: usize,
    pub ytdlp_path: Option<PathBuf>,
    pub locale: String,

    /// Lazily resolved external tool locations. Resolved at most once, on
    /// first use; overrides must be settled before the config is shared.
    #[serde(skip)]
    tools: ToolCache,
}

#[derive(Debug, Default)]
struct ToolCache {
    ytdlp: OnceLock<Option<PathBuf>>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("./downloads"),
            allowed_hosts: DEFAULT_HOSTS.iter().map(|s| s.to_string()).collect(),
            partial_suffixes: DEFAULT_PARTIAL_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            cleanup_delay_ms: 500,
            checkpoint_poll_ms: 200,
            message_ttl_ms: 3000,
            max_error_len: 120,
            ytdlp_path: None,
            locale: "en".to_string(),
            tools: ToolCache::default(),
        }
    }
}

impl AppConfig {
    /// Reads a JSON config file. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path).with_context(|| format!("read config {}", path.display()))?;
        let cfg: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay_ms)
    }

    pub fn checkpoint_poll(&self) -> Duration {
        Duration::from_millis(self.checkpoint_poll_ms)
    }

    pub fn message_ttl(&self) -> Duration {
        Duration::from_millis(self.message_ttl_ms)
    }

    pub fn locale(&self) -> Locale {
        Locale::parse(&self.locale)
    }

    /// The yt-dlp binary: the configured path if it exists, else the first
    /// match on PATH. Looked up once per process.
    pub fn ytdlp(&self) -> Option<&Path> {
        self.tools
            .ytdlp
            .get_or_init(|| {
                let found = resolve_tool("yt-dlp", self.ytdlp_path.as_deref());
                match &found {
                    Some(p) => tracing::info!(path = %p.display(), "resolved yt-dlp"),
                    None => tracing::warn!("yt-dlp not found"),
                }
                found
            })
            .as_deref()
    }
}

fn bin_name(tool: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", tool)
    } else {
        tool.to_string()
    }
}

fn resolve_tool(tool: &str, configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = configured {
        return p.is_file().then(|| p.to_path_buf());
    }
    let name = bin_name(tool);
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(&name))
        .find(|candidate| candidate.is_file())
}
