use crate::config::AppConfig;
use crate::core::error::FetchError;
use crate::core::gate::Checkpoint;
use crate::core::model::{FetchMode, FetchRequest, FetchSummary};
use clap::{ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything an engine needs besides the request itself.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub config: Arc<AppConfig>,
    pub ytdlp: YtDlpSettings,
    pub simulate: SimulateSettings,
}

#[derive(Debug, Clone)]
pub struct YtDlpSettings {
    pub cookies: Option<PathBuf>,
    pub audio_format: String,
    pub extra_args: Vec<String>,
}

impl Default for YtDlpSettings {
    fn default() -> Self {
        Self { cookies: None, audio_format: "mp3".to_string(), extra_args: vec![] }
    }
}

#[derive(Debug, Clone)]
pub struct SimulateSettings {
    pub items: u32,
    pub item_bytes: u64,
    pub chunk_bytes: u64,
    pub chunk_delay_ms: u64,
    /// Fail halfway through the last item with this engine message.
    pub fail_with: Option<String>,
}

impl Default for SimulateSettings {
    fn default() -> Self {
        Self {
            items: 1,
            item_bytes: 8 * 1024 * 1024,
            chunk_bytes: 256 * 1024,
            chunk_delay_ms: 50,
            fail_with: None,
        }
    }
}

/// The fetch engine contract. `fetch` runs synchronously on the session's
/// worker thread and must pass through `checkpoint` at every progress tick.
pub trait FetchEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch(
        &self,
        request: &FetchRequest,
        ctx: &EngineContext,
        checkpoint: &Checkpoint,
    ) -> Result<FetchSummary, FetchError>;
}

/// Supplies an existing, writable output directory for a mode.
pub trait StorageResolver: Send + Sync {
    fn output_dir(&self, mode: FetchMode) -> std::io::Result<PathBuf>;
}

#[derive(Debug)]
pub struct FetchCliConfig {
    pub config: AppConfig,
    pub ytdlp: YtDlpSettings,
    pub simulate: SimulateSettings,
}

pub trait CliPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn augment_fetch_command(&self, cmd: Command) -> Command;
    fn apply_fetch_matches(&self, matches: &ArgMatches, cfg: &mut FetchCliConfig) -> anyhow::Result<()>;
}

pub struct EngineRegistry {
    engines: Vec<Arc<dyn FetchEngine>>,
    cli_plugins: Vec<Box<dyn CliPlugin>>,
}

impl EngineRegistry {
    pub fn with_defaults() -> Self {
        let mut reg = Self { engines: vec![], cli_plugins: vec![] };

        reg.engines.push(Arc::new(crate::plugins::ytdlp::engine::YtDlpEngine::new()));
        reg.engines.push(Arc::new(crate::plugins::simulate::engine::SimulatedEngine::new()));

        reg.cli_plugins.push(Box::new(crate::plugins::ytdlp::cli::YtDlpCliPlugin::new()));
        reg.cli_plugins.push(Box::new(crate::plugins::simulate::cli::SimulateCliPlugin::new()));
        reg
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    pub fn engine(&self, name: &str) -> Option<Arc<dyn FetchEngine>> {
        self.engines.iter().find(|e| e.name() == name).cloned()
    }

    pub fn augment_fetch_command(&self, cmd: Command) -> Command {
        self.cli_plugins
            .iter()
            .fold(cmd, |c, p| p.augment_fetch_command(c))
    }

    pub fn apply_fetch_matches(&self, matches: &ArgMatches, cfg: &mut FetchCliConfig) -> anyhow::Result<()> {
        for p in &self.cli_plugins {
            tracing::debug!(plugin = p.name(), "applying cli flags");
            p.apply_fetch_matches(matches, cfg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_register_both_engines() {
        let reg = EngineRegistry::with_defaults();
        assert_eq!(reg.names(), vec!["ytdlp", "simulate"]);
        assert!(reg.engine("simulate").is_some());
        assert!(reg.engine("bittorrent").is_none());
    }

    #[test]
    fn plugin_flags_reach_the_config() {
        let reg = EngineRegistry::with_defaults();
        let cmd = reg.augment_fetch_command(Command::new("fetch"));
        let m = cmd
            .try_get_matches_from(["fetch", "--sim-items", "3", "--audio-format", "opus", "--ytdlp-arg", "--no-mtime"])
            .unwrap();
        let mut cfg = FetchCliConfig {
            config: AppConfig::default(),
            ytdlp: YtDlpSettings::default(),
            simulate: SimulateSettings::default(),
        };
        reg.apply_fetch_matches(&m, &mut cfg).unwrap();
        assert_eq!(cfg.simulate.items, 3);
        assert_eq!(cfg.ytdlp.audio_format, "opus");
        assert_eq!(cfg.ytdlp.extra_args, vec!["--no-mtime".to_string()]);
    }
}
