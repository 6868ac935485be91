use crate::plugins::registry::{CliPlugin, FetchCliConfig};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

pub struct YtDlpCliPlugin;

impl YtDlpCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for YtDlpCliPlugin {
    fn name(&self) -> &'static str {
        "ytdlp"
    }

    fn augment_fetch_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("ytdlp_path")
                .long("ytdlp-path")
                .help_heading("yt-dlp")
                .help("Path to the yt-dlp binary (default: search PATH)")
                .num_args(1),
        )
        .arg(
            Arg::new("ytdlp_cookies")
                .long("cookies")
                .help_heading("yt-dlp")
                .help("Netscape cookies file passed to yt-dlp")
                .num_args(1),
        )
        .arg(
            Arg::new("ytdlp_audio_format")
                .long("audio-format")
                .help_heading("yt-dlp")
                .help("Audio codec for audio-only fetches")
                .default_value("mp3")
                .num_args(1),
        )
        .arg(
            Arg::new("ytdlp_extra_arg")
                .long("ytdlp-arg")
                .help_heading("yt-dlp")
                .help("Extra argument forwarded to yt-dlp (repeatable)")
                .action(ArgAction::Append)
                .allow_hyphen_values(true)
                .num_args(1),
        )
    }

    fn apply_fetch_matches(&self, matches: &ArgMatches, cfg: &mut FetchCliConfig) -> anyhow::Result<()> {
        if let Some(p) = matches.get_one::<String>("ytdlp_path") {
            cfg.config.ytdlp_path = Some(PathBuf::from(p));
        }
        if let Some(p) = matches.get_one::<String>("ytdlp_cookies") {
            let path = PathBuf::from(p);
            if !path.is_file() {
                anyhow::bail!("cookies file not found: {}", path.display());
            }
            cfg.ytdlp.cookies = Some(path);
        }
        if let Some(f) = matches.get_one::<String>("ytdlp_audio_format") {
            cfg.ytdlp.audio_format = f.clone();
        }
        if let Some(values) = matches.get_many::<String>("ytdlp_extra_arg") {
            cfg.ytdlp.extra_args.extend(values.cloned());
        }
        Ok(())
    }
}
