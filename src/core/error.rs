use crate::i18n::Messages;
use thiserror::Error;

/// Returned by `Checkpoint` once a cancel has been requested. Not a failure:
/// the controller turns it into the Cancelled terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("fetch cancelled")]
pub struct Cancelled;

/// Outcome of an engine run other than success.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch cancelled")]
    Cancelled,

    #[error("external tool is missing: {tool}")]
    ToolMissing { tool: String },

    /// Engine-reported failure text, classified before display.
    #[error("engine error: {0}")]
    Engine(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<Cancelled> for FetchError {
    fn from(_: Cancelled) -> Self {
        FetchError::Cancelled
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        FetchError::Other(e.into())
    }
}

/// What the front-end can see from the controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid url: {0}")]
    Validation(String),

    #[error("a session is already in progress")]
    Busy,

    #[error("{0}")]
    Engine(String),

    #[error("{tool} is not available. {hint}")]
    Environment { tool: String, hint: String },

    #[error("{kind}: {message}")]
    Unexpected { kind: String, message: String },
}

/// Truncates to `max_chars` characters, appending an ellipsis when cut.
pub fn truncate_message(raw: &str, max_chars: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push('…');
    out
}

const UNAVAILABLE: &[&str] = &[
    "video unavailable",
    "this video is unavailable",
    "not available in your country",
];
const NO_FORMAT: &[&str] = &["requested format is not available", "no video formats found"];
const AUTH: &[&str] = &[
    "sign in to confirm",
    "login required",
    "age-restricted",
    "members-only",
    "private video",
];
const NETWORK: &[&str] = &["unable to download webpage", "timed out", "network is unreachable"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unavailable,
    NoFormat,
    AuthRequired,
    Network,
    Other,
}

pub fn classify_engine_message(raw: &str) -> FailureKind {
    let lower = raw.to_ascii_lowercase();
    let hit = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
    if hit(UNAVAILABLE) {
        FailureKind::Unavailable
    } else if hit(NO_FORMAT) {
        FailureKind::NoFormat
    } else if hit(AUTH) {
        FailureKind::AuthRequired
    } else if hit(NETWORK) {
        FailureKind::Network
    } else {
        FailureKind::Other
    }
}

/// Short user-facing line for raw engine text.
pub fn user_message(raw: &str, msgs: &Messages, max_chars: usize) -> String {
    match classify_engine_message(raw) {
        FailureKind::Unavailable => msgs.unavailable.to_string(),
        FailureKind::NoFormat => msgs.no_format.to_string(),
        FailureKind::AuthRequired => msgs.auth_required.to_string(),
        FailureKind::Network => msgs.network.to_string(),
        FailureKind::Other => truncate_message(raw, max_chars),
    }
}

/// Install hint shown for a missing external tool.
pub fn install_hint(tool: &str) -> String {
    match tool {
        "yt-dlp" => "Install it with `pip install -U yt-dlp` or from https://github.com/yt-dlp/yt-dlp/releases, or pass --ytdlp-path.".to_string(),
        "ffmpeg" => "Install ffmpeg from your package manager (e.g. `apt install ffmpeg`, `brew install ffmpeg`).".to_string(),
        other => format!("Install {} and make sure it is on PATH.", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::i18n::EN;

    #[test]
    fn known_engine_errors_are_classified() {
        assert_eq!(
            user_message("ERROR: [youtube] abc: Video unavailable", &EN, 120),
            "This video is unavailable."
        );
        assert_eq!(
            user_message("ERROR: Requested format is not available. Use --list-formats", &EN, 120),
            "No format matches the selected quality."
        );
        assert_eq!(
            classify_engine_message("ERROR: Sign in to confirm your age"),
            FailureKind::AuthRequired
        );
        assert_eq!(
            classify_engine_message("ERROR: Unable to download webpage: <urlopen error timed out>"),
            FailureKind::Network
        );
    }

    #[test]
    fn unknown_errors_are_truncated() {
        let long = "x".repeat(300);
        let out = user_message(&long, &EN, 120);
        assert_eq!(out.chars().count(), 121);
        assert!(out.ends_with('…'));
        assert_eq!(user_message("  boom  ", &EN, 120), "boom");
    }

    #[test]
    fn cancelled_converts_with_question_mark() {
        fn step() -> Result<(), Cancelled> {
            Err(Cancelled)
        }
        fn run() -> Result<(), FetchError> {
            step()?;
            Ok(())
        }
        assert!(matches!(run(), Err(FetchError::Cancelled)));
    }
}
