use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::core::format::{fmt_bytes, fmt_speed};

pub type SessionId = Uuid;

/// Sentinel for `ProgressSnapshot::percent` when no total is known yet.
pub const PERCENT_INDETERMINATE: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Resolving,
    Active,
    Paused,
    Cancelling,
    Cancelled,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Failed)
    }

    /// Allowed edges of the session state machine. Everything is forward-only
    /// except the Active/Paused toggle.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Resolving)
                | (Resolving, Active)
                | (Active, Paused)
                | (Paused, Active)
                | (Resolving | Active | Paused, Cancelling)
                | (Resolving | Active | Paused, Completed)
                | (Resolving | Active | Paused, Failed)
                | (Cancelling, Cancelled)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Audio,
    Video,
}

impl FetchMode {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// Requested quality. Ignored for audio-only fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    Max,
    Height(u32),
}

impl QualityTier {
    pub const HEIGHTS: [u32; 6] = [2160, 1440, 1080, 720, 480, 360];

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        if s == "max" || s == "best" {
            return Some(Self::Max);
        }
        let h: u32 = s.trim_end_matches('p').parse().ok()?;
        Self::HEIGHTS.contains(&h).then_some(Self::Height(h))
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => f.write_str("max"),
            Self::Height(h) => write!(f, "{}p", h),
        }
    }
}

/// Immutable inputs of a session, fixed by `start`.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub output_dir: PathBuf,
    pub mode: FetchMode,
    pub quality: QualityTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchingMetadata,
    Downloading,
    Finishing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub percent: f64,
    pub bytes_done: u64,
    /// 0 when unknown.
    pub bytes_total: u64,
    pub speed_bps: f64,
    pub current_item_name: Option<String>,
    pub stage: Stage,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            percent: PERCENT_INDETERMINATE,
            bytes_done: 0,
            bytes_total: 0,
            speed_bps: 0.0,
            current_item_name: None,
            stage: Stage::FetchingMetadata,
        }
    }
}

impl ProgressSnapshot {
    pub fn is_indeterminate(&self) -> bool {
        self.percent < 0.0
    }

    pub fn size_text(&self) -> String {
        if self.bytes_total > 0 {
            format!("{} / {}", fmt_bytes(self.bytes_done), fmt_bytes(self.bytes_total))
        } else {
            fmt_bytes(self.bytes_done)
        }
    }

    pub fn speed_text(&self) -> String {
        fmt_speed(self.speed_bps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemCounter {
    /// 1-based once the first item starts, 0 before.
    pub index: u32,
    /// 0 until the engine reports the item count.
    pub total: u32,
}

/// Read-only view of the current session, for the front-end.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub state: SessionState,
    pub request: FetchRequest,
    pub snapshot: ProgressSnapshot,
    pub items: ItemCounter,
    pub message: Option<String>,
}

/// What a successful engine run reports back.
#[derive(Debug, Clone, Default)]
pub struct FetchSummary {
    pub item_count: u32,
    pub files: Vec<PathBuf>,
}
