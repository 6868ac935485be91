use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Suffixes yt-dlp leaves behind for unfinished transfers.
pub const DEFAULT_PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp", ".tmp"];

/// Deletes partial artifacts from an output directory after an aborted fetch.
#[derive(Debug, Clone)]
pub struct CleanupService {
    suffixes: Vec<String>,
    /// Purge passes so far, shared between clones.
    runs: Arc<AtomicUsize>,
}

impl Default for CleanupService {
    fn default() -> Self {
        Self::new(DEFAULT_PARTIAL_SUFFIXES.iter().map(|s| s.to_string()).collect())
    }
}

impl CleanupService {
    pub fn new(suffixes: Vec<String>) -> Self {
        Self { suffixes, runs: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::Acquire)
    }

    pub fn is_partial_artifact(&self, name: &str) -> bool {
        self.suffixes.iter().any(|s| !s.is_empty() && name.ends_with(s.as_str())) || is_fragment(name)
    }

    /// Non-recursive. Returns how many files were removed; a file that cannot
    /// be removed is logged and skipped. A missing directory counts as clean.
    pub async fn purge(&self, dir: &Path) -> usize {
        self.runs.fetch_add(1, Ordering::AcqRel);
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "cleanup: cannot read directory");
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "cleanup: directory scan interrupted");
                    break;
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();
            if !self.is_partial_artifact(&name) {
                continue;
            }
            match entry.file_type().await {
                Ok(ft) if ft.is_file() => {}
                _ => continue,
            }
            let path = entry.path();
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "cleanup: removed partial artifact");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "cleanup: failed to remove"),
            }
        }

        info!(dir = %dir.display(), removed, "cleanup finished");
        removed
    }
}

/// `name.part-Frag12` or `name.part-Frag12.part`.
fn is_fragment(name: &str) -> bool {
    let Some(pos) = name.rfind(".part-Frag") else {
        return false;
    };
    let tail = &name[pos + ".part-Frag".len()..];
    let digits = tail.strip_suffix(".part").unwrap_or(tail);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
