use crate::core::error::FetchError;
use crate::core::gate::Checkpoint;
use crate::core::link::media_id;
use crate::core::model::{FetchMode, FetchRequest, FetchSummary};
use crate::core::progress::RawProgress;
use crate::plugins::registry::{EngineContext, FetchEngine};
use anyhow::Context;
use sanitize_filename::sanitize;
use std::fs::OpenOptions;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};

/// Offline engine: writes zero-filled `.part` files in ticks, then renames
/// them. Used by tests and `--engine simulate`.
pub struct SimulatedEngine;

impl SimulatedEngine {
    pub fn new() -> Self {
        Self
    }
}

impl FetchEngine for SimulatedEngine {
    fn name(&self) -> &'static str {
        "simulate"
    }

    fn fetch(
        &self,
        request: &FetchRequest,
        ctx: &EngineContext,
        checkpoint: &Checkpoint,
    ) -> Result<FetchSummary, FetchError> {
        let sim = &ctx.simulate;
        let tick = Duration::from_millis(sim.chunk_delay_ms);
        let id = url::Url::parse(&request.url)
            .ok()
            .and_then(|u| media_id(&u))
            .unwrap_or_else(|| "media".to_string());
        let ext = match request.mode {
            FetchMode::Audio => "mp3",
            FetchMode::Video => "mp4",
        };

        checkpoint.report(RawProgress::Resolving { title: Some(format!("simulated {}", id)) })?;
        checkpoint.idle(tick)?;
        let items = sim.items.max(1);
        if items > 1 {
            checkpoint.report(RawProgress::ItemTotalKnown { total: items })?;
        }

        let chunk = sim.chunk_bytes.max(1);
        let speed = if sim.chunk_delay_ms > 0 {
            Some(chunk as f64 * 1000.0 / sim.chunk_delay_ms as f64)
        } else {
            None
        };
        let mut files = Vec::with_capacity(items as usize);

        for index in 1..=items {
            let name = sanitize(format!("{} [{}] {}.{}", id, request.quality, index, ext));
            let target = request.output_dir.join(&name);
            let partial = request.output_dir.join(format!("{}.part", name));

            // --continue semantics: pick up an existing partial file.
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&partial)
                .with_context(|| format!("open {}", partial.display()))?;
            let mut done = file.metadata()?.len().min(sim.item_bytes);
            if done > 0 {
                debug!(path = %partial.display(), done, "continuing partial file");
            }

            let zeros = vec![0u8; chunk as usize];
            let fail_at = match &sim.fail_with {
                Some(msg) if index == items => Some((sim.item_bytes / 2, msg)),
                _ => None,
            };

            loop {
                checkpoint.report(RawProgress::Downloading {
                    bytes_done: done,
                    bytes_total: Some(sim.item_bytes),
                    speed_bps: speed,
                    filename: Some(partial.display().to_string()),
                })?;
                if done >= sim.item_bytes {
                    break;
                }
                if let Some((at, msg)) = fail_at {
                    if done >= at {
                        return Err(FetchError::Engine(msg.clone()));
                    }
                }
                let n = chunk.min(sim.item_bytes - done);
                file.write_all(&zeros[..n as usize])?;
                done += n;
                checkpoint.idle(tick)?;
            }

            file.flush()?;
            drop(file);
            if checkpoint.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            std::fs::rename(&partial, &target)
                .with_context(|| format!("rename {} -> {}", partial.display(), target.display()))?;
            checkpoint.report(RawProgress::Finished { filename: Some(target.display().to_string()) })?;
            info!(path = %target.display(), "simulated item done");
            files.push(target);
        }

        Ok(FetchSummary { item_count: items, files })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::core::gate::{ControlGate, ProgressSink};
    use crate::core::model::{QualityTier, SessionState};
    use crate::plugins::registry::{SimulateSettings, YtDlpSettings};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Collect(Mutex<Vec<RawProgress>>);
    impl ProgressSink for Collect {
        fn on_progress(&self, event: RawProgress) {
            self.0.lock().push(event);
        }
    }

    fn ctx(items: u32, fail_with: Option<&str>) -> EngineContext {
        EngineContext {
            config: Arc::new(AppConfig::default()),
            ytdlp: YtDlpSettings::default(),
            simulate: SimulateSettings {
                items,
                item_bytes: 4096,
                chunk_bytes: 1024,
                chunk_delay_ms: 0,
                fail_with: fail_with.map(str::to_string),
            },
        }
    }

    fn request(dir: &std::path::Path) -> FetchRequest {
        FetchRequest {
            url: "https://youtu.be/abc123".to_string(),
            output_dir: dir.to_path_buf(),
            mode: FetchMode::Audio,
            quality: QualityTier::Max,
        }
    }

    fn checkpoint() -> (Arc<ControlGate>, Arc<Collect>, Checkpoint) {
        let gate = Arc::new(ControlGate::new(Duration::from_millis(20)));
        gate.transition(SessionState::Active);
        let sink = Arc::new(Collect::default());
        let cp = Checkpoint::new(gate.clone(), sink.clone());
        (gate, sink, cp)
    }

    #[test]
    fn writes_every_item_and_renames_partials() {
        let dir = tempfile::tempdir().unwrap();
        let (_gate, sink, cp) = checkpoint();
        let summary = SimulatedEngine::new().fetch(&request(dir.path()), &ctx(3, None), &cp).unwrap();

        assert_eq!(summary.item_count, 3);
        for f in &summary.files {
            assert_eq!(std::fs::metadata(f).unwrap().len(), 4096);
            assert!(f.extension().is_some_and(|e| e == "mp3"));
        }
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".part"))
            .count();
        assert_eq!(leftovers, 0);

        let events = sink.0.lock();
        assert!(matches!(events[0], RawProgress::Resolving { .. }));
        assert!(matches!(events[1], RawProgress::ItemTotalKnown { total: 3 }));
        let finished = events.iter().filter(|e| matches!(e, RawProgress::Finished { .. })).count();
        assert_eq!(finished, 3);
    }

    #[test]
    fn fails_halfway_through_last_item() {
        let dir = tempfile::tempdir().unwrap();
        let (_gate, _sink, cp) = checkpoint();
        let err = SimulatedEngine::new()
            .fetch(&request(dir.path()), &ctx(2, Some("ERROR: Video unavailable")), &cp)
            .unwrap_err();
        assert!(matches!(err, FetchError::Engine(ref m) if m == "ERROR: Video unavailable"));
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.iter().filter(|n| n.ends_with(".part")).count(), 1);
    }

    #[test]
    fn stops_with_cancelled_when_gate_is_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, _sink, cp) = checkpoint();
        gate.request_cancel();
        let err = SimulatedEngine::new().fetch(&request(dir.path()), &ctx(1, None), &cp).unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
    }

    #[test]
    fn continues_an_existing_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let name = sanitize("abc123 [max] 1.mp3");
        std::fs::write(dir.path().join(format!("{}.part", name)), vec![0u8; 2048]).unwrap();
        let (_gate, sink, cp) = checkpoint();
        let summary = SimulatedEngine::new().fetch(&request(dir.path()), &ctx(1, None), &cp).unwrap();
        assert_eq!(std::fs::metadata(&summary.files[0]).unwrap().len(), 4096);
        let first = sink
            .0
            .lock()
            .iter()
            .find_map(|e| match e {
                RawProgress::Downloading { bytes_done, .. } => Some(*bytes_done),
                _ => None,
            })
            .unwrap();
        assert_eq!(first, 2048);
    }
}
