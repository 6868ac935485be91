use crate::core::events::{Pending, UiDispatcher, UiEvent};
use crate::core::format::round_percent;
use crate::core::model::{ItemCounter, ProgressSnapshot, SessionId, Stage};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Raw sample as produced by an engine adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum RawProgress {
    Resolving { title: Option<String> },
    /// Playlist-like sources report their entry count before transfer starts.
    ItemTotalKnown { total: u32 },
    Downloading {
        bytes_done: u64,
        bytes_total: Option<u64>,
        speed_bps: Option<f64>,
        filename: Option<String>,
    },
    Finished { filename: Option<String> },
}

/// Out-of-app progress display. Optional; receives what the UI receives.
pub trait ProgressNotifier: Send + Sync {
    fn notify(&self, session: SessionId, snapshot: &ProgressSnapshot, items: ItemCounter);
}

struct Tally {
    snapshot: ProgressSnapshot,
    items: ItemCounter,
    item_finished: bool,
}

pub struct ProgressAggregator {
    session: SessionId,
    tally: Mutex<Tally>,
    snapshot_slot: Pending<ProgressSnapshot>,
    items_slot: Pending<ItemCounter>,
    dispatcher: Arc<dyn UiDispatcher>,
    notifier: Option<Arc<dyn ProgressNotifier>>,
}

impl ProgressAggregator {
    pub fn new(
        session: SessionId,
        dispatcher: Arc<dyn UiDispatcher>,
        notifier: Option<Arc<dyn ProgressNotifier>>,
    ) -> Self {
        Self {
            session,
            tally: Mutex::new(Tally {
                snapshot: ProgressSnapshot::default(),
                items: ItemCounter::default(),
                item_finished: false,
            }),
            snapshot_slot: Pending::new(),
            items_slot: Pending::new(),
            dispatcher,
            notifier,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.tally.lock().snapshot.clone()
    }

    pub fn items(&self) -> ItemCounter {
        self.tally.lock().items
    }

    /// Folds one raw sample into the snapshot. Never fails: bad samples are
    /// logged and dropped or clamped.
    pub fn update(&self, raw: RawProgress) {
        let mut t = self.tally.lock();
        match raw {
            RawProgress::Resolving { title } => {
                t.snapshot.stage = Stage::FetchingMetadata;
                if title.is_some() {
                    t.snapshot.current_item_name = title;
                }
            }
            RawProgress::ItemTotalKnown { total } => {
                if total == 0 {
                    warn!(session = %self.session, "ignoring item total of 0");
                    return;
                }
                t.items.total = total;
                self.publish_items(t.items);
                return;
            }
            RawProgress::Downloading { bytes_done, bytes_total, speed_bps, filename } => {
                self.advance_item(&mut t);
                let total = bytes_total.unwrap_or(0);
                let done = if total > 0 && bytes_done > total {
                    warn!(session = %self.session, bytes_done, total, "bytes_done exceeds total, clamping");
                    total
                } else {
                    bytes_done
                };
                let speed = match speed_bps {
                    Some(s) if s.is_finite() && s >= 0.0 => s,
                    Some(s) => {
                        warn!(session = %self.session, speed = s, "dropping malformed speed sample");
                        0.0
                    }
                    None => 0.0,
                };

                t.snapshot.stage = Stage::Downloading;
                t.snapshot.bytes_done = done;
                t.snapshot.bytes_total = total;
                t.snapshot.speed_bps = speed;
                if let Some(name) = filename.as_deref().and_then(display_name) {
                    t.snapshot.current_item_name = Some(name);
                }
                if total > 0 {
                    let frac = done as f64 / total as f64;
                    let pct = overall_percent(t.items, frac);
                    t.snapshot.percent = t.snapshot.percent.max(pct);
                }
            }
            RawProgress::Finished { filename } => {
                t.item_finished = true;
                t.snapshot.stage = Stage::Finishing;
                t.snapshot.speed_bps = 0.0;
                if t.snapshot.bytes_total > 0 {
                    t.snapshot.bytes_done = t.snapshot.bytes_total;
                }
                if let Some(name) = filename.as_deref().and_then(display_name) {
                    t.snapshot.current_item_name = Some(name);
                }
                let pct = overall_percent(t.items, 1.0);
                t.snapshot.percent = t.snapshot.percent.max(pct);
            }
        }
        debug!(session = %self.session, percent = t.snapshot.percent, stage = ?t.snapshot.stage, "progress");
        self.publish_snapshot(t.snapshot.clone(), t.items);
    }

    /// Back to an empty snapshot once the session completed.
    pub fn reset(&self) {
        let mut t = self.tally.lock();
        t.snapshot = ProgressSnapshot::default();
        t.item_finished = false;
        self.publish_snapshot(t.snapshot.clone(), t.items);
    }

    fn advance_item(&self, t: &mut Tally) {
        let next = if t.items.index == 0 {
            1
        } else if t.item_finished {
            let n = t.items.index + 1;
            if t.items.total > 0 { n.min(t.items.total) } else { n }
        } else {
            return;
        };
        t.item_finished = false;
        if next != t.items.index {
            t.items.index = next;
            self.publish_items(t.items);
        }
    }

    fn publish_snapshot(&self, snapshot: ProgressSnapshot, items: ItemCounter) {
        if let Some(n) = &self.notifier {
            n.notify(self.session, &snapshot, items);
        }
        if self.snapshot_slot.publish(snapshot) {
            self.dispatcher.schedule(
                UiEvent::Progress { session: self.session, snapshot: self.snapshot_slot.clone() },
                Duration::ZERO,
            );
        }
    }

    fn publish_items(&self, items: ItemCounter) {
        if self.items_slot.publish(items) {
            self.dispatcher.schedule(
                UiEvent::Items { session: self.session, items: self.items_slot.clone() },
                Duration::ZERO,
            );
        }
    }
}

/// Percent across all items; playlist progress never resets per item.
fn overall_percent(items: ItemCounter, item_fraction: f64) -> f64 {
    let frac = item_fraction.clamp(0.0, 1.0);
    let pct = if items.total > 1 && items.index > 0 {
        let done_items = (items.index - 1) as f64;
        (done_items + frac) / items.total as f64 * 100.0
    } else {
        frac * 100.0
    };
    round_percent(pct)
}

fn display_name(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
}
