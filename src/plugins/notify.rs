use crate::core::model::{ItemCounter, ProgressSnapshot, SessionId};
use crate::core::progress::ProgressNotifier;
use parking_lot::Mutex;
use tracing::info;

/// Mirrors progress into the log, at most once per whole percent.
#[derive(Default)]
pub struct LogNotifier {
    last: Mutex<Option<(SessionId, i64, u32)>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn should_log(&self, session: SessionId, percent: f64, item: u32) -> bool {
        let bucket = if percent < 0.0 { -1 } else { percent.floor() as i64 };
        let mut last = self.last.lock();
        if *last == Some((session, bucket, item)) {
            return false;
        }
        *last = Some((session, bucket, item));
        true
    }
}

impl ProgressNotifier for LogNotifier {
    fn notify(&self, session: SessionId, snapshot: &ProgressSnapshot, items: ItemCounter) {
        if !self.should_log(session, snapshot.percent, items.index) {
            return;
        }
        info!(
            session = %session,
            percent = snapshot.percent,
            size = %snapshot.size_text(),
            speed = %snapshot.speed_text(),
            item = items.index,
            items = items.total,
            "progress"
        );
    }
}
