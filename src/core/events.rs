use crate::core::model::{ItemCounter, ProgressSnapshot, SessionId, SessionState};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Everything the UI observes arrives as one of these, on the UI thread.
#[derive(Debug, Clone)]
pub enum UiEvent {
    StateChanged { session: SessionId, state: SessionState },
    Progress { session: SessionId, snapshot: Pending<ProgressSnapshot> },
    Items { session: SessionId, items: Pending<ItemCounter> },
    Succeeded { session: SessionId, message: String },
    Failed { session: SessionId, message: String },
    /// Time to drop the success/error banner and acknowledge the session.
    ClearMessage { session: SessionId },
}

/// Marshals events onto the UI-owning thread.
pub trait UiDispatcher: Send + Sync {
    fn schedule(&self, event: UiEvent, delay: Duration);
}

/// Latest-value slot for one logical UI field.
///
/// Producers `publish` as often as they like; at most one UI event is ever
/// outstanding for the slot, and the UI always `take`s the newest value.
pub struct Pending<T> {
    inner: Arc<PendingInner<T>>,
}

struct PendingInner<T> {
    latest: Mutex<Option<T>>,
    scheduled: AtomicBool,
}

impl<T> Clone for Pending<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("scheduled", &self.inner.scheduled.load(Ordering::Acquire))
            .finish()
    }
}

impl<T> Default for Pending<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pending<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PendingInner { latest: Mutex::new(None), scheduled: AtomicBool::new(false) }),
        }
    }

    /// Stores `value`. Returns true when the caller must schedule a UI event
    /// for this slot (none is outstanding).
    pub fn publish(&self, value: T) -> bool {
        *self.inner.latest.lock() = Some(value);
        !self.inner.scheduled.swap(true, Ordering::AcqRel)
    }

    /// UI side: clears the outstanding mark and returns the newest value.
    pub fn take(&self) -> Option<T> {
        self.inner.scheduled.store(false, Ordering::Release);
        self.inner.latest.lock().take()
    }
}

/// Dispatcher backed by an unbounded channel drained by the UI loop.
/// Delayed events ride a tokio timer task.
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<UiEvent>,
    handle: Handle,
}

impl ChannelDispatcher {
    pub fn new(handle: Handle) -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, handle }, rx)
    }
}

impl UiDispatcher for ChannelDispatcher {
    fn schedule(&self, event: UiEvent, delay: Duration) {
        if delay.is_zero() {
            if self.tx.send(event).is_err() {
                tracing::debug!("ui loop gone, dropping event");
            }
            return;
        }
        let tx = self.tx.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_coalesces_to_latest() {
        let slot: Pending<u32> = Pending::new();
        assert!(slot.publish(1));
        assert!(!slot.publish(2));
        assert!(!slot.publish(3));
        assert_eq!(slot.take(), Some(3));
        assert_eq!(slot.take(), None);
        assert!(slot.publish(4));
    }

    #[tokio::test]
    async fn channel_dispatcher_preserves_order_and_delays() {
        let (d, mut rx) = ChannelDispatcher::new(Handle::current());
        let id = SessionId::new_v4();
        d.schedule(UiEvent::ClearMessage { session: id }, Duration::from_millis(30));
        d.schedule(UiEvent::StateChanged { session: id, state: SessionState::Resolving }, Duration::ZERO);
        d.schedule(UiEvent::StateChanged { session: id, state: SessionState::Active }, Duration::ZERO);

        let states: Vec<_> = [rx.recv().await, rx.recv().await]
            .into_iter()
            .flatten()
            .map(|e| match e {
                UiEvent::StateChanged { state, .. } => state,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(states, vec![SessionState::Resolving, SessionState::Active]);
        assert!(matches!(rx.recv().await, Some(UiEvent::ClearMessage { .. })));
    }
}
