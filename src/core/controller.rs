use crate::config::AppConfig;
use crate::core::cleanup::CleanupService;
use crate::core::error::{install_hint, truncate_message, user_message, FetchError, SessionError};
use crate::core::events::{UiDispatcher, UiEvent};
use crate::core::gate::{Checkpoint, ControlGate, ProgressSink};
use crate::core::link::validate_url;
use crate::core::model::*;
use crate::core::progress::{ProgressAggregator, ProgressNotifier, RawProgress};
use crate::i18n::{get_messages, Messages};
use crate::plugins::registry::{EngineContext, FetchEngine, StorageResolver};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct Session {
    id: SessionId,
    request: FetchRequest,
    gate: Arc<ControlGate>,
    progress: Arc<ProgressAggregator>,
    message: Mutex<Option<String>>,
    /// Flips to true once the terminal state, message and cleanup are all in.
    settled: watch::Sender<bool>,
}

impl ProgressSink for Session {
    fn on_progress(&self, event: RawProgress) {
        if matches!(event, RawProgress::Downloading { .. }) && self.gate.activate() {
            info!(session = %self.id, "transfer started");
        }
        self.progress.update(event);
    }
}

/// What the monitor task needs after `start` returned.
struct Shared {
    config: Arc<AppConfig>,
    dispatcher: Arc<dyn UiDispatcher>,
    cleanup: CleanupService,
    messages: &'static Messages,
}

/// Owns the single fetch session: validates and starts it, relays
/// pause/resume/cancel to the worker, and drives it to a terminal state.
pub struct SessionController {
    shared: Arc<Shared>,
    engine: Arc<dyn FetchEngine>,
    ctx: EngineContext,
    storage: Arc<dyn StorageResolver>,
    notifier: Option<Arc<dyn ProgressNotifier>>,
    runtime: Handle,
    current: Mutex<Option<Arc<Session>>>,
}

impl SessionController {
    pub fn new(
        ctx: EngineContext,
        engine: Arc<dyn FetchEngine>,
        dispatcher: Arc<dyn UiDispatcher>,
        storage: Arc<dyn StorageResolver>,
        runtime: Handle,
    ) -> Self {
        let config = ctx.config.clone();
        let shared = Shared {
            cleanup: CleanupService::new(config.partial_suffixes.clone()),
            messages: get_messages(config.locale()),
            config,
            dispatcher,
        };
        Self {
            shared: Arc::new(shared),
            engine,
            ctx,
            storage,
            notifier: None,
            runtime,
            current: Mutex::new(None),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ProgressNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn start(&self, url: &str, mode: FetchMode, quality: QualityTier) -> Result<SessionId, SessionError> {
        let config = &self.shared.config;
        let url = validate_url(url, &config.allowed_hosts)?;

        let mut current = self.current.lock();
        if let Some(s) = current.as_ref() {
            if !s.gate.state().is_terminal() {
                return Err(SessionError::Busy);
            }
        }

        let output_dir = self.storage.output_dir(mode).map_err(|e| SessionError::Environment {
            tool: "output directory".to_string(),
            hint: e.to_string(),
        })?;

        let id = Uuid::new_v4();
        let gate = {
            let dispatcher = self.shared.dispatcher.clone();
            Arc::new(ControlGate::with_observer(
                config.checkpoint_poll(),
                Box::new(move |state| {
                    debug!(session = %id, %state, "state changed");
                    dispatcher.schedule(UiEvent::StateChanged { session: id, state }, Duration::ZERO);
                }),
            ))
        };
        let session = Arc::new(Session {
            id,
            request: FetchRequest { url: url.to_string(), output_dir, mode, quality },
            gate,
            progress: Arc::new(ProgressAggregator::new(
                id,
                self.shared.dispatcher.clone(),
                self.notifier.clone(),
            )),
            message: Mutex::new(None),
            settled: watch::Sender::new(false),
        });

        if let Some(old) = current.replace(session.clone()) {
            debug!(session = %old.id, "discarding finished session");
        }
        self.shared
            .dispatcher
            .schedule(UiEvent::StateChanged { session: id, state: SessionState::Resolving }, Duration::ZERO);
        info!(session = %id, url = %session.request.url, ?mode, %quality, dir = %session.request.output_dir.display(), "session started");

        let worker = {
            let engine = self.engine.clone();
            let ctx = self.ctx.clone();
            let request = session.request.clone();
            let checkpoint = Checkpoint::new(session.gate.clone(), session.clone());
            self.runtime.spawn_blocking(move || engine.fetch(&request, &ctx, &checkpoint))
        };
        self.runtime.spawn(monitor(self.shared.clone(), session, worker));
        Ok(id)
    }

    /// No-op unless Active.
    pub fn pause(&self) -> bool {
        self.with_session(|s| s.gate.pause()).unwrap_or(false)
    }

    /// No-op unless Paused.
    pub fn resume(&self) -> bool {
        self.with_session(|s| s.gate.resume()).unwrap_or(false)
    }

    /// Requests cancellation. Cleanup and the `Cancelled` state follow once
    /// the worker has stopped.
    pub fn cancel(&self) -> bool {
        let applied = self.with_session(|s| s.gate.request_cancel()).unwrap_or(false);
        if applied {
            info!("cancel requested");
        }
        applied
    }

    pub fn state(&self) -> SessionState {
        self.with_session(|s| s.gate.state()).unwrap_or(SessionState::Idle)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.with_session(|s| s.progress.snapshot()).unwrap_or_default()
    }

    pub fn session(&self) -> Option<SessionInfo> {
        self.with_session(|s| SessionInfo {
            id: s.id,
            state: s.gate.state(),
            request: s.request.clone(),
            snapshot: s.progress.snapshot(),
            items: s.progress.items(),
            message: s.message.lock().clone(),
        })
    }

    /// Drops a terminal session; the controller is Idle afterwards.
    pub fn acknowledge(&self) -> bool {
        let mut current = self.current.lock();
        match current.as_ref() {
            Some(s) if s.gate.state().is_terminal() => {
                debug!(session = %s.id, "session acknowledged");
                *current = None;
                true
            }
            _ => false,
        }
    }

    /// Waits until the current session is terminal. `None` on timeout;
    /// `Some(Idle)` when there is no session.
    pub async fn wait_terminal(&self, timeout: Duration) -> Option<SessionState> {
        let Some(session) = self.current.lock().clone() else {
            return Some(SessionState::Idle);
        };
        let mut rx = session.settled.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|done| *done)).await.ok()?.ok()?;
        Some(session.gate.state())
    }

    fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> Option<R> {
        let session = self.current.lock().clone()?;
        Some(f(&session))
    }
}

async fn monitor(
    shared: Arc<Shared>,
    session: Arc<Session>,
    worker: JoinHandle<Result<FetchSummary, FetchError>>,
) {
    let err = match worker.await {
        Ok(Ok(summary)) => {
            if session.gate.transition(SessionState::Completed) {
                info!(session = %session.id, items = summary.item_count, files = summary.files.len(), "session completed");
                session.progress.reset();
                finish(&shared, &session, shared.messages.completed.to_string(), false);
                return;
            }
            None
        }
        Ok(Err(e)) => session_error(e, &shared),
        Err(join) => Some(join_failure(join, &shared)),
    };

    match err {
        Some(err) if session.gate.transition(SessionState::Failed) => {
            let text = format!("{}: {}", shared.messages.failed_prefix, err);
            warn!(session = %session.id, error = %err, "session failed");
            finish(&shared, &session, text, true);
        }
        // Cancel won the race, or the engine stopped because it was asked to.
        _ => {
            session.gate.request_cancel();
            tokio::time::sleep(shared.config.cleanup_delay()).await;
            let removed = shared.cleanup.purge(&session.request.output_dir).await;
            debug!(session = %session.id, removed, "partial files purged");
            session.gate.transition(SessionState::Cancelled);
            info!(session = %session.id, "session cancelled");
            *session.message.lock() = Some(shared.messages.cancelled.to_string());
            session.settled.send_replace(true);
            shared
                .dispatcher
                .schedule(UiEvent::ClearMessage { session: session.id }, shared.config.message_ttl());
        }
    }
}

fn finish(shared: &Shared, session: &Session, message: String, failed: bool) {
    *session.message.lock() = Some(message.clone());
    session.settled.send_replace(true);
    let event = if failed {
        UiEvent::Failed { session: session.id, message }
    } else {
        UiEvent::Succeeded { session: session.id, message }
    };
    shared.dispatcher.schedule(event, Duration::ZERO);
    shared
        .dispatcher
        .schedule(UiEvent::ClearMessage { session: session.id }, shared.config.message_ttl());
}

/// `None` when the engine stopped at a checkpoint; that outcome is always
/// settled as a cancellation.
fn session_error(e: FetchError, shared: &Shared) -> Option<SessionError> {
    let max = shared.config.max_error_len;
    let err = match e {
        FetchError::Cancelled => return None,
        FetchError::ToolMissing { tool } => {
            let hint = install_hint(&tool);
            SessionError::Environment { tool, hint }
        }
        FetchError::Engine(raw) => {
            debug!(raw = %raw, "engine error");
            SessionError::Engine(user_message(&raw, shared.messages, max))
        }
        FetchError::Other(e) => {
            error!("unexpected fetch error: {:?}", e);
            SessionError::Unexpected { kind: "internal".to_string(), message: truncate_message(&format!("{:#}", e), max) }
        }
    };
    Some(err)
}

fn join_failure(join: JoinError, shared: &Shared) -> SessionError {
    let max = shared.config.max_error_len;
    if join.is_panic() {
        let detail = panic_text(join.into_panic());
        error!("fetch worker panicked: {}", detail);
        SessionError::Unexpected { kind: "panic".to_string(), message: truncate_message(&detail, max) }
    } else {
        error!("fetch worker aborted: {}", join);
        SessionError::Unexpected { kind: "aborted".to_string(), message: truncate_message(&join.to_string(), max) }
    }
}

fn panic_text(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
