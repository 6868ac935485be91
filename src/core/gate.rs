use crate::core::error::Cancelled;
use crate::core::model::SessionState;
use crate::core::progress::RawProgress;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

struct Control {
    state: SessionState,
    /// Pause gate: closed while true.
    paused: bool,
    /// One-way.
    cancel_requested: bool,
}

/// Session state, pause gate and cancel flag behind one lock, so the worker's
/// checkpoint and the UI's pause/resume/cancel always agree.
pub struct ControlGate {
    control: Mutex<Control>,
    wake: Condvar,
    poll: Duration,
    observer: Option<StateObserver>,
}

/// Called with every applied state, under the gate lock, so observers see
/// changes in the order they happened.
pub type StateObserver = Box<dyn Fn(SessionState) + Send + Sync>;

impl ControlGate {
    /// A fresh gate is open, not cancelled, in `Resolving`.
    pub fn new(poll: Duration) -> Self {
        Self {
            control: Mutex::new(Control {
                state: SessionState::Resolving,
                paused: false,
                cancel_requested: false,
            }),
            wake: Condvar::new(),
            poll: poll.max(Duration::from_millis(1)),
            observer: None,
        }
    }

    pub fn with_observer(poll: Duration, observer: StateObserver) -> Self {
        Self { observer: Some(observer), ..Self::new(poll) }
    }

    fn set(&self, c: &mut Control, next: SessionState) {
        c.state = next;
        if let Some(observe) = &self.observer {
            observe(next);
        }
    }

    pub fn state(&self) -> SessionState {
        self.control.lock().state
    }

    pub fn cancel_requested(&self) -> bool {
        self.control.lock().cancel_requested
    }

    /// Applies `next` if the state machine allows it. Returns whether it did.
    pub fn transition(&self, next: SessionState) -> bool {
        let mut c = self.control.lock();
        if !c.state.can_transition_to(next) {
            return false;
        }
        self.set(&mut c, next);
        if next != SessionState::Paused {
            c.paused = false;
        }
        drop(c);
        self.wake.notify_all();
        true
    }

    /// `Resolving -> Active` on the first transfer sample. Unlike
    /// `transition`, never reopens a paused gate.
    pub fn activate(&self) -> bool {
        let mut c = self.control.lock();
        if c.state != SessionState::Resolving {
            return false;
        }
        self.set(&mut c, SessionState::Active);
        true
    }

    pub fn pause(&self) -> bool {
        let mut c = self.control.lock();
        if c.state != SessionState::Active {
            return false;
        }
        c.paused = true;
        self.set(&mut c, SessionState::Paused);
        true
    }

    pub fn resume(&self) -> bool {
        let mut c = self.control.lock();
        if c.state != SessionState::Paused {
            return false;
        }
        c.paused = false;
        self.set(&mut c, SessionState::Active);
        drop(c);
        self.wake.notify_all();
        true
    }

    /// Sets the cancel flag and reopens the gate so a paused worker unwinds.
    /// Returns false when there was nothing to cancel (already cancelling or
    /// terminal).
    pub fn request_cancel(&self) -> bool {
        let mut c = self.control.lock();
        if !c.state.can_transition_to(SessionState::Cancelling) {
            return false;
        }
        c.cancel_requested = true;
        c.paused = false;
        self.set(&mut c, SessionState::Cancelling);
        drop(c);
        self.wake.notify_all();
        true
    }

    /// Blocks while the gate is closed. Returns `Err(Cancelled)` once cancel
    /// was requested, paused or not. The bounded wait keeps cancellation
    /// responsive even if a wake-up is missed.
    pub fn wait(&self) -> Result<(), Cancelled> {
        let mut c = self.control.lock();
        loop {
            if c.cancel_requested {
                return Err(Cancelled);
            }
            if !c.paused {
                return Ok(());
            }
            self.wake.wait_for(&mut c, self.poll);
        }
    }

    /// Waits up to `dur` unless cancelled first, then behaves like `wait`.
    /// Engines use this instead of sleeping between ticks.
    pub fn idle(&self, dur: Duration) -> Result<(), Cancelled> {
        {
            let mut c = self.control.lock();
            if !c.cancel_requested {
                self.wake.wait_for(&mut c, dur);
            }
        }
        self.wait()
    }
}

/// Receives raw samples that made it past the checkpoint.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: RawProgress);
}

/// Handed to the engine adapter. The adapter must call `wait` or `report` at
/// every natural progress boundary.
#[derive(Clone)]
pub struct Checkpoint {
    gate: Arc<ControlGate>,
    sink: Arc<dyn ProgressSink>,
}

impl Checkpoint {
    pub fn new(gate: Arc<ControlGate>, sink: Arc<dyn ProgressSink>) -> Self {
        Self { gate, sink }
    }

    pub fn wait(&self) -> Result<(), Cancelled> {
        self.gate.wait()
    }

    pub fn idle(&self, dur: Duration) -> Result<(), Cancelled> {
        self.gate.idle(dur)
    }

    /// Checkpoint, then forward `event`.
    pub fn report(&self, event: RawProgress) -> Result<(), Cancelled> {
        self.gate.wait()?;
        self.sink.on_progress(event);
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.gate.cancel_requested()
    }
}
