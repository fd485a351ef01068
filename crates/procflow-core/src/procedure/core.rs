//! The non-generic half of a procedure: identity, lifecycle state machine,
//! cancellation flag, error list and observers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace};

use super::observer::{ObserverFn, Observers, ProcedureInfo};
use super::slot::Sealable;
use crate::domain::{LifecycleEvent, ProcedureId, ProcedureState};
use crate::error::ProcedureError;

pub(crate) struct TaskCore {
    info: ProcedureInfo,
    state: Mutex<ProcedureState>,
    errors: Mutex<Vec<ProcedureError>>,
    observers: Mutex<Observers>,
    output: Arc<dyn Sealable>,
    attempts: AtomicU32,
    cancelled: watch::Sender<bool>,
    finished: watch::Sender<bool>,
}

impl TaskCore {
    pub(crate) fn new(name: String, output: Arc<dyn Sealable>) -> Self {
        Self {
            info: ProcedureInfo {
                id: ProcedureId::generate(),
                name,
            },
            state: Mutex::new(ProcedureState::Initialized),
            errors: Mutex::new(Vec::new()),
            observers: Mutex::new(Observers::default()),
            output,
            attempts: AtomicU32::new(0),
            cancelled: watch::Sender::new(false),
            finished: watch::Sender::new(false),
        }
    }

    pub(crate) fn id(&self) -> ProcedureId {
        self.info.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.info.name
    }

    pub(crate) fn info(&self) -> &ProcedureInfo {
        &self.info
    }

    pub(crate) fn state(&self) -> ProcedureState {
        *self.state.lock()
    }

    /// Move forward to `next`. Returns false for a backwards or repeated
    /// transition, which leaves the state untouched.
    pub(crate) fn advance(&self, next: ProcedureState) -> bool {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            return false;
        }
        trace!(procedure = %self.info.id, from = ?*state, to = ?next, "transition");
        *state = next;
        true
    }

    pub(crate) fn errors(&self) -> Vec<ProcedureError> {
        self.errors.lock().clone()
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Start another execution attempt; returns its 1-based number.
    pub(crate) fn begin_attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Set the cancellation flag. Returns true the first time.
    pub(crate) fn cancel(&self) -> bool {
        self.cancelled.send_if_modified(|flag| !std::mem::replace(flag, true))
    }

    /// Resolves once the procedure is cancelled.
    pub(crate) async fn cancelled(&self) {
        let mut rx = self.cancelled.subscribe();
        // The sender lives as long as `self`, so the channel cannot close.
        let _ = rx.wait_for(|flag| *flag).await;
    }

    pub(crate) fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    /// Resolves once the procedure reached `Finished`.
    pub(crate) async fn wait_finished(&self) {
        let mut rx = self.finished.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    pub(crate) fn add_observer(
        &self,
        event: LifecycleEvent,
        observer: ObserverFn,
    ) -> Result<(), ObserverFn> {
        self.observers.lock().register(event, observer)
    }

    /// Invoke the observers of `event`. The registry lock is released first
    /// so observers may register further observers.
    pub(crate) fn fire(&self, event: LifecycleEvent) {
        let observers = self.observers.lock().take(event);
        if observers.is_empty() {
            return;
        }
        let errors = self.errors();
        for observer in observers {
            observer(&self.info, &errors);
        }
    }

    /// Finish the procedure with `errors`. The first call wins; later calls
    /// return false and change nothing.
    ///
    /// Order: record errors, will-finish observers, seal output, `Finished`,
    /// did-finish observers, wake waiters.
    pub(crate) fn finish(&self, errors: Vec<ProcedureError>) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_finishing() {
                return false;
            }
            *state = ProcedureState::Finishing;
        }
        self.errors.lock().extend(errors);

        self.fire(LifecycleEvent::WillFinish);

        let errors = self.errors();
        self.output.seal(errors.first());
        *self.state.lock() = ProcedureState::Finished;
        debug!(
            procedure = %self.info.id,
            name = %self.info.name,
            errors = errors.len(),
            cancelled = self.is_cancelled(),
            "finished"
        );

        self.fire(LifecycleEvent::DidFinish);
        self.finished.send_replace(true);
        true
    }
}
