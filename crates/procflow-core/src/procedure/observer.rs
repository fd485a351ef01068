//! Per-procedure observer registry.

use crate::domain::{LifecycleEvent, ProcedureId};
use crate::error::ProcedureError;

/// Identity of the procedure an observer is invoked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureInfo {
    pub id: ProcedureId,
    pub name: String,
}

/// Callback bound to one lifecycle event. Receives the errors recorded so
/// far (empty before the procedure starts finishing).
pub type ObserverFn = Box<dyn FnOnce(&ProcedureInfo, &[ProcedureError]) + Send + 'static>;

/// Ordered observer list owned by one procedure.
///
/// Each event happens once per procedure; once fired, its observers are
/// dropped and late registrations for it are refused.
#[derive(Default)]
pub(crate) struct Observers {
    entries: Vec<(LifecycleEvent, ObserverFn)>,
    fired: Vec<LifecycleEvent>,
}

impl Observers {
    /// Register an observer. Hands it back when the event already fired.
    pub(crate) fn register(
        &mut self,
        event: LifecycleEvent,
        observer: ObserverFn,
    ) -> Result<(), ObserverFn> {
        if self.fired.contains(&event) {
            return Err(observer);
        }
        self.entries.push((event, observer));
        Ok(())
    }

    /// Mark `event` as fired and take its observers in registration order.
    pub(crate) fn take(&mut self, event: LifecycleEvent) -> Vec<ObserverFn> {
        self.fired.push(event);
        let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|(e, _)| *e == event);
        self.entries = rest;
        matching.into_iter().map(|(_, observer)| observer).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn info() -> ProcedureInfo {
        ProcedureInfo {
            id: ProcedureId::generate(),
            name: "sample".into(),
        }
    }

    #[test]
    fn take_preserves_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut observers = Observers::default();
        for n in 0..3 {
            let log = Arc::clone(&log);
            observers
                .register(
                    LifecycleEvent::WillFinish,
                    Box::new(move |_, _| log.lock().unwrap().push(n)),
                )
                .ok()
                .unwrap();
        }
        observers
            .register(LifecycleEvent::DidFinish, Box::new(|_, _| {}))
            .ok()
            .unwrap();

        for observer in observers.take(LifecycleEvent::WillFinish) {
            observer(&info(), &[]);
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(observers.len(), 1);
    }

    #[test]
    fn late_registration_is_refused() {
        let mut observers = Observers::default();
        observers.take(LifecycleEvent::WillExecute);
        let refused = observers.register(LifecycleEvent::WillExecute, Box::new(|_, _| {}));
        assert!(refused.is_err());
    }
}
