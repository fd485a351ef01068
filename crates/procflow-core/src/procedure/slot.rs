//! Result slots and procedure inputs.
//!
//! A `Slot` is the storage behind a result container: written at most once,
//! sealed when its owner finishes, readable by anyone afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use super::Value;
use crate::domain::Pending;
use crate::error::ProcedureError;

pub(crate) struct Slot<T> {
    state: RwLock<Pending<T>>,
    sealed: AtomicBool,
}

impl<T: Value> Slot<T> {
    pub(crate) fn new() -> Self {
        Self::with(Pending::Pending)
    }

    pub(crate) fn with(initial: Pending<T>) -> Self {
        Self {
            state: RwLock::new(initial),
            sealed: AtomicBool::new(false),
        }
    }

    pub(crate) fn get(&self) -> Pending<T> {
        self.state.read().clone()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&Pending<T>) -> R) -> R {
        f(&self.state.read())
    }

    /// Write once. Rejected when sealed or when a value is already present.
    pub(crate) fn fill(&self, value: Pending<T>) -> bool {
        if self.sealed.load(Ordering::Acquire) {
            return false;
        }
        let mut state = self.state.write();
        if !state.is_pending() || value.is_pending() {
            return false;
        }
        *state = value;
        true
    }
}

/// Type-erased sealing so the non-generic task core can seal its typed
/// output slot.
pub(crate) trait Sealable: Send + Sync {
    /// Seal the slot. A slot that is still pending becomes `Failed` with
    /// `error` when one is given.
    fn seal(&self, error: Option<&ProcedureError>);
}

impl<T: Value> Sealable for Slot<T> {
    fn seal(&self, error: Option<&ProcedureError>) {
        let mut state = self.state.write();
        if let (true, Some(err)) = (state.is_pending(), error) {
            *state = Pending::Failed(err.clone());
        }
        self.sealed.store(true, Ordering::Release);
    }
}

/// An input container owned by a procedure.
///
/// Either prefilled at construction (`Input::ready`) or populated by exactly
/// one injection from an upstream procedure.
pub struct Input<T> {
    slot: Arc<Slot<T>>,
    bound: Arc<AtomicBool>,
}

impl<T> Clone for Input<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            bound: Arc::clone(&self.bound),
        }
    }
}

impl<T: Value> Input<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Slot::new()),
            bound: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn ready(value: T) -> Self {
        Self {
            slot: Arc::new(Slot::with(Pending::Ready(value))),
            bound: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn get(&self) -> Pending<T> {
        self.slot.get()
    }

    pub fn value(&self) -> Option<T> {
        self.slot.read(|p| p.value().cloned())
    }

    /// The value, or the error a procedure should finish with when it is
    /// missing.
    pub fn require(&self) -> Result<T, ProcedureError> {
        match self.get() {
            Pending::Ready(value) => Ok(value),
            Pending::Failed(err) => Err(ProcedureError::requirement_caused_by(err)),
            Pending::Pending => Err(ProcedureError::requirement_not_satisfied()),
        }
    }

    /// Populate an unbound input by hand. Returns false if it already holds
    /// a value or an injection targets it.
    pub fn set(&self, value: T) -> bool {
        if self.bound.load(Ordering::Acquire) {
            return false;
        }
        self.slot.fill(Pending::Ready(value))
    }

    pub(crate) fn fill(&self, value: Pending<T>) -> bool {
        self.slot.fill(value)
    }

    /// Claim the input for an injection. Only the first claim on an input
    /// without a value succeeds.
    pub(crate) fn bind(&self) -> bool {
        if !self.slot.read(Pending::is_pending) {
            return false;
        }
        self.bound
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl<T: Value> Default for Input<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Value + std::fmt::Debug> std::fmt::Debug for Input<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Input").field(&self.get()).finish()
    }
}

/// Capability to map one value into another, used for per-item mapping and
/// for injection transforms.
///
/// Any `Fn(&I) -> O` closure is `Mappable`; annotate the parameter type so
/// the compiler can pick `I`.
pub trait Mappable<I, O>: Send + Sync {
    fn map(&self, input: &I) -> O;
}

impl<I, O, F> Mappable<I, O> for F
where
    F: Fn(&I) -> O + Send + Sync,
{
    fn map(&self, input: &I) -> O {
        self(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_is_write_once() {
        let slot = Slot::new();
        assert!(slot.fill(Pending::Ready(1)));
        assert!(!slot.fill(Pending::Ready(2)));
        assert_eq!(slot.get(), Pending::Ready(1));
    }

    #[test]
    fn sealing_a_pending_slot_records_the_error() {
        let slot: Slot<u8> = Slot::new();
        slot.seal(Some(&ProcedureError::Cancelled));
        assert_eq!(slot.get(), Pending::Failed(ProcedureError::Cancelled));
        assert!(!slot.fill(Pending::Ready(1)));
    }

    #[test]
    fn sealing_keeps_an_existing_value() {
        let slot = Slot::new();
        slot.fill(Pending::Ready("kept"));
        slot.seal(Some(&ProcedureError::failed("late error")));
        assert_eq!(slot.get(), Pending::Ready("kept"));
    }

    #[test]
    fn input_binds_once() {
        let input: Input<u32> = Input::new();
        let alias = input.clone();
        assert!(input.bind());
        assert!(!alias.bind());
    }

    #[test]
    fn prefilled_input_cannot_be_bound() {
        let input = Input::ready(5u32);
        assert!(!input.bind());
        assert_eq!(input.value(), Some(5));
    }

    #[test]
    fn bound_input_refuses_manual_values() {
        let input: Input<u32> = Input::new();
        assert!(input.bind());
        assert!(!input.set(1));
        assert_eq!(input.get(), Pending::Pending);
    }

    #[test]
    fn require_wraps_upstream_failure() {
        let input: Input<u32> = Input::new();
        input.fill(Pending::Failed(ProcedureError::failed("upstream")));
        let err = input.require().unwrap_err();
        assert_eq!(err.root_cause(), &ProcedureError::failed("upstream"));
    }

    #[test]
    fn closures_are_mappable() {
        let double = |n: &u32| n * 2;
        assert_eq!(Mappable::map(&double, &21), 42);
    }
}
