//! Procedure lifecycle states and the events observers can hook into.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a procedure.
///
/// State transitions (monotonic):
/// - Initialized -> Pending      (added to a queue)
/// - Pending -> Executing        (all dependencies terminal, not cancelled)
/// - Pending -> Finishing        (cancelled, or an input requirement failed)
/// - Executing -> Finishing      (body returned, timed out, or children done)
/// - Finishing -> Finished
///
/// Cancellation is a flag next to the state, not a state of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProcedureState {
    Initialized,
    Pending,
    Executing,
    Finishing,
    Finished,
}

impl ProcedureState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcedureState::Finished)
    }

    /// Finishing or finished: `finish` has already been called once.
    pub fn is_finishing(self) -> bool {
        matches!(self, ProcedureState::Finishing | ProcedureState::Finished)
    }

    /// A state may only move forward.
    pub fn can_transition_to(self, next: ProcedureState) -> bool {
        next > self
    }
}

/// Lifecycle points at which observers are invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEvent {
    WillExecute,
    DidProduceResult,
    WillFinish,
    DidFinish,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ProcedureState::Initialized, ProcedureState::Pending, true)]
    #[case(ProcedureState::Pending, ProcedureState::Finishing, true)]
    #[case(ProcedureState::Executing, ProcedureState::Pending, false)]
    #[case(ProcedureState::Finished, ProcedureState::Finishing, false)]
    #[case(ProcedureState::Finished, ProcedureState::Finished, false)]
    fn transitions_are_monotonic(
        #[case] from: ProcedureState,
        #[case] to: ProcedureState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn only_finished_is_terminal() {
        assert!(ProcedureState::Finished.is_terminal());
        assert!(!ProcedureState::Finishing.is_terminal());
        assert!(ProcedureState::Finishing.is_finishing());
    }
}
