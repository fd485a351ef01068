//! Error types shared by the engine and the store adapter.

use std::time::Duration;

use thiserror::Error;

use crate::domain::{ProcedureId, ProcedureState};
use crate::store::StoreError;

/// ErrorKind classifies a [`ProcedureError`] without its payload.
///
/// Useful for assertions and for the run report, where the message is
/// secondary to "what class of failure was this".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RequirementNotSatisfied,
    CycleDetected,
    UnknownTask,
    DuplicateTask,
    InvalidState,
    InputAlreadyBound,
    TimedOut,
    Cancelled,
    Failed,
    Store,
}

/// Errors recorded by a procedure when it finishes, or returned by the
/// queue's structural operations.
///
/// Cloneable because one failure fans out to every consumer injected from
/// the failed producer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcedureError {
    #[error("requirement not satisfied{}", describe_upstream(.upstream))]
    RequirementNotSatisfied {
        upstream: Option<Box<ProcedureError>>,
    },

    #[error("dependency cycle detected: {cycle:?}")]
    CycleDetected { cycle: Vec<ProcedureId> },

    #[error("unknown procedure {0}")]
    UnknownTask(ProcedureId),

    #[error("procedure {0} is already registered")]
    DuplicateTask(ProcedureId),

    #[error("procedure {id} is {state:?}, operation not permitted")]
    InvalidState { id: ProcedureId, state: ProcedureState },

    #[error("input of procedure {consumer} is already bound or holds a value")]
    InputAlreadyBound { consumer: ProcedureId },

    #[error("timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn describe_upstream(upstream: &Option<Box<ProcedureError>>) -> String {
    match upstream {
        Some(err) => format!(" (upstream: {err})"),
        None => String::new(),
    }
}

impl ProcedureError {
    pub fn failed(message: impl Into<String>) -> Self {
        ProcedureError::Failed(message.into())
    }

    /// A requirement error with no upstream cause, e.g. an input that was
    /// never produced.
    pub fn requirement_not_satisfied() -> Self {
        ProcedureError::RequirementNotSatisfied { upstream: None }
    }

    pub fn requirement_caused_by(upstream: ProcedureError) -> Self {
        ProcedureError::RequirementNotSatisfied {
            upstream: Some(Box::new(upstream)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcedureError::RequirementNotSatisfied { .. } => ErrorKind::RequirementNotSatisfied,
            ProcedureError::CycleDetected { .. } => ErrorKind::CycleDetected,
            ProcedureError::UnknownTask(_) => ErrorKind::UnknownTask,
            ProcedureError::DuplicateTask(_) => ErrorKind::DuplicateTask,
            ProcedureError::InvalidState { .. } => ErrorKind::InvalidState,
            ProcedureError::InputAlreadyBound { .. } => ErrorKind::InputAlreadyBound,
            ProcedureError::TimedOut { .. } => ErrorKind::TimedOut,
            ProcedureError::Cancelled => ErrorKind::Cancelled,
            ProcedureError::Failed(_) => ErrorKind::Failed,
            ProcedureError::Store(_) => ErrorKind::Store,
        }
    }

    /// The root cause behind any chain of `RequirementNotSatisfied`.
    pub fn root_cause(&self) -> &ProcedureError {
        match self {
            ProcedureError::RequirementNotSatisfied {
                upstream: Some(inner),
            } => inner.root_cause(),
            other => other,
        }
    }
}
