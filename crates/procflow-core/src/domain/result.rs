//! Result containers: the unit of typed handoff between procedures.

use crate::error::ProcedureError;

/// Tri-state result container used for procedure inputs and outputs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Pending<T> {
    #[default]
    Pending,
    Ready(T),
    Failed(ProcedureError),
}

impl<T> Pending<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Pending::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Pending::Ready(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Pending::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ProcedureError> {
        match self {
            Pending::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> Pending<&T> {
        match self {
            Pending::Pending => Pending::Pending,
            Pending::Ready(value) => Pending::Ready(value),
            Pending::Failed(err) => Pending::Failed(err.clone()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Pending<U> {
        match self {
            Pending::Pending => Pending::Pending,
            Pending::Ready(value) => Pending::Ready(f(value)),
            Pending::Failed(err) => Pending::Failed(err),
        }
    }

    /// Collapse into a `Result`; a value that never arrived is a
    /// requirement failure.
    pub fn into_result(self) -> Result<T, ProcedureError> {
        match self {
            Pending::Ready(value) => Ok(value),
            Pending::Failed(err) => Err(err),
            Pending::Pending => Err(ProcedureError::requirement_not_satisfied()),
        }
    }
}

impl<T> From<Result<T, ProcedureError>> for Pending<T> {
    fn from(result: Result<T, ProcedureError>) -> Self {
        match result {
            Ok(value) => Pending::Ready(value),
            Err(err) => Pending::Failed(err),
        }
    }
}

/// What a caller observes once a procedure has finished: its sealed output
/// and every error it finished with.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub output: Pending<T>,
    pub errors: Vec<ProcedureError>,
    pub cancelled: bool,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Either the full output or the ordered error list.
    pub fn into_result(self) -> Result<T, Vec<ProcedureError>> {
        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        self.output.into_result().map_err(|err| vec![err])
    }
}
