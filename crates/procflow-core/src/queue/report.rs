//! Run report: what finished, in which order, with which errors.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::domain::{ProcedureId, QueueId};
use crate::error::ProcedureError;
use crate::procedure::TaskCore;

#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub id: ProcedureId,
    pub name: String,
    pub cancelled: bool,
    #[serde(serialize_with = "errors_as_strings")]
    pub errors: Vec<ProcedureError>,
    pub finished_at: DateTime<Utc>,
}

impl ReportEntry {
    pub(crate) fn from_core(core: &TaskCore) -> Self {
        Self {
            id: core.id(),
            name: core.name().to_string(),
            cancelled: core.is_cancelled(),
            errors: core.errors(),
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One failed procedure error, as listed by `RunReport::failures`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Failure<'a> {
    pub id: ProcedureId,
    pub name: &'a str,
    pub error: &'a ProcedureError,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub queue: QueueId,
    /// Finished procedures in finish order.
    pub finished: Vec<ReportEntry>,
    /// Registered procedures that have not finished, in insertion order.
    pub unfinished: Vec<ProcedureId>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.unfinished.is_empty() && self.finished.iter().all(ReportEntry::is_success)
    }

    pub fn entry(&self, id: ProcedureId) -> Option<&ReportEntry> {
        self.finished.iter().find(|e| e.id == id)
    }

    /// Every recorded error with its procedure, in finish order.
    pub fn failures(&self) -> Vec<Failure<'_>> {
        self.finished
            .iter()
            .flat_map(|entry| {
                entry.errors.iter().map(move |error| Failure {
                    id: entry.id,
                    name: &entry.name,
                    error,
                })
            })
            .collect()
    }
}

fn errors_as_strings<S: Serializer>(errors: &[ProcedureError], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(errors.iter().map(ToString::to_string))
}
