//! Result injection: "this procedure's input = that procedure's output".

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::Value;
use super::slot::{Input, Mappable, Slot};
use crate::domain::{Pending, ProcedureId};
use crate::error::ProcedureError;

/// An input requirement of a consumer, checked right before it executes.
pub(crate) trait Requirement: Send + Sync {
    fn producer(&self) -> ProcedureId;

    /// Copy the producer's output into the consumer's input. Exactly once
    /// the output is no longer pending; later calls are no-ops.
    fn propagate(&self);

    /// `None` when the input is ready.
    fn unsatisfied(&self) -> Option<ProcedureError>;
}

pub(crate) struct Binding<U, T> {
    producer: ProcedureId,
    source: Arc<Slot<U>>,
    target: Input<T>,
    transform: Box<dyn Mappable<Pending<U>, Pending<T>>>,
    applied: AtomicBool,
}

impl<U: Value, T: Value> Binding<U, T> {
    pub(crate) fn new(
        producer: ProcedureId,
        source: Arc<Slot<U>>,
        target: Input<T>,
        transform: Box<dyn Mappable<Pending<U>, Pending<T>>>,
    ) -> Self {
        Self {
            producer,
            source,
            target,
            transform,
            applied: AtomicBool::new(false),
        }
    }
}

impl<T: Value> Binding<T, T> {
    pub(crate) fn direct(producer: ProcedureId, source: Arc<Slot<T>>, target: Input<T>) -> Self {
        Self::new(
            producer,
            source,
            target,
            Box::new(|pending: &Pending<T>| pending.clone()),
        )
    }
}

impl<U: Value, T: Value> Requirement for Binding<U, T> {
    fn producer(&self) -> ProcedureId {
        self.producer
    }

    fn propagate(&self) {
        // A failing producer is still pending at will-finish; it is sealed
        // as failed right after.
        if self.source.read(Pending::is_pending) || self.applied.swap(true, Ordering::AcqRel) {
            return;
        }
        let value = self.source.read(|pending| self.transform.map(pending));
        self.target.fill(value);
    }

    fn unsatisfied(&self) -> Option<ProcedureError> {
        match self.target.get() {
            Pending::Ready(_) => None,
            Pending::Failed(err) => Some(ProcedureError::requirement_caused_by(err)),
            Pending::Pending => Some(ProcedureError::requirement_not_satisfied()),
        }
    }
}
