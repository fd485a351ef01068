//! Erased procedure bodies: the leaf/composite variant the queue runs.

use std::sync::Arc;

use async_trait::async_trait;

use super::group::GroupPolicy;
use super::slot::Slot;
use super::{Executable, Handle, Procedure, ProcedureContext};
use crate::domain::Pending;
use crate::error::ProcedureError;
use crate::queue::ProcedureQueue;

pub(crate) enum Body {
    Leaf(Box<dyn LeafBody>),
    Composite(Box<dyn CompositeBody>),
}

impl Body {
    /// Drop a body that will never run. Group children that never joined a
    /// queue are finished as cancelled so their handles resolve.
    pub(crate) fn discard(&self) {
        if let Body::Composite(group) = self {
            group.discard();
        }
    }
}

/// Opaque wrapper around a `Body`, the only thing `Executable` can produce.
pub struct Runnable {
    pub(crate) body: Body,
}

#[async_trait]
pub(crate) trait LeafBody: Send + Sync {
    /// Run once and store the produced value in the output slot. Called
    /// again for retries.
    async fn run(&self, cx: &ProcedureContext) -> Result<(), ProcedureError>;
}

#[async_trait]
pub(crate) trait CompositeBody: Send + Sync {
    fn policy(&self) -> GroupPolicy;

    /// Add the children to `inner` (still suspended) and run the group's
    /// compose hook.
    async fn compose(
        &self,
        cx: &ProcedureContext,
        inner: &ProcedureQueue,
    ) -> Result<(), ProcedureError>;

    /// The output slot holds a value.
    fn has_output(&self) -> bool;

    fn discard(&self);
}

struct LeafRunner<P: Procedure> {
    procedure: P,
    output: Arc<Slot<P::Output>>,
}

#[async_trait]
impl<P: Procedure> LeafBody for LeafRunner<P> {
    async fn run(&self, cx: &ProcedureContext) -> Result<(), ProcedureError> {
        let value = self.procedure.execute(cx).await?;
        self.output.fill(Pending::Ready(value));
        Ok(())
    }
}

impl<P: Procedure> Executable for P {
    type Output = P::Output;

    fn default_name(&self) -> String {
        Procedure::name(self)
    }

    fn into_runnable(self, handle: &Handle<Self::Output>) -> Runnable {
        Runnable {
            body: Body::Leaf(Box::new(LeafRunner {
                procedure: self,
                output: handle.slot(),
            })),
        }
    }
}
