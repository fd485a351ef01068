//! Procedures: the units of work composed into a queue.
//!
//! Two layers:
//! - **Typed**: `Procedure` (leaf) and `GroupProcedure` (composite) traits,
//!   `Task<P>` to configure one before it is queued, `Handle<T>` to read its
//!   result afterwards.
//! - **Erased**: the queue only sees a `TaskCore` plus a `Body`, the tagged
//!   leaf/composite variant produced by `Executable::into_runnable`.

mod binder;
mod body;
mod builtin;
pub(crate) mod core;
mod group;
mod observer;
mod slot;
mod task;

use std::sync::Arc;

use async_trait::async_trait;

pub use self::body::Runnable;
pub use self::builtin::{BlockProcedure, ResultProcedure, TransformProcedure};
pub use self::group::{Children, Group, GroupContext, GroupPolicy, GroupProcedure, ResultOf};
pub use self::observer::{ObserverFn, ProcedureInfo};
pub use self::slot::{Input, Mappable};
pub use self::task::{Handle, Task};

pub(crate) use self::binder::Requirement;
pub(crate) use self::body::{Body, CompositeBody, LeafBody};
pub(crate) use self::core::TaskCore;
pub(crate) use self::task::PreparedTask;

use crate::domain::ProcedureId;
use crate::error::ProcedureError;
use crate::queue::ProcedureQueue;

/// Values that can travel between procedures.
pub trait Value: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Value for T {}

/// A leaf procedure: runs once its dependencies finished and produces a
/// typed output.
///
/// # Example
/// ```ignore
/// struct Double { input: Input<u32> }
///
/// #[async_trait]
/// impl Procedure for Double {
///     type Output = u32;
///
///     async fn execute(&self, _cx: &ProcedureContext) -> Result<u32, ProcedureError> {
///         Ok(self.input.require()? * 2)
///     }
/// }
/// ```
#[async_trait]
pub trait Procedure: Send + Sync + 'static {
    type Output: Value;

    fn name(&self) -> String {
        short_type_name::<Self>()
    }

    /// Long-running bodies should poll `cx.is_cancelled()`.
    async fn execute(&self, cx: &ProcedureContext) -> Result<Self::Output, ProcedureError>;
}

/// A procedure with one primary input, so it can be wired with
/// `Task::inject_result`.
pub trait InputProcedure {
    type Input: Value;

    fn input(&self) -> &Input<Self::Input>;
}

/// Anything a `Task` can wrap: every `Procedure`, and `Group<G>`.
pub trait Executable: Send + Sync + 'static {
    type Output: Value;

    fn default_name(&self) -> String;

    #[doc(hidden)]
    fn into_runnable(self, handle: &Handle<Self::Output>) -> Runnable;
}

/// Runtime view handed to a procedure while it executes.
#[derive(Clone)]
pub struct ProcedureContext {
    core: Arc<TaskCore>,
    queue: ProcedureQueue,
}

impl ProcedureContext {
    pub(crate) fn new(core: Arc<TaskCore>, queue: ProcedureQueue) -> Self {
        Self { core, queue }
    }

    pub fn id(&self) -> ProcedureId {
        self.core.id()
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// 1-based attempt number; above 1 only for retried leaves.
    pub fn attempt(&self) -> u32 {
        self.core.attempts()
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check_cancelled(&self) -> Result<(), ProcedureError> {
        if self.is_cancelled() {
            return Err(ProcedureError::Cancelled);
        }
        Ok(())
    }

    /// Resolves when the procedure is cancelled.
    pub async fn cancelled(&self) {
        self.core.cancelled().await
    }

    /// The queue this procedure runs in. Inside a group this is the group's
    /// own queue, which lets a running child add siblings.
    pub fn queue(&self) -> &ProcedureQueue {
        &self.queue
    }

    pub(crate) fn core(&self) -> &Arc<TaskCore> {
        &self.core
    }
}

/// `a::b::Thing<c::D>` -> `Thing`
pub(crate) fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample<T>(T);

    #[test]
    fn short_type_name_strips_paths_and_generics() {
        assert_eq!(short_type_name::<Sample<Vec<String>>>(), "Sample");
        assert_eq!(short_type_name::<u32>(), "u32");
    }
}
