//! Group procedures: a procedure that runs child procedures on its own inner
//! queue and finishes once all of them finished.

use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::body::{Body, CompositeBody, Runnable};
use super::slot::{Input, Mappable, Slot};
use super::task::PreparedTask;
use super::{
    Executable, Handle, InputProcedure, ProcedureContext, Task, Value, short_type_name,
};
use crate::domain::{LifecycleEvent, Pending, ProcedureId};
use crate::error::ProcedureError;
use crate::queue::ProcedureQueue;

/// How a group's inner queue reacts to child failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupPolicy {
    /// Cancel the remaining children as soon as one finishes with errors.
    pub cancel_on_first_error: bool,
}

impl GroupPolicy {
    pub fn cancel_on_first_error() -> Self {
        Self {
            cancel_on_first_error: true,
        }
    }
}

/// The composite counterpart of `Procedure`.
///
/// `compose` runs when the group starts executing, after the initial
/// children joined the inner queue and before any of them runs. It may add
/// more children and must decide where the group's output comes from.
#[async_trait]
pub trait GroupProcedure: Send + Sync + 'static {
    type Output: Value;

    fn name(&self) -> String {
        short_type_name::<Self>()
    }

    async fn compose(
        &self,
        group: &mut GroupContext<'_, Self::Output>,
    ) -> Result<(), ProcedureError>;
}

/// A group of child tasks around a `GroupProcedure`.
pub struct Group<G: GroupProcedure = Children> {
    procedure: G,
    children: Mutex<Vec<PreparedTask>>,
    policy: GroupPolicy,
}

impl Group<Children> {
    /// A plain group producing `()`.
    pub fn new() -> Self {
        Self::with(Children)
    }
}

impl Default for Group<Children> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Value> Group<ResultOf<T>> {
    /// A group whose output is the output of `source`, one of its children.
    pub fn returning(source: &Handle<T>) -> Self {
        Self::with(ResultOf {
            source: source.clone(),
        })
    }
}

impl<G: GroupProcedure> Group<G> {
    pub fn with(procedure: G) -> Self {
        Self {
            procedure,
            children: Mutex::new(Vec::new()),
            policy: GroupPolicy::default(),
        }
    }

    pub fn child<P: Executable>(mut self, task: Task<P>) -> Self {
        self.children.get_mut().push(task.into_prepared());
        self
    }

    pub fn with_policy(mut self, policy: GroupPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn child_ids(&self) -> Vec<ProcedureId> {
        self.children.lock().iter().map(|c| c.core.id()).collect()
    }
}

impl<G: GroupProcedure> Deref for Group<G> {
    type Target = G;

    fn deref(&self) -> &G {
        &self.procedure
    }
}

impl<G: GroupProcedure + InputProcedure> InputProcedure for Group<G> {
    type Input = G::Input;

    fn input(&self) -> &Input<G::Input> {
        self.procedure.input()
    }
}

impl<G: GroupProcedure> Executable for Group<G> {
    type Output = G::Output;

    fn default_name(&self) -> String {
        self.procedure.name()
    }

    fn into_runnable(self, handle: &Handle<G::Output>) -> Runnable {
        Runnable {
            body: Body::Composite(Box::new(CompositeRunner {
                group: self,
                output: handle.slot(),
            })),
        }
    }
}

struct CompositeRunner<G: GroupProcedure> {
    group: Group<G>,
    output: Arc<Slot<G::Output>>,
}

#[async_trait]
impl<G: GroupProcedure> CompositeBody for CompositeRunner<G> {
    fn policy(&self) -> GroupPolicy {
        self.group.policy
    }

    async fn compose(
        &self,
        cx: &ProcedureContext,
        inner: &ProcedureQueue,
    ) -> Result<(), ProcedureError> {
        let children = std::mem::take(&mut *self.group.children.lock());
        for child in children {
            inner.insert(child).await?;
        }
        let mut group = GroupContext {
            cx,
            queue: inner,
            output: Arc::clone(&self.output),
        };
        self.group.procedure.compose(&mut group).await
    }

    fn has_output(&self) -> bool {
        self.output.read(|pending| pending.value().is_some())
    }

    fn discard(&self) {
        let children = std::mem::take(&mut *self.group.children.lock());
        for child in children {
            child.core.cancel();
            child.body.discard();
            child.core.finish(vec![ProcedureError::Cancelled]);
        }
    }
}

/// What a group sees while composing.
pub struct GroupContext<'a, T> {
    cx: &'a ProcedureContext,
    queue: &'a ProcedureQueue,
    output: Arc<Slot<T>>,
}

impl<'a, T: Value> GroupContext<'a, T> {
    pub fn id(&self) -> ProcedureId {
        self.cx.id()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cx.is_cancelled()
    }

    /// The group's own execution context.
    pub fn context(&self) -> &ProcedureContext {
        self.cx
    }

    /// The inner queue children run on.
    pub fn queue(&self) -> &ProcedureQueue {
        self.queue
    }

    pub async fn add_child<P: Executable>(
        &mut self,
        task: Task<P>,
    ) -> Result<Handle<P::Output>, ProcedureError> {
        self.queue.add(task).await
    }

    /// Set the group's output directly. False if it was already set.
    pub fn set_output(&self, value: T) -> bool {
        self.output.fill(Pending::Ready(value))
    }

    /// Make the group's output the output of `child` once it finishes.
    pub fn output_from(&self, child: &Handle<T>) {
        self.output_from_mapped(child, |pending: &Pending<T>| pending.clone())
    }

    pub fn output_from_mapped<U: Value>(
        &self,
        child: &Handle<U>,
        transform: impl Mappable<Pending<U>, Pending<T>> + 'static,
    ) {
        let target = Arc::clone(&self.output);
        let source = child.slot();
        let copy: super::ObserverFn = Box::new(move |_, errors| {
            // A failing child is not sealed yet at will-finish.
            let value = source.read(|pending| match (pending, errors.first()) {
                (Pending::Pending, Some(err)) => transform.map(&Pending::Failed(err.clone())),
                _ => transform.map(pending),
            });
            target.fill(value);
        });
        // Child already past will-finish: its output is final, copy now.
        if let Err(copy) = child.core().add_observer(LifecycleEvent::WillFinish, copy) {
            copy(child.core().info(), &child.errors());
        }
    }
}

/// Group body that only runs its children. Output: `()`.
pub struct Children;

#[async_trait]
impl GroupProcedure for Children {
    type Output = ();

    fn name(&self) -> String {
        "Group".to_string()
    }

    async fn compose(&self, group: &mut GroupContext<'_, ()>) -> Result<(), ProcedureError> {
        group.set_output(());
        Ok(())
    }
}

/// Group body whose output is one designated child's output.
pub struct ResultOf<T> {
    source: Handle<T>,
}

#[async_trait]
impl<T: Value> GroupProcedure for ResultOf<T> {
    type Output = T;

    fn name(&self) -> String {
        "Group".to_string()
    }

    async fn compose(&self, group: &mut GroupContext<'_, T>) -> Result<(), ProcedureError> {
        group.output_from(&self.source);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::error::ErrorKind;
    use crate::procedure::{BlockProcedure, Procedure, ResultProcedure, TransformProcedure};

    /// Runs until cancelled.
    struct UntilCancelled;

    #[async_trait]
    impl Procedure for UntilCancelled {
        type Output = ();

        async fn execute(&self, cx: &ProcedureContext) -> Result<(), ProcedureError> {
            cx.cancelled().await;
            Err(ProcedureError::Cancelled)
        }
    }

    /// Adds `count` siblings from inside `execute`, each adding its index to
    /// `sum`. Keeps the queue it ran on.
    struct FanOut {
        count: u32,
        sum: Arc<AtomicU32>,
        queue: Arc<Mutex<Option<ProcedureQueue>>>,
    }

    #[async_trait]
    impl Procedure for FanOut {
        type Output = ();

        async fn execute(&self, cx: &ProcedureContext) -> Result<(), ProcedureError> {
            *self.queue.lock() = Some(cx.queue().clone());
            for n in 1..=self.count {
                let sum = Arc::clone(&self.sum);
                cx.queue()
                    .add(Task::new(BlockProcedure::new(move |_| {
                        sum.fetch_add(n, Ordering::SeqCst);
                        Ok(())
                    })))
                    .await?;
            }
            Ok(())
        }
    }

    /// Group whose output is the sum of its input, computed by a child.
    struct Summing {
        input: Input<Vec<u32>>,
    }

    impl InputProcedure for Summing {
        type Input = Vec<u32>;

        fn input(&self) -> &Input<Vec<u32>> {
            &self.input
        }
    }

    #[async_trait]
    impl GroupProcedure for Summing {
        type Output = u32;

        async fn compose(&self, group: &mut GroupContext<'_, u32>) -> Result<(), ProcedureError> {
            let values = self.input.require()?;
            let sum = group
                .add_child(Task::new(
                    TransformProcedure::new(|v: &Vec<u32>| v.iter().sum::<u32>()).with_input(values),
                ))
                .await?;
            group.output_from(&sum);
            Ok(())
        }
    }

    #[tokio::test]
    async fn group_output_comes_from_designated_child_and_errors_aggregate() {
        let queue = ProcedureQueue::new();
        let value = Task::new(ResultProcedure::value(5u32));
        let group = Group::returning(&value.handle())
            .child(value)
            .child(Task::new(BlockProcedure::new(|_| {
                Err(ProcedureError::failed("side"))
            })));

        assert_eq!(group.child_ids().len(), 2);

        let produced = Arc::new(parking_lot::Mutex::new(None));
        let seen = Arc::clone(&produced);
        let task = Task::new(group).on_did_produce_result(move |output, _| {
            *seen.lock() = output.value().copied();
        });
        let handle = queue.add(task).await.unwrap();
        let outcome = handle.finished().await;
        assert_eq!(outcome.output, Pending::Ready(5));
        assert_eq!(outcome.errors, vec![ProcedureError::failed("side")]);
        assert_eq!(*produced.lock(), Some(5));
    }

    #[tokio::test]
    async fn group_without_output_does_not_report_a_result() {
        let queue = ProcedureQueue::new();
        let missing = Task::new(ResultProcedure::<u32>::failing(ProcedureError::failed("none")));
        let group = Group::returning(&missing.handle()).child(missing);

        let produced = Arc::new(AtomicU32::new(0));
        let count = Arc::clone(&produced);
        let task = Task::new(group).on_did_produce_result(move |_, _| {
            count.fetch_add(1, Ordering::SeqCst);
        });
        let outcome = queue.add(task).await.unwrap().finished().await;
        assert_eq!(outcome.errors, vec![ProcedureError::failed("none")]);
        assert_eq!(produced.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn group_finishes_after_all_children() {
        let queue = ProcedureQueue::new();
        let slow = Task::new(BlockProcedure::new(|_| {
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(())
        }));
        let slow_handle = slow.handle();
        let handle = queue.add(Task::new(Group::new().child(slow))).await.unwrap();

        let outcome = handle.finished().await;
        assert!(outcome.is_success());
        assert!(slow_handle.is_finished());
    }

    #[tokio::test]
    async fn cancel_on_first_error_cancels_siblings() {
        let queue = ProcedureQueue::new();
        let group = Group::new()
            .with_policy(GroupPolicy::cancel_on_first_error())
            .child(Task::new(UntilCancelled))
            .child(Task::new(ResultProcedure::<u32>::failing(ProcedureError::failed("boom"))));

        let handle = queue.add(Task::new(group)).await.unwrap();
        let outcome = handle.finished().await;
        assert_eq!(
            outcome.errors,
            vec![ProcedureError::failed("boom"), ProcedureError::Cancelled]
        );
    }

    #[tokio::test]
    async fn cancelling_a_group_cancels_its_children() {
        let queue = ProcedureQueue::new();
        let child = Task::new(UntilCancelled);
        let child_handle = child.handle();
        let group = queue.add(Task::new(Group::new().child(child))).await.unwrap();

        queue.cancel(group.id()).await.unwrap();
        let outcome = group.finished().await;
        assert!(outcome.cancelled);
        assert_eq!(outcome.errors, vec![ProcedureError::Cancelled]);
        assert!(child_handle.finished().await.cancelled);
    }

    #[tokio::test]
    async fn group_timeout_finishes_without_waiting() {
        let queue = ProcedureQueue::new();
        let group = Group::new().child(Task::new(UntilCancelled));
        let handle = queue
            .add(Task::new(group).with_timeout(std::time::Duration::from_millis(20)))
            .await
            .unwrap();

        let outcome = handle.finished().await;
        assert_eq!(outcome.errors.last().map(ProcedureError::kind), Some(ErrorKind::TimedOut));
    }

    #[tokio::test]
    async fn children_can_add_siblings_until_the_group_drains() {
        let queue = ProcedureQueue::new();
        let sum = Arc::new(AtomicU32::new(0));
        let inner = Arc::new(Mutex::new(None));
        let fan_out = FanOut {
            count: 3,
            sum: Arc::clone(&sum),
            queue: Arc::clone(&inner),
        };

        let handle = queue
            .add(Task::new(Group::new().child(Task::new(fan_out))))
            .await
            .unwrap();
        assert!(handle.finished().await.is_success());
        assert_eq!(sum.load(Ordering::SeqCst), 6);

        let inner = inner.lock().clone().expect("fan-out ran");
        let err = inner
            .add(Task::new(ResultProcedure::value(0u32)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn group_inputs_are_injected_like_leaf_inputs() {
        let queue = ProcedureQueue::new();
        let values = Task::new(ResultProcedure::value(vec![1u32, 2, 3]));
        let group = Task::named("sum", Group::with(Summing { input: Input::new() }))
            .inject_result(&values.handle())
            .unwrap();

        queue.add(values).await.unwrap();
        let handle = queue.add(group).await.unwrap();
        assert_eq!(handle.name(), "sum");
        assert_eq!(handle.finished().await.into_result(), Ok(6));
    }

    #[tokio::test]
    async fn skipped_group_finishes_its_children_as_cancelled() {
        let queue = ProcedureQueue::new();
        let missing = Task::new(ResultProcedure::<Vec<u32>>::failing(ProcedureError::failed("no data")));
        let child = Task::new(ResultProcedure::value(1u32));
        let child_handle = child.handle();
        let group = Task::new(Group::with(Summing { input: Input::new() }).child(child))
            .inject_result(&missing.handle())
            .unwrap();

        queue.add(missing).await.unwrap();
        let handle = queue.add(group).await.unwrap();
        let outcome = handle.finished().await;
        assert_eq!(outcome.errors[0].kind(), ErrorKind::RequirementNotSatisfied);
        assert!(child_handle.finished().await.cancelled);
    }
}
