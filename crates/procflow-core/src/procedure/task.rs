//! `Task<P>`: a procedure plus its wiring, before it joins a queue.
//! `Handle<T>`: typed access to a queued procedure's result.

use std::sync::Arc;
use std::time::Duration;

use super::binder::{Binding, Requirement};
use super::body::Body;
use super::core::TaskCore;
use super::observer::ObserverFn;
use super::slot::{Input, Mappable, Slot};
use super::{Executable, InputProcedure, Value};
use crate::domain::{LifecycleEvent, Outcome, Pending, ProcedureId, ProcedureState};
use crate::error::ProcedureError;
use crate::queue::RetryPolicy;

/// A procedure being configured.
///
/// ```ignore
/// let load = Task::new(LoadStore::new(config));
/// let insert = Task::new(InsertItems::new(map).with_items(items))
///     .inject_into(|p| p.store(), &load.handle())?;
/// queue.add(load).await?;
/// queue.add(insert).await?;
/// ```
pub struct Task<P: Executable> {
    procedure: P,
    core: Arc<TaskCore>,
    output: Arc<Slot<P::Output>>,
    dependencies: Vec<Arc<TaskCore>>,
    bindings: Vec<Arc<dyn Requirement>>,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
}

impl<P: Executable> Task<P> {
    pub fn new(procedure: P) -> Self {
        let name = procedure.default_name();
        Self::named(name, procedure)
    }

    pub fn named(name: impl Into<String>, procedure: P) -> Self {
        let output: Arc<Slot<P::Output>> = Arc::new(Slot::new());
        let core = Arc::new(TaskCore::new(name.into(), output.clone()));
        Self {
            procedure,
            core,
            output,
            dependencies: Vec::new(),
            bindings: Vec::new(),
            timeout: None,
            retry: None,
        }
    }

    pub fn id(&self) -> ProcedureId {
        self.core.id()
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn procedure(&self) -> &P {
        &self.procedure
    }

    pub fn handle(&self) -> Handle<P::Output> {
        Handle {
            core: Arc::clone(&self.core),
            output: Arc::clone(&self.output),
        }
    }

    /// Run only after `producer` finished, whatever its outcome.
    pub fn depends_on<U>(mut self, producer: &Handle<U>) -> Self {
        self.add_dependency(Arc::clone(&producer.core));
        self
    }

    /// Per-attempt limit for leaves, overall limit for groups.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Feed `producer`'s output into the input picked by `select`, and
    /// depend on `producer`. The input must not hold a value yet.
    pub fn inject_into<T: Value>(
        self,
        select: impl FnOnce(&P) -> &Input<T>,
        producer: &Handle<T>,
    ) -> Result<Self, ProcedureError> {
        let target = select(&self.procedure).clone();
        let binding = Binding::direct(producer.id(), producer.slot(), target.clone());
        self.bind(&target, producer.core.clone(), Arc::new(binding))
    }

    /// Like `inject_into`, but `transform` sees the producer's whole result
    /// (value or failure) and decides what the input receives.
    pub fn inject_mapped<T: Value, U: Value>(
        self,
        select: impl FnOnce(&P) -> &Input<T>,
        producer: &Handle<U>,
        transform: impl Mappable<Pending<U>, Pending<T>> + 'static,
    ) -> Result<Self, ProcedureError> {
        let target = select(&self.procedure).clone();
        let binding = Binding::new(
            producer.id(),
            producer.slot(),
            target.clone(),
            Box::new(transform),
        );
        self.bind(&target, producer.core.clone(), Arc::new(binding))
    }

    fn bind<T: Value>(
        mut self,
        target: &Input<T>,
        producer: Arc<TaskCore>,
        binding: Arc<dyn Requirement>,
    ) -> Result<Self, ProcedureError> {
        if !target.bind() {
            return Err(ProcedureError::InputAlreadyBound {
                consumer: self.id(),
            });
        }
        self.bindings.push(binding);
        self.add_dependency(producer);
        Ok(self)
    }

    fn add_dependency(&mut self, producer: Arc<TaskCore>) {
        if self.dependencies.iter().all(|d| d.id() != producer.id()) {
            self.dependencies.push(producer);
        }
    }

    /// Observe `event` with access to the output as it stands at that point.
    pub fn observe(
        self,
        event: LifecycleEvent,
        observer: impl FnOnce(&Pending<P::Output>, &[ProcedureError]) + Send + 'static,
    ) -> Self {
        let typed = typed_observer(Arc::clone(&self.output), observer);
        // A fresh core has fired nothing yet.
        let _ = self.core.add_observer(event, typed);
        self
    }

    pub fn on_will_execute(
        self,
        observer: impl FnOnce(&Pending<P::Output>, &[ProcedureError]) + Send + 'static,
    ) -> Self {
        self.observe(LifecycleEvent::WillExecute, observer)
    }

    pub fn on_did_produce_result(
        self,
        observer: impl FnOnce(&Pending<P::Output>, &[ProcedureError]) + Send + 'static,
    ) -> Self {
        self.observe(LifecycleEvent::DidProduceResult, observer)
    }

    pub fn on_will_finish(
        self,
        observer: impl FnOnce(&Pending<P::Output>, &[ProcedureError]) + Send + 'static,
    ) -> Self {
        self.observe(LifecycleEvent::WillFinish, observer)
    }

    pub fn on_did_finish(
        self,
        observer: impl FnOnce(&Pending<P::Output>, &[ProcedureError]) + Send + 'static,
    ) -> Self {
        self.observe(LifecycleEvent::DidFinish, observer)
    }

    pub(crate) fn into_prepared(self) -> PreparedTask {
        let handle = self.handle();
        let runnable = self.procedure.into_runnable(&handle);
        PreparedTask {
            core: self.core,
            body: runnable.body,
            dependencies: self.dependencies,
            bindings: self.bindings,
            timeout: self.timeout,
            retry: self.retry,
        }
    }
}

impl<P: Executable + InputProcedure> Task<P> {
    /// Inject `producer`'s output into the procedure's primary input.
    pub fn inject_result(self, producer: &Handle<P::Input>) -> Result<Self, ProcedureError> {
        self.inject_into(|p| p.input(), producer)
    }
}

/// A task with its procedure erased, ready for a queue.
pub(crate) struct PreparedTask {
    pub(crate) core: Arc<TaskCore>,
    pub(crate) body: Body,
    pub(crate) dependencies: Vec<Arc<TaskCore>>,
    pub(crate) bindings: Vec<Arc<dyn Requirement>>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry: Option<RetryPolicy>,
}

fn typed_observer<T: Value>(
    output: Arc<Slot<T>>,
    observer: impl FnOnce(&Pending<T>, &[ProcedureError]) + Send + 'static,
) -> ObserverFn {
    Box::new(move |_, errors| output.read(|pending| observer(pending, errors)))
}

/// Typed view of a queued procedure.
pub struct Handle<T> {
    core: Arc<TaskCore>,
    output: Arc<Slot<T>>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            output: Arc::clone(&self.output),
        }
    }
}

impl<T: Value> Handle<T> {
    pub fn id(&self) -> ProcedureId {
        self.core.id()
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn state(&self) -> ProcedureState {
        self.core.state()
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.core.is_finished()
    }

    pub fn attempts(&self) -> u32 {
        self.core.attempts()
    }

    pub fn output(&self) -> Pending<T> {
        self.output.get()
    }

    pub fn errors(&self) -> Vec<ProcedureError> {
        self.core.errors()
    }

    /// Snapshot of the result; only final once the procedure finished.
    pub fn outcome(&self) -> Outcome<T> {
        Outcome {
            output: self.output(),
            errors: self.errors(),
            cancelled: self.is_cancelled(),
        }
    }

    /// Wait for the procedure to finish and return its result.
    pub async fn finished(&self) -> Outcome<T> {
        self.core.wait_finished().await;
        self.outcome()
    }

    /// Observe `event` on a procedure that may already be queued. Fails with
    /// `InvalidState` when the event already happened.
    pub fn add_observer(
        &self,
        event: LifecycleEvent,
        observer: impl FnOnce(&Pending<T>, &[ProcedureError]) + Send + 'static,
    ) -> Result<(), ProcedureError> {
        let typed = typed_observer(Arc::clone(&self.output), observer);
        self.core
            .add_observer(event, typed)
            .map_err(|_| ProcedureError::InvalidState {
                id: self.id(),
                state: self.state(),
            })
    }

    pub(crate) fn slot(&self) -> Arc<Slot<T>> {
        Arc::clone(&self.output)
    }

    pub(crate) fn core(&self) -> &Arc<TaskCore> {
        &self.core
    }
}

impl<T: Value + std::fmt::Debug> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .field("output", &self.output())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::procedure::{ResultProcedure, TransformProcedure};

    #[test]
    fn second_injection_into_the_same_input_is_rejected() {
        let first = Task::new(ResultProcedure::value(1u32));
        let second = Task::new(ResultProcedure::value(2u32));
        let consumer = Task::new(TransformProcedure::new(|n: &u32| n + 1))
            .inject_result(&first.handle())
            .unwrap();

        let err = consumer.inject_result(&second.handle()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InputAlreadyBound);
    }

    #[test]
    fn injection_into_a_prefilled_input_is_rejected() {
        let producer = Task::new(ResultProcedure::<u32>::failing(ProcedureError::failed("offline")));
        let consumer = Task::new(TransformProcedure::new(|n: &u32| n + 1).with_input(5));

        let err = consumer.inject_result(&producer.handle()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InputAlreadyBound);
    }

    #[test]
    fn injection_adds_a_single_dependency() {
        let producer = Task::new(ResultProcedure::value(1u32));
        let consumer = Task::new(TransformProcedure::new(|n: &u32| n + 1))
            .depends_on(&producer.handle())
            .inject_result(&producer.handle())
            .unwrap();
        assert_eq!(consumer.dependencies.len(), 1);
        assert_eq!(consumer.bindings.len(), 1);
    }

    #[test]
    fn observer_on_a_fired_event_is_refused() {
        let task = Task::new(ResultProcedure::value(1u32));
        let handle = task.handle();
        handle.core().finish(vec![]);

        let err = handle
            .add_observer(LifecycleEvent::DidFinish, |_, _| {})
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn default_name_is_the_procedure_type() {
        let task = Task::new(ResultProcedure::value(1u32));
        assert_eq!(task.name(), "ResultProcedure");
        let named = Task::named("answer", ResultProcedure::value(42u32));
        assert_eq!(named.handle().name(), "answer");
    }
}
