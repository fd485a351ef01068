//! `ProcedureQueue`: registers procedures, tracks their dependencies and
//! dispatches each one on the tokio runtime once it is eligible.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, watch};
use tracing::{debug, warn};

use super::dependency::DependencyGraph;
use super::report::{ReportEntry, RunReport};
use super::{QueueConfig, RetryPolicy};
use crate::domain::{LifecycleEvent, ProcedureId, ProcedureState, QueueId};
use crate::error::ProcedureError;
use crate::procedure::{
    Body, CompositeBody, Executable, GroupPolicy, Handle, LeafBody, PreparedTask,
    ProcedureContext, Requirement, Task, TaskCore,
};

/// Everything needed to run one procedure, taken out of its node when the
/// procedure is dispatched.
struct Dispatch {
    core: Arc<TaskCore>,
    body: Body,
    requirements: Vec<Arc<dyn Requirement>>,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
}

struct Node {
    core: Arc<TaskCore>,

    /// `None` once dispatched.
    dispatch: Option<Dispatch>,

    /// Procedures of this queue registered with this one as a producer.
    dependents: Vec<ProcedureId>,
}

#[derive(Default)]
struct QueueState {
    nodes: HashMap<ProcedureId, Node>,

    /// Insertion order; sibling dispatch follows it.
    order: Vec<ProcedureId>,

    /// Outstanding (unfinished) dependencies only.
    graph: DependencyGraph,

    suspended: bool,

    /// A closed queue refuses new procedures.
    closed: bool,

    /// Finish order.
    finished: Vec<ReportEntry>,

    /// Completed procedures. Their nodes are dropped on completion; only
    /// the report entry stays for the queue's lifetime.
    retired: HashSet<ProcedureId>,
}

impl QueueState {
    fn is_eligible(&self, id: ProcedureId) -> bool {
        !self.graph.has_dependencies(id)
            && self
                .nodes
                .get(&id)
                .is_some_and(|node| node.dispatch.is_some())
    }

    /// Take the dispatches of the eligible procedures among `candidates`,
    /// in insertion order. Nothing while suspended.
    fn take_eligible(&mut self, candidates: impl Fn(ProcedureId) -> bool) -> Vec<Dispatch> {
        if self.suspended {
            return Vec::new();
        }
        let ready: Vec<ProcedureId> = self
            .order
            .iter()
            .copied()
            .filter(|id| candidates(*id) && self.is_eligible(*id))
            .collect();
        ready
            .into_iter()
            .filter_map(|id| self.nodes.get_mut(&id).and_then(|n| n.dispatch.take()))
            .collect()
    }
}

struct Shared {
    id: QueueId,
    config: QueueConfig,
    policy: GroupPolicy,

    /// Bounds running leaf bodies; shared with nested group queues.
    permits: Arc<Semaphore>,

    state: Mutex<QueueState>,

    /// Registered procedures that have not completed yet.
    unfinished: watch::Sender<usize>,
}

/// A dependency-aware procedure queue.
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct ProcedureQueue {
    shared: Arc<Shared>,
}

impl Default for ProcedureQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcedureQueue {
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self::build(config, GroupPolicy::default(), None, false)
    }

    /// A queue that accepts procedures and edges but dispatches nothing
    /// until `resume`.
    pub fn suspended(config: QueueConfig) -> Self {
        Self::build(config, GroupPolicy::default(), None, true)
    }

    fn build(
        config: QueueConfig,
        policy: GroupPolicy,
        permits: Option<Arc<Semaphore>>,
        suspended: bool,
    ) -> Self {
        let permits = permits.unwrap_or_else(|| Arc::new(Semaphore::new(config.permits())));
        let state = QueueState {
            suspended,
            ..QueueState::default()
        };
        Self {
            shared: Arc::new(Shared {
                id: QueueId::generate(),
                config,
                policy,
                permits,
                state: Mutex::new(state),
                unfinished: watch::Sender::new(0),
            }),
        }
    }

    /// Inner queue of a group: suspended, same config and permits.
    fn nested(&self, policy: GroupPolicy) -> Self {
        Self::build(
            self.shared.config.clone(),
            policy,
            Some(Arc::clone(&self.shared.permits)),
            true,
        )
    }

    pub fn id(&self) -> QueueId {
        self.shared.id
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Register a task. Its dependencies and injection producers must be
    /// registered in this queue already, or be finished.
    pub async fn add<P: Executable>(
        &self,
        task: Task<P>,
    ) -> Result<Handle<P::Output>, ProcedureError> {
        let handle = task.handle();
        self.insert(task.into_prepared()).await?;
        Ok(handle)
    }

    pub(crate) async fn insert(&self, task: PreparedTask) -> Result<(), ProcedureError> {
        let PreparedTask {
            core,
            body,
            dependencies,
            bindings,
            timeout,
            retry,
        } = task;
        let id = core.id();

        let ready = {
            let mut state = self.shared.state.lock().await;
            if state.closed || core.state() != ProcedureState::Initialized {
                return Err(ProcedureError::InvalidState {
                    id,
                    state: core.state(),
                });
            }
            if state.nodes.contains_key(&id) {
                return Err(ProcedureError::DuplicateTask(id));
            }

            let mut outstanding = Vec::new();
            for producer in &dependencies {
                let finished = producer.state().is_terminal();
                if state.nodes.contains_key(&producer.id()) {
                    if !finished {
                        outstanding.push(producer.id());
                    }
                } else if !finished {
                    return Err(ProcedureError::UnknownTask(producer.id()));
                }
            }

            for binding in &bindings {
                let Some(producer) = dependencies.iter().find(|p| p.id() == binding.producer())
                else {
                    continue;
                };
                let link = Arc::clone(binding);
                // Refused once the producer is past will-finish; the link
                // then resolves right before the consumer executes.
                let _ = producer.add_observer(
                    LifecycleEvent::WillFinish,
                    Box::new(move |_, _| link.propagate()),
                );
            }

            for producer in &outstanding {
                state.graph.add_dependency(id, *producer);
            }
            for producer in &dependencies {
                if let Some(node) = state.nodes.get_mut(&producer.id()) {
                    node.dependents.push(id);
                }
            }

            core.advance(ProcedureState::Pending);
            debug!(
                queue = %self.shared.id,
                procedure = %id,
                name = %core.name(),
                waiting_on = outstanding.len(),
                "added"
            );
            state.nodes.insert(
                id,
                Node {
                    core: Arc::clone(&core),
                    dispatch: Some(Dispatch {
                        core,
                        body,
                        requirements: bindings,
                        timeout,
                        retry,
                    }),
                    dependents: Vec::new(),
                },
            );
            state.order.push(id);
            self.shared.unfinished.send_modify(|n| *n += 1);
            state.take_eligible(|candidate| candidate == id)
        };

        for dispatch in ready {
            self.launch(dispatch);
        }
        Ok(())
    }

    /// `consumer` will not start before `producer` finished.
    pub async fn add_dependency(
        &self,
        consumer: ProcedureId,
        producer: ProcedureId,
    ) -> Result<(), ProcedureError> {
        let mut state = self.shared.state.lock().await;
        let (dispatched, consumer_state) = match state.nodes.get(&consumer) {
            Some(node) => (node.dispatch.is_none(), node.core.state()),
            None if state.retired.contains(&consumer) => (true, ProcedureState::Finished),
            None => return Err(ProcedureError::UnknownTask(consumer)),
        };
        let producer_finished = match state.nodes.get(&producer) {
            Some(node) => node.core.state().is_terminal(),
            None if state.retired.contains(&producer) => true,
            None => return Err(ProcedureError::UnknownTask(producer)),
        };

        if let Some(cycle) = state.graph.would_create_cycle(consumer, producer) {
            return Err(ProcedureError::CycleDetected { cycle });
        }
        if dispatched {
            return Err(ProcedureError::InvalidState {
                id: consumer,
                state: consumer_state,
            });
        }

        if let Some(node) = state.nodes.get_mut(&producer)
            && !node.dependents.contains(&consumer)
        {
            node.dependents.push(consumer);
        }
        if !producer_finished {
            state.graph.add_dependency(consumer, producer);
        }
        debug!(queue = %self.shared.id, %consumer, %producer, "dependency added");
        Ok(())
    }

    /// Cancel `id` and every not-yet-dispatched procedure that transitively
    /// depends on it. Running procedures are only flagged; a finished one is
    /// left alone.
    pub async fn cancel(&self, id: ProcedureId) -> Result<(), ProcedureError> {
        let state = self.shared.state.lock().await;
        let Some(node) = state.nodes.get(&id) else {
            return if state.retired.contains(&id) {
                Ok(())
            } else {
                Err(ProcedureError::UnknownTask(id))
            };
        };
        // Nothing left to cancel, and it no longer blocks its dependents.
        if node.core.state().is_finishing() {
            return Ok(());
        }
        if node.core.cancel() {
            debug!(queue = %self.shared.id, procedure = %id, "cancelled");
        }

        let mut stack = node.dependents.clone();
        let mut seen = HashSet::new();
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            if let Some(dependent) = state.nodes.get(&next)
                && dependent.dispatch.is_some()
            {
                dependent.core.cancel();
                stack.extend(dependent.dependents.iter().copied());
            }
        }
        Ok(())
    }

    /// Cancel every procedure that has not finished.
    pub async fn cancel_all(&self) {
        let state = self.shared.state.lock().await;
        let cancelled = state
            .nodes
            .values()
            .filter(|node| !node.core.state().is_terminal())
            .filter(|node| node.core.cancel())
            .count();
        if cancelled > 0 {
            debug!(queue = %self.shared.id, cancelled, "cancelled all");
        }
    }

    /// Start dispatching a suspended queue.
    pub async fn resume(&self) {
        let ready = {
            let mut state = self.shared.state.lock().await;
            if !state.suspended {
                return;
            }
            state.suspended = false;
            state.take_eligible(|_| true)
        };
        for dispatch in ready {
            self.launch(dispatch);
        }
    }

    pub async fn is_suspended(&self) -> bool {
        self.shared.state.lock().await.suspended
    }

    pub async fn state(&self, id: ProcedureId) -> Result<ProcedureState, ProcedureError> {
        let state = self.shared.state.lock().await;
        match state.nodes.get(&id) {
            Some(node) => Ok(node.core.state()),
            None if state.retired.contains(&id) => Ok(ProcedureState::Finished),
            None => Err(ProcedureError::UnknownTask(id)),
        }
    }

    /// Number of procedures ever registered.
    pub async fn len(&self) -> usize {
        self.shared.state.lock().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Registered procedures that have not completed.
    pub fn unfinished(&self) -> usize {
        *self.shared.unfinished.borrow()
    }

    /// Resolves once every registered procedure finished. Never resolves
    /// for a suspended queue with pending work.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.shared.unfinished.subscribe();
        // The sender lives in `shared`, which `self` keeps alive.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub async fn wait_until_finished(&self) -> RunReport {
        self.wait_until_idle().await;
        self.report().await
    }

    /// Snapshot of what finished so far.
    pub async fn report(&self) -> RunReport {
        let state = self.shared.state.lock().await;
        let done: HashSet<ProcedureId> = state.finished.iter().map(|e| e.id).collect();
        RunReport {
            queue: self.shared.id,
            finished: state.finished.clone(),
            unfinished: state
                .order
                .iter()
                .copied()
                .filter(|id| !done.contains(id))
                .collect(),
        }
    }

    async fn close(&self) {
        self.shared.state.lock().await.closed = true;
    }

    /// Errors of every finished procedure, in finish order.
    async fn collected_errors(&self) -> Vec<ProcedureError> {
        let state = self.shared.state.lock().await;
        state
            .finished
            .iter()
            .flat_map(|entry| entry.errors.iter().cloned())
            .collect()
    }

    fn launch(&self, dispatch: Dispatch) {
        let queue = self.clone();
        tokio::spawn(async move { queue.execute(dispatch).await });
    }

    async fn execute(self, dispatch: Dispatch) {
        let Dispatch {
            core,
            body,
            requirements,
            timeout,
            retry,
        } = dispatch;

        let errors = if core.is_cancelled() {
            debug!(procedure = %core.id(), name = %core.name(), "skipped, cancelled");
            body.discard();
            vec![ProcedureError::Cancelled]
        } else {
            let unmet: Vec<ProcedureError> = requirements
                .iter()
                .filter_map(|requirement| {
                    requirement.propagate();
                    requirement.unsatisfied()
                })
                .collect();

            if !unmet.is_empty() {
                debug!(
                    procedure = %core.id(),
                    name = %core.name(),
                    unmet = unmet.len(),
                    "skipped, requirements not satisfied"
                );
                body.discard();
                unmet
            } else {
                core.fire(LifecycleEvent::WillExecute);
                core.advance(ProcedureState::Executing);
                debug!(procedure = %core.id(), name = %core.name(), "executing");

                let cx = ProcedureContext::new(Arc::clone(&core), self.clone());
                let timeout = timeout.or_else(|| self.shared.config.default_timeout());
                match &body {
                    Body::Leaf(leaf) => {
                        self.run_leaf(leaf.as_ref(), &cx, timeout, retry.as_ref())
                            .await
                    }
                    Body::Composite(group) => self.run_group(group.as_ref(), &cx, timeout).await,
                }
            }
        };

        core.finish(errors);
        self.complete(&core).await;
    }

    async fn run_leaf(
        &self,
        leaf: &dyn LeafBody,
        cx: &ProcedureContext,
        timeout: Option<Duration>,
        retry: Option<&RetryPolicy>,
    ) -> Vec<ProcedureError> {
        loop {
            let attempt = cx.core().begin_attempt();
            let result = {
                let Ok(_permit) = self.shared.permits.acquire().await else {
                    return vec![ProcedureError::failed("worker pool closed")];
                };
                match timeout {
                    Some(after) => tokio::time::timeout(after, leaf.run(cx))
                        .await
                        .unwrap_or(Err(ProcedureError::TimedOut { after })),
                    None => leaf.run(cx).await,
                }
            };

            match result {
                Ok(()) => {
                    cx.core().fire(LifecycleEvent::DidProduceResult);
                    return Vec::new();
                }
                Err(err) => {
                    if let Some(policy) = retry
                        && policy.should_retry(attempt, &err)
                        && !cx.is_cancelled()
                    {
                        let delay = policy.next_delay(attempt);
                        warn!(
                            procedure = %cx.id(),
                            name = %cx.name(),
                            attempt,
                            ?delay,
                            error = %err,
                            "attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    if let ProcedureError::TimedOut { after } = &err {
                        warn!(procedure = %cx.id(), name = %cx.name(), ?after, "timed out");
                    }
                    return vec![err];
                }
            }
        }
    }

    async fn run_group(
        &self,
        group: &dyn CompositeBody,
        cx: &ProcedureContext,
        timeout: Option<Duration>,
    ) -> Vec<ProcedureError> {
        let inner = self.nested(group.policy());
        let mut errors = Vec::new();

        if let Err(err) = group.compose(cx, &inner).await {
            warn!(group = %cx.id(), name = %cx.name(), error = %err, "compose failed");
            errors.push(err);
            inner.cancel_all().await;
        }
        inner.resume().await;

        let drained = async {
            tokio::select! {
                _ = inner.wait_until_idle() => {}
                _ = cx.cancelled() => {
                    debug!(group = %cx.id(), "cancelling children");
                    inner.cancel_all().await;
                    inner.wait_until_idle().await;
                }
            }
        };
        let timed_out = match timeout {
            Some(after) => tokio::time::timeout(after, drained).await.is_err(),
            None => {
                drained.await;
                false
            }
        };
        if timed_out {
            warn!(group = %cx.id(), name = %cx.name(), "timed out, abandoning children");
            inner.cancel_all().await;
        }

        inner.close().await;
        errors.extend(inner.collected_errors().await);
        if let (true, Some(after)) = (timed_out, timeout) {
            errors.push(ProcedureError::TimedOut { after });
        } else if group.has_output() {
            cx.core().fire(LifecycleEvent::DidProduceResult);
        }
        errors
    }

    /// Record a finished procedure and dispatch what it unblocked.
    async fn complete(&self, core: &Arc<TaskCore>) {
        let id = core.id();
        let entry = ReportEntry::from_core(core);
        let failed = !entry.errors.is_empty();

        let ready = {
            let mut state = self.shared.state.lock().await;
            state.finished.push(entry);
            state.nodes.remove(&id);
            state.retired.insert(id);
            let released: HashSet<ProcedureId> = state.graph.release(id).into_iter().collect();
            state.take_eligible(|candidate| released.contains(&candidate))
        };

        if failed && self.shared.policy.cancel_on_first_error {
            debug!(queue = %self.shared.id, procedure = %id, "failure, cancelling the rest");
            self.cancel_all().await;
        }
        for dispatch in ready {
            self.launch(dispatch);
        }
        self.shared.unfinished.send_modify(|n| *n = n.saturating_sub(1));
    }
}
