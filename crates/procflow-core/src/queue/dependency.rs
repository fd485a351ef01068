//! Dependency graph for outstanding procedure dependencies.
//!
//! Design:
//! - Forward edges: procedure -> producers it still waits for
//! - Reverse edges: producer -> procedures waiting for it
//! - Invariant: edges and reverse_edges must be kept in sync
//!
//! Edges are removed when the producer finishes, so the graph only ever
//! contains unfinished procedures. A cycle therefore can only be formed by
//! unfinished procedures, which is what `would_create_cycle` checks.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::domain::ProcedureId;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Forward edges: procedure -> producers it depends on (waits for)
    edges: HashMap<ProcedureId, HashSet<ProcedureId>>,

    /// Reverse edges: producer -> procedures that depend on it
    reverse_edges: HashMap<ProcedureId, HashSet<ProcedureId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependency: `task` depends on `depends_on`.
    ///
    /// add_dependency(b, a) means "B waits for A":
    /// - edges: B -> {A}
    /// - reverse_edges: A -> {B}
    pub fn add_dependency(&mut self, task: ProcedureId, depends_on: ProcedureId) {
        self.edges.entry(task).or_default().insert(depends_on);
        self.reverse_edges
            .entry(depends_on)
            .or_default()
            .insert(task);
    }

    /// Remove a dependency, typically because `depends_on` finished.
    pub fn remove_dependency(&mut self, task: ProcedureId, depends_on: ProcedureId) {
        if let Entry::Occupied(mut e) = self.edges.entry(task) {
            e.get_mut().remove(&depends_on);
            if e.get().is_empty() {
                e.remove_entry();
            }
        }
        if let Entry::Occupied(mut e) = self.reverse_edges.entry(depends_on) {
            e.get_mut().remove(&task);
            if e.get().is_empty() {
                e.remove_entry();
            }
        }
    }

    /// Drop every edge pointing at `finished` and return the procedures that
    /// were waiting for it.
    ///
    /// The returned procedures may still have other outstanding
    /// dependencies; the caller checks `has_dependencies`.
    pub fn release(&mut self, finished: ProcedureId) -> Vec<ProcedureId> {
        let waiting = self.get_waiting_tasks(finished);
        for task in &waiting {
            self.remove_dependency(*task, finished);
        }
        waiting
    }

    pub fn get_waiting_tasks(&self, producer: ProcedureId) -> Vec<ProcedureId> {
        self.reverse_edges
            .get(&producer)
            .map(|waiting| waiting.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_dependencies(&self, task: ProcedureId) -> bool {
        self.edges
            .get(&task)
            .map(|deps| !deps.is_empty())
            .unwrap_or(false)
    }

    pub fn get_dependencies(&self, task: ProcedureId) -> Vec<ProcedureId> {
        self.edges
            .get(&task)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Would adding `task -> depends_on` close a cycle?
    ///
    /// Returns the cycle as `[task, depends_on, ..., task]` if so.
    pub fn would_create_cycle(
        &self,
        task: ProcedureId,
        depends_on: ProcedureId,
    ) -> Option<Vec<ProcedureId>> {
        if task == depends_on {
            return Some(vec![task, task]);
        }
        let mut path = vec![depends_on];
        let mut visited = HashSet::new();
        if self.find_path(depends_on, task, &mut visited, &mut path) {
            let mut cycle = vec![task];
            cycle.extend(path);
            return Some(cycle);
        }
        None
    }

    fn find_path(
        &self,
        from: ProcedureId,
        to: ProcedureId,
        visited: &mut HashSet<ProcedureId>,
        path: &mut Vec<ProcedureId>,
    ) -> bool {
        if !visited.insert(from) {
            return false;
        }
        for dep in self.get_dependencies(from) {
            path.push(dep);
            if dep == to || self.find_path(dep, to, visited, path) {
                return true;
            }
            path.pop();
        }
        false
    }
}
