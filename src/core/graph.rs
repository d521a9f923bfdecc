//! Dependency graph over tasks.
//!
//! The graph owns the task arena and two adjacency maps: forward
//! (task to its dependencies) and reverse (task to its dependents).
//! Edges are stored as task ids, never direct references. A task may
//! declare a dependency on an id that has not been registered yet;
//! such a task stays blocked until the dependency arrives and
//! completes. Insertion is transactional: a task whose edges would
//! close a cycle is fully rolled back, leaving the graph untouched.

use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};

// Node colors for the cycle check.
#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Directed graph of tasks keyed by stable string id.
///
/// Invariant: the forward adjacency map, restricted to non-terminal
/// tasks, is acyclic at all times.
pub struct TaskGraph {
    /// Task arena, keyed by id.
    tasks: HashMap<TaskId, Task>,
    /// Ids in the order tasks were added. Drives deterministic
    /// iteration for readiness queries and topological ordering.
    insertion_order: Vec<TaskId>,
    /// Forward edges: task id to the ids it depends on.
    dependencies: HashMap<TaskId, Vec<TaskId>>,
    /// Reverse edges: task id to the ids that depend on it.
    dependents: HashMap<TaskId, Vec<TaskId>>,
    /// Tasks that finished successfully.
    completed: HashSet<TaskId>,
    /// Tasks that failed, were skipped, or were cancelled.
    failed: HashSet<TaskId>,
}

impl TaskGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            insertion_order: Vec::new(),
            dependencies: HashMap::new(),
            dependents: HashMap::new(),
            completed: HashSet::new(),
            failed: HashSet::new(),
        }
    }

    /// Add a task and its declared dependency edges.
    ///
    /// # Errors
    /// - `Validation` if a task with the same id is already registered.
    /// - `CycleDetected` if the task depends on itself, or if the new
    ///   edges would make any node reachable from itself. On cycle
    ///   detection every change made by this call is rolled back.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        let id = task.id.clone();

        if self.tasks.contains_key(&id) {
            return Err(Error::Validation(format!(
                "Task {} is already registered",
                id
            )));
        }
        if task.dependencies.contains(&id) {
            return Err(Error::CycleDetected { id });
        }

        let deps = task.dependencies.clone();
        self.tasks.insert(id.clone(), task);
        self.insertion_order.push(id.clone());
        self.dependencies.insert(id.clone(), deps.clone());
        for dep in &deps {
            self.dependents.entry(dep.clone()).or_default().push(id.clone());
        }

        if self.has_cycle() {
            // Roll back so the graph is exactly as before the call.
            // Reverse entries created by earlier tasks stay in place.
            self.tasks.remove(&id);
            self.insertion_order.pop();
            self.dependencies.remove(&id);
            for dep in &deps {
                if let Some(back) = self.dependents.get_mut(dep) {
                    back.retain(|d| d != &id);
                }
            }
            return Err(Error::CycleDetected { id });
        }

        Ok(())
    }

    // Three-color depth-first search over the whole graph. A revisit
    // of an in-progress node signals a cycle. Runs in O(nodes + edges).
    fn has_cycle(&self) -> bool {
        let mut marks: HashMap<&TaskId, Mark> = HashMap::with_capacity(self.tasks.len());

        for start in &self.insertion_order {
            if marks.get(start).copied().unwrap_or(Mark::Unvisited) != Mark::Unvisited {
                continue;
            }
            // Iterative DFS with an explicit stack. The second field
            // tracks how far into the node's edge list we are.
            let mut stack: Vec<(&TaskId, usize)> = vec![(start, 0)];
            marks.insert(start, Mark::InProgress);

            while let Some((node, edge)) = stack.pop() {
                let deps = self.dependencies_of(node);
                if edge < deps.len() {
                    stack.push((node, edge + 1));
                    let next = &deps[edge];
                    match marks.get(next).copied().unwrap_or(Mark::Unvisited) {
                        Mark::InProgress => return true,
                        Mark::Unvisited => {
                            marks.insert(next, Mark::InProgress);
                            stack.push((next, 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks.insert(node, Mark::Done);
                }
            }
        }

        false
    }

    /// Get a reference to a task by id.
    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Get a mutable reference to a task by id.
    pub fn get_task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    /// Ids a task depends on, in declaration order.
    pub fn dependencies_of(&self, id: &TaskId) -> &[TaskId] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids that depend on a task.
    pub fn dependents_of(&self, id: &TaskId) -> &[TaskId] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Number of dependency edges in the graph.
    pub fn dependency_count(&self) -> usize {
        self.dependencies.values().map(Vec::len).sum()
    }

    /// Check if the graph contains a task.
    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All tasks, in insertion order.
    pub fn all_tasks(&self) -> Vec<&Task> {
        self.insertion_order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .collect()
    }

    /// Tasks that have finished successfully.
    pub fn completed(&self) -> &HashSet<TaskId> {
        &self.completed
    }

    /// Tasks counted as failed for skip propagation. Includes skipped
    /// and cancelled tasks so their dependents can settle.
    pub fn failed(&self) -> &HashSet<TaskId> {
        &self.failed
    }

    // ========== Scheduling Operations ==========

    // All of a task's dependencies have reached a terminal state. A
    // failed parent settles a dependent too: as long as at least one
    // parent survived (otherwise the skip sweep has already taken the
    // dependent), the dependent runs with whatever parents succeeded.
    fn deps_settled(&self, id: &TaskId) -> bool {
        self.dependencies_of(id)
            .iter()
            .all(|dep| self.completed.contains(dep) || self.failed.contains(dep))
    }

    /// Tasks eligible for dispatch: every non-terminal, not yet
    /// running task all of whose dependencies have settled. A task
    /// with zero dependencies is immediately ready.
    ///
    /// Returned in insertion order.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        self.insertion_order
            .iter()
            .filter_map(|id| {
                let task = self.tasks.get(id)?;
                match task.status {
                    TaskStatus::Pending | TaskStatus::Waiting => {}
                    _ => return None,
                }
                self.deps_settled(id).then_some(task)
            })
            .collect()
    }

    /// Mark a task completed. Idempotent.
    ///
    /// Dependents left `Waiting` whose dependencies have now all
    /// settled flip to `Pending`.
    ///
    /// # Errors
    /// Returns `TaskNotFound` if the task is not in the graph.
    pub fn mark_completed(&mut self, id: &TaskId) -> Result<()> {
        if !self.tasks.contains_key(id) {
            return Err(Error::TaskNotFound(id.clone()));
        }
        self.completed.insert(id.clone());
        self.unblock_dependents(id);
        Ok(())
    }

    // Flip Waiting dependents to Pending once their dependencies have
    // all settled.
    fn unblock_dependents(&mut self, id: &TaskId) {
        let unblocked: Vec<TaskId> = self
            .dependents_of(id)
            .iter()
            .filter(|dep_id| !self.failed.contains(*dep_id) && self.deps_settled(dep_id))
            .cloned()
            .collect();
        for dep_id in unblocked {
            if let Some(task) = self.tasks.get_mut(&dep_id) {
                task.mark_ready();
            }
        }
    }

    /// Mark a task failed and sweep its dependents.
    ///
    /// A dependent joins the failed set (and the returned skip list)
    /// only when every one of its declared dependencies has failed. A
    /// dependent with at least one surviving dependency is left alone.
    /// The sweep is transitive: skipping a dependent can trigger
    /// further downstream skips.
    ///
    /// Returns the ids to skip, in breadth-first discovery order. The
    /// failed task itself is not in the list.
    ///
    /// # Errors
    /// Returns `TaskNotFound` if the task is not in the graph.
    pub fn mark_failed(&mut self, id: &TaskId) -> Result<Vec<TaskId>> {
        if !self.tasks.contains_key(id) {
            return Err(Error::TaskNotFound(id.clone()));
        }
        self.failed.insert(id.clone());

        let mut skipped = Vec::new();
        let mut queue: VecDeque<TaskId> = VecDeque::new();
        queue.push_back(id.clone());

        while let Some(current) = queue.pop_front() {
            let candidates: Vec<TaskId> = self
                .dependents_of(&current)
                .iter()
                .filter(|dep_id| !self.failed.contains(*dep_id))
                .filter(|dep_id| {
                    self.dependencies_of(dep_id)
                        .iter()
                        .all(|d| self.failed.contains(d))
                })
                .cloned()
                .collect();
            for dep_id in candidates {
                self.failed.insert(dep_id.clone());
                skipped.push(dep_id.clone());
                queue.push_back(dep_id);
            }
            // Surviving dependents may now have all parents settled.
            self.unblock_dependents(&current);
        }

        Ok(skipped)
    }

    /// Check if every task has reached a terminal state.
    pub fn all_settled(&self) -> bool {
        self.tasks.values().all(Task::is_terminal)
    }

    /// Tasks in topological order via Kahn's algorithm.
    ///
    /// Ties are broken by the FIFO order in which nodes reach zero
    /// in-degree, seeded by insertion order, so identical insertion
    /// sequences always produce identical orderings. Dependencies on
    /// ids not yet registered are ignored for ordering purposes.
    pub fn topological_order(&self) -> Vec<&Task> {
        let mut in_degree: HashMap<&TaskId, usize> = self
            .insertion_order
            .iter()
            .map(|id| {
                let degree = self
                    .dependencies_of(id)
                    .iter()
                    .filter(|d| self.tasks.contains_key(d))
                    .count();
                (id, degree)
            })
            .collect();

        let mut queue: VecDeque<&TaskId> = self
            .insertion_order
            .iter()
            .filter(|id| in_degree[*id] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(id) = queue.pop_front() {
            order.push(&self.tasks[id]);
            for dep_id in self.dependents_of(id) {
                if let Some(degree) = in_degree.get_mut(dep_id) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dep_id);
                    }
                }
            }
        }

        // The insertion invariant keeps the graph acyclic, so every
        // task appears in the order.
        debug_assert_eq!(order.len(), self.tasks.len());
        order
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .field("completed", &self.completed.len())
            .field("failed", &self.failed.len())
            .finish()
    }
}
