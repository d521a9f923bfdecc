//! Task manager: the single source of truth for task state.
//!
//! The manager owns the dependency graph, the per-task cancellation
//! tokens, and the output injector. Every status mutation and every
//! state query goes through it; no other component touches graph
//! edges or task status directly.

use crate::core::graph::TaskGraph;
use crate::core::inject::OutputInjector;
use crate::core::task::{Task, TaskId, TaskResult, TaskStatus};
use crate::error::{Error, Result};
use crate::mlog_debug;
use crate::orchestration::plan::Plan;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Owns the graph, result table, and cancellation tokens.
pub struct TaskManager {
    graph: TaskGraph,
    injector: OutputInjector,
    tokens: HashMap<TaskId, CancellationToken>,
}

impl TaskManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            graph: TaskGraph::new(),
            injector: OutputInjector::new(),
            tokens: HashMap::new(),
        }
    }

    /// Register a compiled plan: its tasks, edges, and display names.
    pub fn register_plan(&mut self, plan: Plan) -> Result<Vec<TaskId>> {
        for (id, name) in plan.display_names {
            self.injector.set_display_name(id, name);
        }
        self.register(plan.tasks)
    }

    /// Register a batch of tasks with pre-declared dependency ids.
    ///
    /// Each insertion is transactional; on error the already-inserted
    /// tasks of the batch remain registered.
    ///
    /// # Errors
    /// Propagates `CycleDetected` and duplicate-id `Validation` errors
    /// from the graph.
    pub fn register(&mut self, tasks: Vec<Task>) -> Result<Vec<TaskId>> {
        let mut ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = task.id.clone();
            self.graph.add_task(task)?;
            self.tokens.insert(id.clone(), CancellationToken::new());
            mlog_debug!("manager: registered task {}", id);
            ids.push(id);
        }
        Ok(ids)
    }

    /// All tasks, optionally filtered by status, in insertion order.
    pub fn list_tasks(&self, status: Option<TaskStatus>) -> Vec<&Task> {
        self.graph
            .all_tasks()
            .into_iter()
            .filter(|t| status.map(|s| t.status == s).unwrap_or(true))
            .collect()
    }

    /// Look up a task by id.
    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.graph.get_task(id)
    }

    /// A task's terminal result, if it has one.
    pub fn get_result(&self, id: &TaskId) -> Option<&TaskResult> {
        self.graph.get_task(id).and_then(|t| t.result.as_ref())
    }

    /// Tasks eligible for dispatch right now.
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        self.graph.ready_tasks().iter().map(|t| t.id.clone()).collect()
    }

    /// Whether every registered task is terminal.
    pub fn all_settled(&self) -> bool {
        self.graph.all_settled()
    }

    /// The cancellation token for a task.
    pub fn token(&self, id: &TaskId) -> Option<CancellationToken> {
        self.tokens.get(id).cloned()
    }

    /// Prepare a task for dispatch: inject dependency outputs into its
    /// prompt, transition it to `Running`, and return what the
    /// capability call needs.
    ///
    /// # Errors
    /// Returns `TaskNotFound` for unknown ids, `Cancelled` if the task
    /// was cancelled between the readiness snapshot and dispatch, and
    /// `Validation` for any other non-dispatchable status.
    pub fn start_task(&mut self, id: &TaskId) -> Result<DispatchInfo> {
        // Re-check status under the write lock. A cancellation landing
        // after the ready snapshot must keep the task away from the
        // capability.
        let status = self
            .graph
            .get_task(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?
            .status;
        match status {
            TaskStatus::Pending | TaskStatus::Waiting => {}
            TaskStatus::Cancelled => return Err(Error::Cancelled(id.clone())),
            other => {
                return Err(Error::Validation(format!(
                    "task {} is not dispatchable ({})",
                    id, other
                )));
            }
        }

        let deps: Vec<TaskId> = self.graph.dependencies_of(id).to_vec();
        let results: HashMap<TaskId, TaskResult> = deps
            .iter()
            .filter_map(|dep| {
                self.graph
                    .get_task(dep)
                    .and_then(|t| t.result.clone())
                    .map(|r| (dep.clone(), r))
            })
            .collect();

        let task = self
            .graph
            .get_task_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;

        // Injection rewrites the prompt exactly once, at dispatch.
        let prompt = if deps.is_empty() {
            task.prompt.clone()
        } else {
            self.injector.inject(&task.prompt, &deps, &results)
        };
        task.prompt = prompt.clone();
        task.start();

        Ok(DispatchInfo {
            task_id: id.clone(),
            agent_id: task.agent_id.clone(),
            prompt,
            timeout: task.timeout,
        })
    }

    /// Record a successful completion and unblock dependents.
    ///
    /// A task already in a terminal state is left untouched; a raced
    /// outcome arriving after cancellation must not move the id into
    /// the completed set.
    ///
    /// # Errors
    /// Returns `TaskNotFound` for unknown ids.
    pub fn complete_task(&mut self, id: &TaskId, output: String) -> Result<()> {
        let task = self
            .graph
            .get_task_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        if task.is_terminal() {
            return Ok(());
        }
        task.complete(output);
        self.graph.mark_completed(id)
    }

    /// Record a failure and sweep dependents.
    ///
    /// Dependents whose every dependency has now failed are marked
    /// `Skipped` with an explanatory result. Returns the skipped ids.
    /// A task already in a terminal state is left untouched.
    pub fn fail_task(&mut self, id: &TaskId, error: &str) -> Result<Vec<TaskId>> {
        let task = self
            .graph
            .get_task_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        if task.is_terminal() {
            return Ok(Vec::new());
        }
        task.fail(error);
        let skipped = self.graph.mark_failed(id)?;
        for skip_id in &skipped {
            if let Some(task) = self.graph.get_task_mut(skip_id) {
                task.skip("all dependencies failed");
            }
            mlog_debug!("manager: skipped {} after failure of {}", skip_id, id);
        }
        Ok(skipped)
    }

    /// Request cancellation of a task.
    ///
    /// A `Pending` or `Waiting` task transitions to `Cancelled`
    /// immediately and never reaches the execution capability; its
    /// dependents are swept the same way a failure sweeps them. A
    /// `Running` task has its token fired and is finalized by the
    /// executor once the in-flight call unwinds.
    ///
    /// Returns whether the cancellation took effect.
    ///
    /// # Errors
    /// Returns `TaskNotFound` for unknown ids.
    pub fn cancel_task(&mut self, id: &TaskId) -> Result<bool> {
        let status = self
            .graph
            .get_task(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?
            .status;

        match status {
            TaskStatus::Pending | TaskStatus::Waiting => {
                self.finalize_cancel(id)?;
                Ok(true)
            }
            TaskStatus::Running => {
                if let Some(token) = self.tokens.get(id) {
                    token.cancel();
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Transition a task to `Cancelled` and sweep its dependents.
    ///
    /// Called directly for never-started tasks, and by the executor
    /// once a cancelled in-flight execution has unwound. Cancelled
    /// tasks join the failed set so dependents can settle as skipped.
    pub fn finalize_cancel(&mut self, id: &TaskId) -> Result<Vec<TaskId>> {
        let task = self
            .graph
            .get_task_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        if task.is_terminal() {
            return Ok(Vec::new());
        }
        task.cancel();
        let skipped = self.graph.mark_failed(id)?;
        for skip_id in &skipped {
            if let Some(task) = self.graph.get_task_mut(skip_id) {
                task.skip("all dependencies failed");
            }
        }
        Ok(skipped)
    }

    /// All terminal results, keyed by task id.
    pub fn results(&self) -> HashMap<TaskId, TaskResult> {
        self.graph
            .all_tasks()
            .into_iter()
            .filter_map(|t| t.result.clone().map(|r| (t.id.clone(), r)))
            .collect()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the executor needs to invoke the capability for a task.
#[derive(Debug, Clone)]
pub struct DispatchInfo {
    pub task_id: TaskId,
    pub agent_id: String,
    pub prompt: String,
    pub timeout: Duration,
}
