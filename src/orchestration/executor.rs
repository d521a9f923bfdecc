//! Concurrency-bounded parallel task execution.
//!
//! The executor drains ready tasks from the manager, dispatches each
//! to the agent-execution capability under a semaphore bound, and
//! writes outcomes back. Failure of one task never aborts siblings
//! already in flight; only structural dependents are skipped, before
//! they are ever dispatched. Progress flows through a bounded event
//! channel that can never block the scheduler.

use crate::core::task::{TaskId, TaskResult, TaskStatus};
use crate::error::{Error, Result};
use crate::history::History;
use crate::orchestration::manager::TaskManager;
use crate::orchestration::runner::AgentExecutor;
use crate::{mlog, mlog_warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock, Semaphore};

/// Default concurrency bound.
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

/// Progress events emitted as tasks move through their lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum ProgressEvent {
    /// A task was dispatched to its agent.
    AgentRunning {
        agent_id: String,
        task_id: TaskId,
        task: String,
    },
    /// An output chunk arrived from a streaming execution.
    AgentStreaming {
        agent_id: String,
        task_id: TaskId,
        chunk: String,
    },
    /// A task completed successfully.
    AgentComplete { agent_id: String, task_id: TaskId },
    /// A task failed.
    AgentFailed {
        agent_id: String,
        task_id: TaskId,
        error: String,
    },
    /// A task was cancelled.
    AgentCancelled { agent_id: String, task_id: TaskId },
}

/// Summary of one executor run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub completed: Vec<TaskId>,
    pub failed: Vec<TaskId>,
    pub skipped: Vec<TaskId>,
    pub cancelled: Vec<TaskId>,
    pub results: HashMap<TaskId, TaskResult>,
    /// Wall-clock duration of the run.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

impl ExecutionReport {
    /// Every task completed successfully.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && self.cancelled.is_empty()
    }

    /// Whether any task was cancelled during the run. This is the
    /// deterministic signal a coordinator checks instead of catching
    /// an unwind.
    pub fn cancellation_occurred(&self) -> bool {
        !self.cancelled.is_empty()
    }
}

// Terminal outcome of one in-flight execution.
enum Outcome {
    Completed(String),
    Failed(String),
    Cancelled,
}

/// Executes registered tasks with bounded concurrency.
pub struct ParallelExecutor {
    manager: Arc<RwLock<TaskManager>>,
    runner: Arc<dyn AgentExecutor>,
    progress: Option<mpsc::Sender<ProgressEvent>>,
    history: Option<History>,
    max_concurrent: usize,
}

impl ParallelExecutor {
    /// Create an executor over a shared manager and capability.
    pub fn new(manager: Arc<RwLock<TaskManager>>, runner: Arc<dyn AgentExecutor>) -> Self {
        Self {
            manager,
            runner,
            progress: None,
            history: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    /// Set the maximum number of concurrent executions.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Attach a progress event channel.
    pub fn with_progress(mut self, progress: mpsc::Sender<ProgressEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Persist terminal results to a history store after the run.
    pub fn with_history(mut self, history: History) -> Self {
        self.history = Some(history);
        self
    }

    // Non-blocking emit. A slow or full observer drops events rather
    // than stalling scheduling.
    fn emit(&self, event: ProgressEvent) {
        emit_on(self.progress.as_ref(), event);
    }

    /// Run until every reachable task has settled.
    ///
    /// Dispatch acquires one of the concurrency permits; harvesting
    /// completed work never waits on a permit. Returns a report of
    /// terminal states for all registered tasks.
    pub async fn run(&self) -> Result<ExecutionReport> {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let (done_tx, mut done_rx) = mpsc::channel::<(TaskId, Outcome)>(64);
        let mut in_flight: HashSet<TaskId> = HashSet::new();

        loop {
            // Dispatch phase: start every ready task a permit allows.
            let ready: Vec<TaskId> = {
                let manager = self.manager.read().await;
                manager
                    .ready_tasks()
                    .into_iter()
                    .filter(|id| !in_flight.contains(id))
                    .collect()
            };

            for id in ready {
                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    break;
                };

                // The ready snapshot is stale by the time the write
                // lock is held; a task cancelled in between is refused
                // by start_task and simply not dispatched.
                let (info, token) = {
                    let mut manager = self.manager.write().await;
                    match manager.start_task(&id) {
                        Ok(info) => {
                            let token = manager.token(&id).unwrap_or_default();
                            (info, token)
                        }
                        Err(e) => {
                            mlog!("executor: not dispatching {}: {}", id, e);
                            continue;
                        }
                    }
                };

                self.emit(ProgressEvent::AgentRunning {
                    agent_id: info.agent_id.clone(),
                    task_id: id.clone(),
                    task: info.prompt.clone(),
                });
                mlog!("executor: dispatched {} to {}", id, info.agent_id);

                // Streaming chunks become progress events via a small
                // forwarder so the capability never sees the observer.
                let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(32);
                if let Some(progress) = self.progress.clone() {
                    let agent_id = info.agent_id.clone();
                    let task_id = id.clone();
                    tokio::spawn(async move {
                        while let Some(chunk) = chunk_rx.recv().await {
                            emit_on(
                                Some(&progress),
                                ProgressEvent::AgentStreaming {
                                    agent_id: agent_id.clone(),
                                    task_id: task_id.clone(),
                                    chunk,
                                },
                            );
                        }
                    });
                }

                in_flight.insert(id.clone());
                let runner = Arc::clone(&self.runner);
                let done_tx = done_tx.clone();
                tokio::spawn(async move {
                    let call = runner.execute_streaming(
                        &info.task_id,
                        &info.agent_id,
                        &info.prompt,
                        info.timeout,
                        token.clone(),
                        chunk_tx,
                    );
                    let outcome = tokio::select! {
                        _ = token.cancelled() => Outcome::Cancelled,
                        result = tokio::time::timeout(info.timeout, call) => match result {
                            Err(_) => Outcome::Failed(Error::Timeout(info.timeout).to_string()),
                            Ok(Ok(output)) => Outcome::Completed(output),
                            Ok(Err(Error::Cancelled(_))) => Outcome::Cancelled,
                            Ok(Err(e)) => Outcome::Failed(e.to_string()),
                        },
                    };
                    drop(permit);
                    let _ = done_tx.send((info.task_id, outcome)).await;
                });
            }

            // Nothing running and nothing dispatchable: done.
            if in_flight.is_empty() {
                break;
            }

            // Harvest phase: wait for one in-flight task to settle.
            let Some((id, outcome)) = done_rx.recv().await else {
                break;
            };
            in_flight.remove(&id);
            self.settle(&id, outcome).await?;
        }

        let report = self.build_report(started.elapsed()).await;
        if let Some(history) = &self.history {
            for result in report.results.values() {
                if let Err(e) = history.store(result) {
                    mlog_warn!("executor: failed to persist {}: {}", result.task_id, e);
                }
            }
        }
        Ok(report)
    }

    // Write one outcome back through the manager and report it.
    async fn settle(&self, id: &TaskId, outcome: Outcome) -> Result<()> {
        let mut manager = self.manager.write().await;
        let agent_id = manager
            .get_task(id)
            .map(|t| t.agent_id.clone())
            .unwrap_or_default();

        match outcome {
            Outcome::Completed(output) => {
                manager.complete_task(id, output)?;
                mlog!("executor: {} completed", id);
                self.emit(ProgressEvent::AgentComplete {
                    agent_id,
                    task_id: id.clone(),
                });
            }
            Outcome::Failed(error) => {
                let skipped = manager.fail_task(id, &error)?;
                mlog!("executor: {} failed: {} ({} skipped)", id, error, skipped.len());
                self.emit(ProgressEvent::AgentFailed {
                    agent_id,
                    task_id: id.clone(),
                    error,
                });
            }
            Outcome::Cancelled => {
                let skipped = manager.finalize_cancel(id)?;
                mlog!("executor: {} cancelled ({} skipped)", id, skipped.len());
                self.emit(ProgressEvent::AgentCancelled {
                    agent_id,
                    task_id: id.clone(),
                });
            }
        }
        Ok(())
    }

    async fn build_report(&self, duration: Duration) -> ExecutionReport {
        let manager = self.manager.read().await;
        let mut report = ExecutionReport {
            completed: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            cancelled: Vec::new(),
            results: manager.results(),
            duration,
        };
        for task in manager.list_tasks(None) {
            match task.status {
                TaskStatus::Completed => report.completed.push(task.id.clone()),
                TaskStatus::Failed => report.failed.push(task.id.clone()),
                TaskStatus::Skipped => report.skipped.push(task.id.clone()),
                TaskStatus::Cancelled => report.cancelled.push(task.id.clone()),
                _ => {}
            }
        }
        report
    }
}

fn emit_on(progress: Option<&mpsc::Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = progress {
        if tx.try_send(event).is_err() {
            mlog_warn!("executor: progress channel full, event dropped");
        }
    }
}
