//! Task data model for the execution graph.
//!
//! Tasks are the atomic units of work assigned to agents. Each task
//! tracks its status, assignment, dependencies, timing, and result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default wall-clock timeout for a single task execution.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Unique identifier for a task.
///
/// Task ids are stable strings of the form `<prefix>-<agent>-<n>`,
/// where `<prefix>` identifies the submitted command and `<n>` is the
/// fan-out index within a stage. Edges between tasks are stored as ids,
/// never as direct references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Build a task id from a command prefix, agent id, and fan-out index.
    pub fn compose(prefix: &str, agent_id: &str, index: usize) -> Self {
        Self(format!("{}-{}-{}", prefix, agent_id, index))
    }

    /// Best-effort extraction of the agent name embedded in the id.
    ///
    /// For ids of the form `<prefix>-<agent>-<n>` (where `<agent>` may
    /// itself contain hyphens, e.g. `builder-1`), returns `<agent>`.
    /// Ids that do not match the shape are returned whole.
    pub fn agent_hint(&self) -> &str {
        let s = self.0.as_str();
        // Strip a trailing "-<digits>" index, then a leading "<prefix>-".
        if let Some(dash) = s.rfind('-') {
            let (head, tail) = (&s[..dash], &s[dash + 1..]);
            if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
                if let Some(first) = head.find('-') {
                    return &head[first + 1..];
                }
            }
        }
        s
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task status in its lifecycle.
///
/// `Completed`, `Failed`, `Skipped`, and `Cancelled` are terminal;
/// no transition out of a terminal state is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task created, all dependencies satisfied, awaiting dispatch.
    Pending,
    /// Task created but blocked on unfinished dependencies.
    Waiting,
    /// Task is currently being executed by an agent.
    Running,
    /// Task completed successfully.
    Completed,
    /// Task failed with an error.
    Failed,
    /// Task skipped because every one of its dependencies failed.
    Skipped,
    /// Task cancelled by the caller.
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Cancelled
        )
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Waiting => write!(f, "waiting"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The recorded outcome of a task.
///
/// Populated exactly once, at the transition into any terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// The task this result belongs to.
    pub task_id: TaskId,
    /// Output text produced by the agent (empty on failure).
    pub output: String,
    /// Whether the task reached `Completed`.
    pub success: bool,
    /// Error message for failed, skipped, or cancelled tasks.
    pub error: Option<String>,
    /// When the terminal state was reached.
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    /// Result for a successfully completed task.
    pub fn success(task_id: TaskId, output: String) -> Self {
        Self {
            task_id,
            output,
            success: true,
            error: None,
            completed_at: Utc::now(),
        }
    }

    /// Result for a failed, skipped, or cancelled task.
    pub fn failure(task_id: TaskId, error: String) -> Self {
        Self {
            task_id,
            output: String::new(),
            success: false,
            error: Some(error),
            completed_at: Utc::now(),
        }
    }
}

/// A single unit of scheduled work assigned to one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Logical worker assigned to perform the work.
    pub agent_id: String,
    /// Instruction text. Rewritten once by dependency output injection
    /// just before execution starts.
    pub prompt: String,
    /// Ordered list of task ids that must finish before this task runs.
    pub dependencies: Vec<TaskId>,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Maximum wall-clock duration allowed for execution.
    #[serde(with = "timeout_secs")]
    pub timeout: Duration,
    /// Whether the caller intends not to block on this task's completion.
    pub background: bool,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When execution started. Set exactly once, never cleared.
    pub started_at: Option<DateTime<Utc>>,
    /// When a terminal state was reached. Set exactly once, never cleared.
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal outcome. Populated exactly once.
    pub result: Option<TaskResult>,
}

mod timeout_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl Task {
    /// Create a new task with the given id, agent, and prompt.
    ///
    /// Tasks with declared dependencies start `Waiting`; independent
    /// tasks start `Pending`. The default timeout applies unless
    /// overridden with [`Task::with_timeout`].
    pub fn new(id: TaskId, agent_id: &str, prompt: &str, dependencies: Vec<TaskId>) -> Self {
        let status = if dependencies.is_empty() {
            TaskStatus::Pending
        } else {
            TaskStatus::Waiting
        };
        Self {
            id,
            agent_id: agent_id.to_string(),
            prompt: prompt.to_string(),
            dependencies,
            status,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            background: false,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
        }
    }

    /// Override the execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Mark the task as backgroundable.
    pub fn with_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    /// Start the task execution.
    ///
    /// Transitions to `Running` and records the start time. No-op if
    /// the task is already terminal.
    pub fn start(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark dependencies satisfied: `Waiting` becomes `Pending`.
    pub fn mark_ready(&mut self) {
        if self.status == TaskStatus::Waiting {
            self.status = TaskStatus::Pending;
        }
    }

    /// Mark the task as successfully completed with its output.
    pub fn complete(&mut self, output: String) {
        let result = TaskResult::success(self.id.clone(), output);
        self.finish(TaskStatus::Completed, result);
    }

    /// Mark the task as failed with an error message.
    pub fn fail(&mut self, error: &str) {
        let result = TaskResult::failure(self.id.clone(), error.to_string());
        self.finish(TaskStatus::Failed, result);
    }

    /// Mark the task as skipped because its dependencies failed.
    pub fn skip(&mut self, reason: &str) {
        let result = TaskResult::failure(self.id.clone(), format!("Skipped: {}", reason));
        self.finish(TaskStatus::Skipped, result);
    }

    /// Mark the task as cancelled.
    pub fn cancel(&mut self) {
        let result = TaskResult::failure(self.id.clone(), "Cancelled".to_string());
        self.finish(TaskStatus::Cancelled, result);
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    // Terminal transitions funnel through here so result and
    // completed_at are each set exactly once.
    fn finish(&mut self, status: TaskStatus, result: TaskResult) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.completed_at = Some(result.completed_at);
        self.result = Some(result);
    }
}
