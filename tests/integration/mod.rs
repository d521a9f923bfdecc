//! Integration tests for the orchestration engine.
//!
//! These drive the public API end to end: parse a command line,
//! compile it to tasks, register them, and execute with a mock agent
//! capability.

mod failure_propagation;
mod pipeline_e2e;

pub mod support {
    use async_trait::async_trait;
    use maestro::config::Config;
    use maestro::core::task::TaskId;
    use maestro::orchestration::{plan_command, AgentExecutor, TaskManager};
    use maestro::{Error, Result};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::RwLock;
    use tokio_util::sync::CancellationToken;

    /// Parse and register a command line, returning the shared manager
    /// and the registered task ids in plan order.
    pub fn register(line: &str) -> (Arc<RwLock<TaskManager>>, Vec<TaskId>) {
        let command = maestro::parser::parse(line).expect("parse");
        let plan = plan_command(&command, &Config::default()).expect("plan");
        let mut manager = TaskManager::new();
        let ids = manager.register_plan(plan).expect("register");
        (Arc::new(RwLock::new(manager)), ids)
    }

    /// Capability that replies with a deterministic line per agent,
    /// optionally failing for configured agents.
    pub struct ScriptedRunner {
        pub delay: Duration,
        pub fail_agents: HashSet<String>,
        pub calls: AtomicUsize,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self {
                delay: Duration::from_millis(5),
                fail_agents: HashSet::new(),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(mut self, agent: &str) -> Self {
            self.fail_agents.insert(agent.to_string());
            self
        }
    }

    #[async_trait]
    impl AgentExecutor for ScriptedRunner {
        async fn execute(
            &self,
            _task_id: &TaskId,
            agent_id: &str,
            prompt: &str,
            _timeout: Duration,
            _cancel: CancellationToken,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail_agents.contains(agent_id) {
                return Err(Error::AgentNotAvailable(format!("{} is down", agent_id)));
            }
            // Echo enough of the prompt to assert on injection.
            Ok(format!("{} done: {}", agent_id, prompt.lines().next().unwrap_or("")))
        }
    }
}
