//! Translation from parsed commands to executable tasks.
//!
//! Each agent invocation becomes one task; pipeline stages are wired
//! so every task in stage *i+1* depends on every task in stage *i*.
//! Task ids are `<prefix>-<agent>-<n>` where the prefix is a fresh
//! uuid fragment per submitted command and `n` is a running index.

use crate::config::Config;
use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use crate::parser::{Command, Stage};
use std::collections::HashMap;

/// Length of the uuid fragment used as the command prefix.
const PREFIX_LEN: usize = 8;

/// Tasks compiled from one command, ready for registration.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Tasks in stage order; dependency edges are already declared.
    pub tasks: Vec<Task>,
    /// Configured display names for output injection headers, keyed
    /// by task id. Only present for agents with a configured name.
    pub display_names: HashMap<TaskId, String>,
}

impl Plan {
    /// Ids of every task in the plan, in order.
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }
}

/// Compile a command into tasks.
///
/// # Errors
/// Returns `Validation` for system and raw commands, which do not
/// produce tasks.
pub fn plan_command(command: &Command, config: &Config) -> Result<Plan> {
    let prefix = new_prefix();
    plan_with_prefix(command, config, &prefix)
}

// Split out so tests can use a fixed prefix.
fn plan_with_prefix(command: &Command, config: &Config, prefix: &str) -> Result<Plan> {
    let (stages, background) = match command {
        Command::Agent {
            agent_id,
            content,
            background,
        } => (
            vec![Stage {
                agent_ids: vec![agent_id.clone()],
                content: content.clone(),
            }],
            *background,
        ),
        Command::MultiAgent {
            agent_ids,
            content,
            background,
        } => (
            vec![Stage {
                agent_ids: agent_ids.clone(),
                content: content.clone(),
            }],
            *background,
        ),
        Command::Pipeline { stages, background } => (stages.clone(), *background),
        Command::System { name, .. } => {
            return Err(Error::Validation(format!(
                "system command /{} does not produce tasks",
                name
            )));
        }
        Command::Raw { .. } => {
            return Err(Error::Validation(
                "raw input does not produce tasks".to_string(),
            ));
        }
    };

    // The parser never emits an empty pipeline, but the enum is public.
    if stages.is_empty() {
        return Err(Error::Validation(
            "pipeline has no stages".to_string(),
        ));
    }

    let mut tasks = Vec::new();
    let mut display_names = HashMap::new();
    let mut previous_stage: Vec<TaskId> = Vec::new();
    let mut index = 0usize;
    let last_stage = stages.len() - 1;

    for (stage_no, stage) in stages.iter().enumerate() {
        let mut current_stage = Vec::with_capacity(stage.agent_ids.len());
        for agent_id in &stage.agent_ids {
            let id = TaskId::compose(prefix, agent_id, index);
            index += 1;

            let task = Task::new(id.clone(), agent_id, &stage.content, previous_stage.clone())
                .with_timeout(config.timeout())
                .with_background(background && stage_no == last_stage);

            if let Some(agent) = config.agents.get(agent_id) {
                if let Some(name) = &agent.name {
                    display_names.insert(id.clone(), name.clone());
                }
            }
            current_stage.push(id);
            tasks.push(task);
        }
        previous_stage = current_stage;
    }

    Ok(Plan {
        tasks,
        display_names,
    })
}

fn new_prefix() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    raw[..PREFIX_LEN].to_string()
}
