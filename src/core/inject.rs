//! Dependency output injection.
//!
//! Before a dependent task executes, the outputs of its completed
//! parents are folded into its prompt so the agent sees what upstream
//! work produced. Missing or failed parents are surfaced with marked
//! sections instead of aborting the injection.

use crate::core::task::{TaskId, TaskResult};
use std::collections::HashMap;

/// Formats parent outputs into a dependent task's prompt.
///
/// Display names for section headers come from the explicit map when
/// present, otherwise from the agent name embedded in the task id.
#[derive(Debug, Default)]
pub struct OutputInjector {
    /// Optional task id to agent display name overrides.
    display_names: HashMap<TaskId, String>,
}

impl OutputInjector {
    /// Create an injector with no display name overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an injector with explicit display names.
    pub fn with_display_names(display_names: HashMap<TaskId, String>) -> Self {
        Self { display_names }
    }

    /// Register a display name for a task id.
    pub fn set_display_name(&mut self, id: TaskId, name: impl Into<String>) {
        self.display_names.insert(id, name.into());
    }

    /// Build the model-ready prompt for a dependent task.
    ///
    /// `dependencies` lists the task's declared dependency ids in
    /// order; `results` holds whatever terminal results are known.
    /// With zero dependencies this is the identity on `prompt`.
    pub fn inject(
        &self,
        prompt: &str,
        dependencies: &[TaskId],
        results: &HashMap<TaskId, TaskResult>,
    ) -> String {
        if dependencies.is_empty() {
            return prompt.to_string();
        }

        let mut sections = Vec::with_capacity(dependencies.len() + 1);
        for dep in dependencies {
            let name = self.display_name(dep);
            match results.get(dep) {
                None => {
                    sections.push(format!(
                        "## Output from {}\n\n[output not available]",
                        name
                    ));
                }
                Some(result) if !result.success => {
                    let error = result.error.as_deref().unwrap_or("unknown error");
                    sections.push(format!(
                        "## Output from {}\n\n[task failed: {}]",
                        name, error
                    ));
                }
                Some(result) => {
                    sections.push(format!("## Output from {}\n\n{}", name, result.output));
                }
            }
        }
        sections.push(format!("## Your task\n\n{}", prompt));
        sections.join("\n\n")
    }

    fn display_name(&self, id: &TaskId) -> String {
        self.display_names
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.agent_hint().to_string())
    }
}
