//! Agent execution capability.
//!
//! The executor drives tasks through the [`AgentExecutor`] trait so
//! the scheduling core never depends on a concrete process. The one
//! shipped implementation, [`CliRunner`], launches an external agent
//! CLI in headless mode and returns its stdout.

use crate::config::Config;
use crate::core::task::TaskId;
use crate::error::{Error, Result};
use crate::mlog_debug;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capability that performs one task's work.
///
/// Implementations should honor `cancel` by stopping promptly and
/// returning `Error::Cancelled`; the executor also guards the call
/// with the same token, so a slow implementation is abandoned rather
/// than waited on.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Execute a prompt as the given agent, returning its output text.
    async fn execute(
        &self,
        task_id: &TaskId,
        agent_id: &str,
        prompt: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<String>;

    /// Streaming variant: output chunks are sent on `chunks` zero or
    /// more times before the final output is returned. The default
    /// implementation does not stream.
    async fn execute_streaming(
        &self,
        task_id: &TaskId,
        agent_id: &str,
        prompt: &str,
        timeout: Duration,
        cancel: CancellationToken,
        _chunks: mpsc::Sender<String>,
    ) -> Result<String> {
        self.execute(task_id, agent_id, prompt, timeout, cancel).await
    }
}

/// Default binary used when no command is configured.
pub const DEFAULT_BINARY: &str = "claude";

/// Launches an external agent CLI per task.
///
/// The command line comes from the configuration's per-agent override,
/// then the global `command`, then a `which` lookup of the default
/// binary. The prompt is passed as the final argument; stdout is the
/// task output.
#[derive(Debug, Clone)]
pub struct CliRunner {
    config: Config,
    /// Fallback binary when the config names no command.
    default_binary: Option<PathBuf>,
}

impl CliRunner {
    /// Create a runner from configuration.
    ///
    /// The default binary is resolved with `which` up front; a missing
    /// binary is only an error at execution time for agents without a
    /// configured command.
    pub fn new(config: Config) -> Self {
        let default_binary = which::which(DEFAULT_BINARY).ok();
        Self {
            config,
            default_binary,
        }
    }

    /// Create a runner with an explicit fallback binary, bypassing
    /// `which` lookup.
    pub fn with_binary(config: Config, binary: PathBuf) -> Self {
        Self {
            config,
            default_binary: Some(binary),
        }
    }

    // Split the configured command line into program and base args,
    // falling back to the resolved default binary.
    fn command_for(&self, agent_id: &str) -> Result<(PathBuf, Vec<String>)> {
        if let Some(line) = self.config.effective_command(agent_id) {
            let mut parts = line.split_whitespace().map(str::to_string);
            let program = parts
                .next()
                .ok_or_else(|| Error::AgentNotAvailable(agent_id.to_string()))?;
            return Ok((PathBuf::from(program), parts.collect()));
        }
        self.default_binary
            .clone()
            .map(|binary| (binary, vec!["-p".to_string()]))
            .ok_or_else(|| Error::AgentNotAvailable(agent_id.to_string()))
    }
}

#[async_trait]
impl AgentExecutor for CliRunner {
    async fn execute(
        &self,
        task_id: &TaskId,
        agent_id: &str,
        prompt: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<String> {
        let (program, args) = self.command_for(agent_id)?;
        mlog_debug!(
            "runner: {} via {} ({} args)",
            task_id,
            program.display(),
            args.len()
        );

        let child = Command::new(&program)
            .args(&args)
            .arg(prompt)
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled(task_id.clone()));
            }
            result = tokio::time::timeout(timeout, child) => {
                result.map_err(|_| Error::Timeout(timeout))?.map_err(Error::Io)?
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                format!(
                    "agent {} exited with code {}",
                    agent_id,
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            return Err(Error::AgentNotAvailable(message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
