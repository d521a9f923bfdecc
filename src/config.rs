//! Configuration loading and persistence.
//!
//! Configuration lives at `~/.maestro/maestro.toml`. Missing files
//! fall back to defaults; unknown keys are ignored.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

fn default_max_concurrent() -> usize {
    2
}

fn default_timeout_secs() -> u64 {
    120
}

/// Per-agent overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Command line to launch this agent's CLI, overriding the global
    /// `command`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Human-readable name, used in injected output headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of tasks executing concurrently.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Default per-task timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Default command used to launch agent CLIs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Per-agent configuration keyed by agent id.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub agents: HashMap<String, AgentConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            default_timeout_secs: default_timeout_secs(),
            command: None,
            agents: HashMap::new(),
        }
    }
}

/// The maestro home directory: `~/.maestro`.
pub fn maestro_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".maestro"))
        .ok_or(Error::NoHomeDir)
}

/// Path to the configuration file.
pub fn config_path() -> Result<PathBuf> {
    Ok(maestro_dir()?.join("maestro.toml"))
}

/// Directory where task results are persisted.
pub fn history_dir() -> Result<PathBuf> {
    Ok(maestro_dir()?.join("history"))
}

impl Config {
    /// Load the configuration from disk, falling back to defaults when
    /// the file does not exist.
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Write the configuration to disk, creating `~/.maestro` if
    /// needed.
    pub fn save(&self) -> Result<()> {
        let dir = maestro_dir()?;
        std::fs::create_dir_all(&dir)?;
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(config_path()?, contents)?;
        Ok(())
    }

    /// The command used to launch a given agent: its own override if
    /// set, otherwise the global default.
    pub fn effective_command(&self, agent_id: &str) -> Option<&str> {
        self.agents
            .get(agent_id)
            .and_then(|a| a.command.as_deref())
            .or(self.command.as_deref())
    }

    /// Display name for an agent, falling back to the id itself.
    pub fn display_name<'a>(&'a self, agent_id: &'a str) -> &'a str {
        self.agents
            .get(agent_id)
            .and_then(|a| a.name.as_deref())
            .unwrap_or(agent_id)
    }

    /// Default task timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}
