//! Task orchestration: translation, state management, and execution.

pub mod executor;
pub mod manager;
pub mod plan;
pub mod runner;

pub use executor::{ExecutionReport, ParallelExecutor, ProgressEvent};
pub use manager::TaskManager;
pub use plan::{plan_command, Plan};
pub use runner::{AgentExecutor, CliRunner};
