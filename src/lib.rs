pub mod config;
pub mod core;
pub mod error;
pub mod history;
pub mod log;
pub mod orchestration;
pub mod parser;

pub use crate::core::task::{Task, TaskId, TaskResult, TaskStatus};
pub use error::{Error, Result};
pub use orchestration::{ExecutionReport, ParallelExecutor, TaskManager};
