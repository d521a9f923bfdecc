//! Core orchestration data structures: tasks, the dependency graph,
//! and dependency output injection.

pub mod graph;
pub mod inject;
pub mod task;
