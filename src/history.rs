//! Result persistence.
//!
//! Every terminal task result is written as a JSON file under
//! `~/.maestro/history/<task-id>.json`, so stored output can be
//! recovered by task id after the in-memory table is gone.

use crate::core::task::{TaskId, TaskResult};
use crate::error::Result;
use crate::mlog_debug;
use std::path::PathBuf;

/// File-backed store of task results, one JSON file per task.
#[derive(Debug, Clone)]
pub struct History {
    dir: PathBuf,
}

impl History {
    /// Open the default store under `~/.maestro/history`.
    pub fn open_default() -> Result<Self> {
        Self::at(crate::config::history_dir()?)
    }

    /// Open a store rooted at an explicit directory.
    pub fn at(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &TaskId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Persist a result, overwriting any previous record for the id.
    pub fn store(&self, result: &TaskResult) -> Result<()> {
        let json = serde_json::to_string_pretty(result)?;
        std::fs::write(self.path_for(&result.task_id), json)?;
        mlog_debug!("history: stored result for {}", result.task_id);
        Ok(())
    }

    /// Load a stored result by task id, if one exists.
    pub fn load(&self, id: &TaskId) -> Result<Option<TaskResult>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Ids of every stored result.
    pub fn list_ids(&self) -> Result<Vec<TaskId>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(TaskId::from(stem));
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_history() -> (TempDir, History) {
        let dir = TempDir::new().unwrap();
        let history = History::at(dir.path().to_path_buf()).unwrap();
        (dir, history)
    }

    #[test]
    fn test_history_store_and_load() {
        let (_dir, history) = temp_history();
        let result = TaskResult::success(TaskId::from("x-pm-0"), "the plan".to_string());

        history.store(&result).unwrap();
        let loaded = history.load(&TaskId::from("x-pm-0")).unwrap().unwrap();

        assert_eq!(loaded, result);
    }

    #[test]
    fn test_history_load_missing_is_none() {
        let (_dir, history) = temp_history();
        assert!(history.load(&TaskId::from("ghost")).unwrap().is_none());
    }

    #[test]
    fn test_history_store_overwrites() {
        let (_dir, history) = temp_history();
        let id = TaskId::from("x-pm-0");

        history
            .store(&TaskResult::success(id.clone(), "first".to_string()))
            .unwrap();
        history
            .store(&TaskResult::failure(id.clone(), "second".to_string()))
            .unwrap();

        let loaded = history.load(&id).unwrap().unwrap();
        assert!(!loaded.success);
        assert_eq!(loaded.error.as_deref(), Some("second"));
    }

    #[test]
    fn test_history_list_ids_sorted() {
        let (_dir, history) = temp_history();
        for id in ["x-qa-2", "x-pm-0", "x-ba-1"] {
            history
                .store(&TaskResult::success(TaskId::from(id), String::new()))
                .unwrap();
        }

        let ids = history.list_ids().unwrap();
        assert_eq!(
            ids,
            vec![
                TaskId::from("x-ba-1"),
                TaskId::from("x-pm-0"),
                TaskId::from("x-qa-2"),
            ]
        );
    }
}
