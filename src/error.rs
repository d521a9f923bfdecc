use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Adding task {id} would create a dependency cycle")]
    CycleDetected { id: crate::core::task::TaskId },

    #[error("Task not found: {0}")]
    TaskNotFound(crate::core::task::TaskId),

    #[error("Unknown message target: {0}")]
    Routing(String),

    #[error("Agent not available: {0}")]
    AgentNotAvailable(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task {0} was cancelled")]
    Cancelled(crate::core::task::TaskId),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::TaskId;

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", Error::NoHomeDir), "No home directory");
        assert_eq!(
            format!("{}", Error::Parse("bad token".to_string())),
            "Parse error: bad token"
        );
        assert_eq!(
            format!("{}", Error::Routing("ghost".to_string())),
            "Unknown message target: ghost"
        );
    }

    #[test]
    fn test_cycle_error_names_task() {
        let err = Error::CycleDetected {
            id: TaskId::from("t1"),
        };
        assert!(format!("{}", err).contains("t1"));
        assert!(format!("{}", err).contains("cycle"));
    }

    #[test]
    fn test_cancelled_is_distinguishable() {
        let err = Error::Cancelled(TaskId::from("t1"));
        assert!(matches!(err, Error::Cancelled(_)));
        assert!(!matches!(err, Error::Timeout(_)));
    }
}
