use std::time::Duration;

use thiserror::Error;

/// Failure kinds surfaced by the control core.
///
/// Collaborators (world, motor, model, tools) report failures through
/// `anyhow`; the core folds those into one of these variants at its
/// boundaries so callers always receive a structured result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("{operation} timed out after {}ms", after.as_millis())]
    Timeout {
        operation: String,
        after: Duration,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("skill busy: '{running}' is already running")]
    SkillBusy { running: String },

    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("malformed model output: {0}")]
    MalformedModelOutput(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("gave up after {iterations} iterations")]
    IterationBudget { iterations: usize },

    #[error("model call failed: {0}")]
    Model(String),
}

impl CoreError {
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        CoreError::Timeout {
            operation: operation.into(),
            after,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CoreError::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = CoreError::timeout("model call", Duration::from_secs(30));
        assert_eq!(err.to_string(), "model call timed out after 30000ms");
        assert!(err.is_timeout());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_busy_display() {
        let err = CoreError::SkillBusy {
            running: "go_to".to_string(),
        };
        assert_eq!(err.to_string(), "skill busy: 'go_to' is already running");
    }
}
