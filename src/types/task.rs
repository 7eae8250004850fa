use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;

pub type TaskId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLine {
    pub speaker: String,
    pub text: String,
}

impl ChatLine {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }
}

/// A natural-language goal for one run of the task loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: TaskId,
    pub goal: String,
    pub history: Vec<ChatLine>,
    pub is_emergency: bool,
    /// Restricts the tools offered to the model for this run. `None` offers all.
    pub allowed_tools: Option<Vec<String>>,
}

impl AgentTask {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            id: TaskId::new_v4(),
            goal: goal.into(),
            history: Vec::new(),
            is_emergency: false,
            allowed_tools: None,
        }
    }

    pub fn with_history(mut self, history: Vec<ChatLine>) -> Self {
        self.history = history;
        self
    }

    pub fn emergency(mut self) -> Self {
        self.is_emergency = true;
        self
    }

    pub fn with_allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
}

/// One externally visible tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    pub tool: String,
    pub arguments: Value,
    pub status: StepStatus,
    pub result: Option<String>,
    pub failure_reason: Option<String>,
}

impl TaskStep {
    pub fn completed(tool: impl Into<String>, arguments: Value, result: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            status: StepStatus::Completed,
            result: Some(result.into()),
            failure_reason: None,
        }
    }

    pub fn failed(tool: impl Into<String>, arguments: Value, reason: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            status: StepStatus::Failed,
            result: None,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Task tree shaped outcome of a task loop run.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub steps: Vec<TaskStep>,
    pub final_message: Option<String>,
    pub forced_stop: bool,
    /// Number of budgeted iterations consumed.
    pub iterations: usize,
    #[serde(skip)]
    pub error: Option<CoreError>,
}

impl TaskResult {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            steps: Vec::new(),
            final_message: None,
            forced_stop: false,
            iterations: 0,
            error: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_builder() {
        let task = AgentTask::new("build a hut")
            .with_history(vec![ChatLine::new("alex", "can you build a hut?")])
            .with_allowed_tools(["plan", "go_to"]);

        assert_eq!(task.goal, "build a hut");
        assert_eq!(task.history.len(), 1);
        assert!(!task.is_emergency);
        assert_eq!(
            task.allowed_tools,
            Some(vec!["plan".to_string(), "go_to".to_string()])
        );
    }

    #[test]
    fn test_step_constructors() {
        let ok = TaskStep::completed("go_to", json!({"x": 1}), "arrived");
        assert_eq!(ok.status, StepStatus::Completed);
        assert_eq!(ok.result.as_deref(), Some("arrived"));

        let failed = TaskStep::failed("go_to", json!({}), "path blocked");
        assert_eq!(failed.status, StepStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("path blocked"));
    }

    #[test]
    fn test_result_serializes_status() {
        let mut result = TaskResult::new(TaskId::new_v4());
        result.status = TaskStatus::InProgress;
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "in_progress");
        assert!(value.get("error").is_none());
    }
}
