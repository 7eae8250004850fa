pub mod chat;
pub mod plan;
pub mod runtime;
pub mod skill;
pub mod status;

pub use chat::ChatTool;
pub use plan::{PlanTool, PLAN_TOOL};
pub use runtime::ToolRuntime;
pub use skill::SkillTool;
pub use status::GetStatusTool;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::skills::SkillScheduler;
use crate::types::TaskId;
use crate::world::{MotorControl, WorldState};

pub struct ToolContext {
    pub task_id: TaskId,
    pub world: Arc<dyn WorldState>,
    pub motor: Arc<dyn MotorControl>,
    pub scheduler: Arc<SkillScheduler>,
    /// Child of the task's token; cancelled when the task stops or the call times out.
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
}

impl ToolResult {
    pub fn ok(output: impl Into<Value>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(output: impl Into<Value>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }

    /// Observation text fed back to the model.
    pub fn render(&self) -> String {
        match &self.output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value, context: &ToolContext) -> Result<ToolResult>;
}
