use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolContext, ToolResult};
use crate::engine::context::describe_world;

/// Fresh live-state snapshot, for when the one in the prompt is stale.
pub struct GetStatusTool;

#[async_trait]
impl Tool for GetStatusTool {
    fn name(&self) -> &str {
        "get_status"
    }

    fn description(&self) -> &str {
        "Look at your current position, health, inventory and surroundings."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _params: Value, context: &ToolContext) -> Result<ToolResult> {
        let snapshot = describe_world(context.world.as_ref()).await?;
        let busy = context.scheduler.state().running_one_shot();
        let text = match busy {
            Some(skill) => format!("{}\nbusy with: {}", snapshot, skill),
            None => snapshot,
        };
        Ok(ToolResult::ok(text))
    }
}
