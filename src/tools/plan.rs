use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolContext, ToolResult};

pub const PLAN_TOOL: &str = "plan";

/// Lets the model restate its intent. Has no effect on the world.
pub struct PlanTool;

#[async_trait]
impl Tool for PlanTool {
    fn name(&self) -> &str {
        PLAN_TOOL
    }

    fn description(&self) -> &str {
        "State your plan for the goal as a short list of steps before acting."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "steps": {
                    "type": "string",
                    "description": "The steps you intend to take, in order"
                }
            },
            "required": ["steps"]
        })
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> Result<ToolResult> {
        let steps = params["steps"]
            .as_str()
            .ok_or_else(|| anyhow!("Missing steps parameter"))?;
        log::debug!("task {} plan: {}", context.task_id, steps);
        Ok(ToolResult::ok("Plan noted. Carry it out."))
    }
}
