use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolContext, ToolResult};

/// Longest line the game chat accepts.
const MAX_CHAT_LEN: usize = 256;

pub struct ChatTool;

#[async_trait]
impl Tool for ChatTool {
    fn name(&self) -> &str {
        "chat"
    }

    fn description(&self) -> &str {
        "Say something in the game chat so nearby players can read it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "What to say"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> Result<ToolResult> {
        let message = params["message"]
            .as_str()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| anyhow!("Missing message parameter"))?;

        let line: String = message.chars().take(MAX_CHAT_LEN).collect();
        context.motor.chat(&line).await?;
        Ok(ToolResult::ok(json!({ "said": line })))
    }
}
