use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{Tool, ToolContext, ToolResult};
use crate::skills::{parameters_schema, OneShotSkill};

/// Exposes one one-shot skill to the model. Runs go through the scheduler,
/// so a busy agent yields a failed observation instead of a second run.
pub struct SkillTool {
    skill: Arc<dyn OneShotSkill>,
}

impl SkillTool {
    pub fn new(skill: Arc<dyn OneShotSkill>) -> Self {
        Self { skill }
    }
}

#[async_trait]
impl Tool for SkillTool {
    fn name(&self) -> &str {
        self.skill.name()
    }

    fn description(&self) -> &str {
        self.skill.description()
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema(&self.skill.params())
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> Result<ToolResult> {
        let run = context
            .scheduler
            .run_one_shot_with_cancel(self.skill.name(), params, &context.cancel)
            .await;
        Ok(if run.success {
            ToolResult::ok(run.message)
        } else {
            ToolResult::failure(run.message)
        })
    }
}
