use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ChatTool, GetStatusTool, PlanTool, SkillTool, Tool, ToolContext, ToolResult};
use crate::error::CoreError;
use crate::providers::{ToolCallRequest, ToolSpec};
use crate::skills::SkillScheduler;

/// Name-keyed tool registry offered to the task loop.
pub struct ToolRuntime {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRuntime {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// `plan`, `chat`, `get_status`, plus one tool per registered one-shot skill.
    pub fn with_defaults(scheduler: &SkillScheduler) -> Self {
        let mut runtime = Self::new();
        runtime.register(Arc::new(PlanTool));
        runtime.register(Arc::new(ChatTool));
        runtime.register(Arc::new(GetStatusTool));
        for skill in scheduler.one_shot_skills() {
            runtime.register(Arc::new(SkillTool::new(skill)));
        }
        runtime
    }

    /// Returns `false` if the name was already taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> bool {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            log::warn!("tool '{}' already registered", name);
            return false;
        }
        self.tools.insert(name, tool);
        true
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn is_allowed(name: &str, allowed: Option<&[String]>) -> bool {
        allowed.map_or(true, |names| names.iter().any(|n| n == name))
    }

    /// Specs for every tool, or only the allowed ones.
    pub fn get_schemas(&self, allowed: Option<&[String]>) -> Vec<ToolSpec> {
        self.tools
            .values()
            .filter(|tool| Self::is_allowed(tool.name(), allowed))
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    pub async fn execute(&self, call: &ToolCallRequest, context: &ToolContext) -> Result<ToolResult> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| CoreError::UnknownTool(call.name.clone()))?;
        log::debug!("tool call {} {}", call.name, call.arguments);
        tool.execute(call.arguments.clone(), context).await
    }
}

impl Default for ToolRuntime {
    fn default() -> Self {
        Self::new()
    }
}
