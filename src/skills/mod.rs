pub mod builtin;
pub mod scheduler;
pub mod state;

pub use scheduler::{
    ContinuousRun, ContinuousRunOutcome, EnqueueOutcome, ScheduledTask, SchedulerConfig,
    SkillScheduler,
};
pub use state::{ExecutionState, MovementLock, OneShotGuard, TaskActivityGuard};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::world::{MotorControl, WorldState};

/// Everything a skill needs while it runs.
#[derive(Clone)]
pub struct SkillContext {
    pub world: Arc<dyn WorldState>,
    pub motor: Arc<dyn MotorControl>,
    pub state: Arc<ExecutionState>,
    pub cancel: CancellationToken,
}

impl SkillContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Step boundary: bail out with [`CoreError::Cancelled`] once cancellation was requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::Cancelled.into());
        }
        Ok(())
    }
}

/// Behavior ticked repeatedly for the life of the process.
#[async_trait]
pub trait ContinuousSkill: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// How often the precondition is checked.
    fn interval(&self) -> Duration;
    /// Higher is more important.
    fn priority(&self) -> i32;
    fn involves_movement(&self) -> bool {
        false
    }

    /// Returns the arguments for a run when the skill's preconditions hold.
    async fn check(&self, world: &dyn WorldState) -> Result<Option<Value>>;

    /// Movement skills must take their own lock through
    /// [`ExecutionState::try_lock_movement`] and return early when refused.
    async fn run(&self, args: Value, ctx: &SkillContext) -> Result<()>;
}

/// Discrete, parameterized action run to completion on demand.
#[async_trait]
pub trait OneShotSkill: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn params(&self) -> Vec<SkillParam>;

    /// `args` has already been validated against [`OneShotSkill::params`]
    /// with defaults filled in. Long runs call `ctx.checkpoint()` between steps.
    async fn execute(&self, args: Value, ctx: &SkillContext) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillParam {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    pub default: Option<Value>,
}

impl SkillParam {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &str, param_type: ParamType, description: &str, default: Value) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: false,
            default: Some(default),
        }
    }
}

/// JSON schema for a parameter list, in the shape tool specs use.
pub fn parameters_schema(params: &[SkillParam]) -> Value {
    let mut properties = Map::new();
    for p in params {
        let mut prop = json!({
            "type": p.param_type.as_str(),
            "description": p.description,
        });
        if let Some(default) = &p.default {
            prop["default"] = default.clone();
        }
        properties.insert(p.name.clone(), prop);
    }
    let required: Vec<&str> = params
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Validate `args` against `params` and fill in defaults.
pub fn resolve_args(params: &[SkillParam], args: Value) -> Result<Value, CoreError> {
    let mut object = match args {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(CoreError::InvalidArguments(format!(
                "expected an object, got {}",
                other
            )))
        }
    };

    for p in params {
        let present = object.get(&p.name).filter(|v| !v.is_null()).cloned();
        match present {
            Some(value) => {
                if !p.param_type.accepts(&value) {
                    return Err(CoreError::InvalidArguments(format!(
                        "'{}' must be {}",
                        p.name,
                        p.param_type.as_str()
                    )));
                }
            }
            _ if p.required => {
                return Err(CoreError::InvalidArguments(format!(
                    "missing required parameter '{}'",
                    p.name
                )));
            }
            _ => {
                if let Some(default) = &p.default {
                    object.insert(p.name.clone(), default.clone());
                }
            }
        }
    }

    Ok(Value::Object(object))
}

/// Structured outcome of a one-shot run. Never raised, always returned.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillRunResult {
    pub success: bool,
    pub message: String,
    pub error: Option<CoreError>,
}

impl SkillRunResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
        }
    }

    pub fn failed(error: CoreError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            error: Some(error),
        }
    }

    pub fn failed_with(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.error, Some(CoreError::SkillBusy { .. }))
    }
}
