pub mod routines;
pub mod rules;

pub use rules::{decide, Situation};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreError;
use crate::providers::{LLMProvider, Message};
use crate::types::{EntityId, Event, EventKind};
use crate::world::{best_food, best_weapon, MotorControl, WorldState, MAX_HEALTH};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    pub model_timeout_ms: u64,
    pub motor_timeout_ms: u64,
    pub critical_health: f32,
    pub burst_window_ms: u64,
    pub burst_hits: u32,
    pub hostile_crowd: usize,
    pub flee_distance: f64,
    pub flee_duration_ms: u64,
    pub attack_radius: f64,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            model_timeout_ms: 3_000,
            motor_timeout_ms: 5_000,
            critical_health: 10.0,
            burst_window_ms: 3_000,
            burst_hits: 3,
            hostile_crowd: 3,
            flee_distance: 8.0,
            flee_duration_ms: 2_000,
            attack_radius: 6.0,
        }
    }
}

/// One reflexive response.
#[derive(Debug, Clone, PartialEq)]
pub enum EmergencyAction {
    /// Unit horizontal direction `(dx, dz)`; `None` picks one at random.
    Flee { direction: Option<(f64, f64)> },
    Eat { item: String },
    Equip { item: String },
    Attack { entity: Option<EntityId> },
    DigUp,
    SwimUp,
    None,
}

impl EmergencyAction {
    pub const TAGS: [&'static str; 7] = ["flee", "eat", "equip", "attack", "dig_up", "swim_up", "none"];

    pub fn tag(&self) -> &'static str {
        match self {
            EmergencyAction::Flee { .. } => "flee",
            EmergencyAction::Eat { .. } => "eat",
            EmergencyAction::Equip { .. } => "equip",
            EmergencyAction::Attack { .. } => "attack",
            EmergencyAction::DigUp => "dig_up",
            EmergencyAction::SwimUp => "swim_up",
            EmergencyAction::None => "none",
        }
    }

    /// Turn a bare tag into a concrete action for the current situation.
    /// Tags whose payload cannot be satisfied resolve to `None`.
    pub fn from_tag(tag: &str, event: &Event, situation: &Situation) -> Option<EmergencyAction> {
        let action = match tag {
            "flee" => {
                let attacker = match &event.kind {
                    EventKind::Damage { attacker, .. } => attacker.as_ref(),
                    _ => None,
                };
                EmergencyAction::Flee {
                    direction: attacker
                        .and_then(|a| situation.position.horizontal_direction_from(&a.position)),
                }
            }
            "eat" => match &situation.best_food {
                Some(item) => EmergencyAction::Eat { item: item.clone() },
                None => EmergencyAction::None,
            },
            "equip" => match &situation.best_weapon {
                Some(item) => EmergencyAction::Equip { item: item.clone() },
                None => EmergencyAction::None,
            },
            "attack" => EmergencyAction::Attack { entity: None },
            "dig_up" => EmergencyAction::DigUp,
            "swim_up" => EmergencyAction::SwimUp,
            "none" => EmergencyAction::None,
            _ => return None,
        };
        Some(action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Rule,
    Model,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyOutcome {
    pub action: EmergencyAction,
    pub source: DecisionSource,
    /// The motor routine finished without error inside its time limit.
    pub executed: bool,
    /// Another response was already in flight; nothing was done.
    pub already_responding: bool,
}

impl EmergencyOutcome {
    fn nothing(source: DecisionSource) -> Self {
        Self {
            action: EmergencyAction::None,
            source,
            executed: false,
            already_responding: false,
        }
    }
}

const SYSTEM_PROMPT: &str = "You are the reflex system of an embodied game agent. \
A hazard just happened and none of the fixed rules applied. \
Pick exactly one action: flee, eat, equip, attack, dig_up, swim_up or none. \
Answer with JSON only.";

/// Selects and executes one [`EmergencyAction`] per hazard, one hazard at a time.
pub struct EmergencyAgent {
    world: Arc<dyn WorldState>,
    motor: Arc<dyn MotorControl>,
    llm: Arc<dyn LLMProvider>,
    config: EmergencyConfig,
    responding: AtomicBool,
}

struct RespondingGuard<'a>(&'a AtomicBool);

impl Drop for RespondingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EmergencyAgent {
    pub fn new(
        world: Arc<dyn WorldState>,
        motor: Arc<dyn MotorControl>,
        llm: Arc<dyn LLMProvider>,
        config: EmergencyConfig,
    ) -> Self {
        Self {
            world,
            motor,
            llm,
            config,
            responding: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EmergencyConfig {
        &self.config
    }

    pub fn is_responding(&self) -> bool {
        self.responding.load(Ordering::Acquire)
    }

    pub async fn respond_tag(&self, event: &Event) -> &'static str {
        self.respond(event).await.action.tag()
    }

    /// Never fails: every error path resolves to [`EmergencyAction::None`].
    pub async fn respond(&self, event: &Event) -> EmergencyOutcome {
        if self
            .responding
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("emergency response already in flight; skipping {}", event.event_type().as_str());
            return EmergencyOutcome {
                already_responding: true,
                ..EmergencyOutcome::nothing(DecisionSource::None)
            };
        }
        let _guard = RespondingGuard(&self.responding);

        let situation = match self.situation().await {
            Ok(situation) => situation,
            Err(e) => {
                log::warn!("emergency: could not read the world: {:#}", e);
                return EmergencyOutcome::nothing(DecisionSource::None);
            }
        };

        let (action, source) = match decide(&event.kind, &situation, &self.config) {
            Some(action) => (action, DecisionSource::Rule),
            None => match self.ask_model(event, &situation).await {
                EmergencyAction::None => (EmergencyAction::None, DecisionSource::None),
                action => (action, DecisionSource::Model),
            },
        };
        log::info!(
            "emergency: {} -> {} ({:?})",
            event.event_type().as_str(),
            action.tag(),
            source
        );

        if action == EmergencyAction::None {
            return EmergencyOutcome::nothing(source);
        }

        let limit = Duration::from_millis(self.config.motor_timeout_ms);
        let routine = routines::execute(&action, self.world.as_ref(), self.motor.as_ref(), &self.config);
        let executed = match tokio::time::timeout(limit, routine).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::warn!("emergency routine '{}' failed: {:#}", action.tag(), e);
                false
            }
            Err(_) => {
                log::warn!("emergency routine '{}' timed out after {}ms", action.tag(), limit.as_millis());
                false
            }
        };

        EmergencyOutcome {
            action,
            source,
            executed,
            already_responding: false,
        }
    }

    async fn situation(&self) -> Result<Situation> {
        let vitals = self.world.vitals().await?;
        let inventory = self.world.inventory().await?;
        Ok(Situation {
            position: self.world.position().await?,
            health: vitals.health,
            food: vitals.food,
            held_item: self.world.held_item().await?,
            best_food: best_food(&inventory).map(str::to_string),
            best_weapon: best_weapon(&inventory).map(str::to_string),
        })
    }

    async fn ask_model(&self, event: &Event, situation: &Situation) -> EmergencyAction {
        let limit = Duration::from_millis(self.config.model_timeout_ms);
        let messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(model_context(event, situation)),
        ];
        let schema = action_schema();

        let reply = match tokio::time::timeout(limit, self.llm.complete_structured(messages, &schema)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                log::warn!("emergency model call failed: {:#}", e);
                return EmergencyAction::None;
            }
            Err(_) => {
                log::warn!("{}", CoreError::timeout("emergency model call", limit));
                return EmergencyAction::None;
            }
        };

        if let Some(reason) = reply.get("reason").and_then(Value::as_str) {
            log::debug!("emergency model reasoning: {}", reason);
        }
        match parse_action(&reply, event, situation) {
            Ok(action) => action,
            Err(e) => {
                log::warn!("emergency: {}", e);
                EmergencyAction::None
            }
        }
    }
}

fn model_context(event: &Event, situation: &Situation) -> String {
    let event_json = serde_json::to_string(&event.kind).unwrap_or_else(|_| event.event_type().as_str().to_string());
    format!(
        "health: {:.0}/{:.0}\nfood: {:.0}/{:.0}\nholding: {}\nfood available: {}\nweapon available: {}\nevent: {}",
        situation.health,
        MAX_HEALTH,
        situation.food,
        MAX_HEALTH,
        situation.held_item.as_deref().unwrap_or("nothing"),
        situation.best_food.as_deref().unwrap_or("none"),
        situation.best_weapon.as_deref().unwrap_or("none"),
        event_json,
    )
}

fn action_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "string",
                "enum": EmergencyAction::TAGS,
            },
            "reason": { "type": "string" }
        },
        "required": ["action", "reason"],
        "additionalProperties": false
    })
}

fn parse_action(reply: &Value, event: &Event, situation: &Situation) -> Result<EmergencyAction, CoreError> {
    let tag = reply
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::MalformedModelOutput(reply.to_string()))?;
    EmergencyAction::from_tag(tag.trim(), event, situation)
        .ok_or_else(|| CoreError::MalformedModelOutput(format!("unknown action '{}'", tag)))
}
