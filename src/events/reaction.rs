use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::EventType;

/// Which handler an event is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionType {
    /// Bounded reflex through the emergency agent.
    Emergency,
    /// Natural-language goal handed to the task loop.
    Task,
    /// Left to always-on continuous skills.
    Immediate,
    /// Logged only.
    Info,
}

impl ReactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionType::Emergency => "emergency",
            ReactionType::Task => "task",
            ReactionType::Immediate => "immediate",
            ReactionType::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionConfig {
    pub enabled: bool,
    pub reaction_type: ReactionType,
    /// Chance in percent (0..=100) that an eligible event is acted on.
    pub probability: u8,
    /// Only react while the agent is idle.
    pub idle_only: bool,
}

impl ReactionConfig {
    pub fn new(reaction_type: ReactionType, probability: u8, idle_only: bool) -> Self {
        Self {
            enabled: true,
            reaction_type,
            probability: probability.min(100),
            idle_only,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Per event-type reaction policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionTable {
    entries: BTreeMap<EventType, ReactionConfig>,
}

impl ReactionTable {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, event_type: EventType) -> Option<&ReactionConfig> {
        self.entries.get(&event_type)
    }

    pub fn set(&mut self, event_type: EventType, mut config: ReactionConfig) {
        config.probability = config.probability.min(100);
        self.entries.insert(event_type, config);
    }

    pub fn remove(&mut self, event_type: EventType) -> Option<ReactionConfig> {
        self.entries.remove(&event_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventType, &ReactionConfig)> {
        self.entries.iter().map(|(t, c)| (*t, c))
    }
}

impl Default for ReactionTable {
    fn default() -> Self {
        use ReactionType::*;

        let mut table = Self::empty();
        table.set(EventType::TimeChange, ReactionConfig::new(Task, 50, true));
        table.set(EventType::WeatherChange, ReactionConfig::new(Task, 50, true));
        table.set(EventType::BiomeChange, ReactionConfig::new(Task, 60, true));
        table.set(EventType::Teleport, ReactionConfig::new(Task, 100, true));
        table.set(EventType::ItemGained, ReactionConfig::new(Info, 100, true));
        table.set(EventType::HostileApproach, ReactionConfig::new(Task, 100, true));
        table.set(EventType::Damage, ReactionConfig::new(Emergency, 100, true));
        table.set(EventType::Suffocation, ReactionConfig::new(Emergency, 100, false));
        table.set(EventType::PlayerLooking, ReactionConfig::new(Task, 30, true));
        table.set(EventType::PlayerSpeaking, ReactionConfig::new(Task, 100, false));
        table
    }
}
