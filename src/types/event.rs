use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Position, TimePhase, Weather};

/// Immutable record of something the environment produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attacker {
    pub name: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    TimeChange {
        from: TimePhase,
        to: TimePhase,
    },
    WeatherChange {
        from: Weather,
        to: Weather,
    },
    BiomeChange {
        from: Option<String>,
        to: String,
        is_rare: bool,
    },
    Teleport {
        from: Position,
        to: Position,
        distance: f64,
    },
    ItemGained {
        item: String,
        count: u32,
        /// Players close enough to have handed the item over.
        nearby: Vec<String>,
    },
    HostileApproach {
        nearest: String,
        distance: f64,
        count: usize,
        positions: Vec<Position>,
    },
    Damage {
        damage: f32,
        current_health: f32,
        consecutive_count: u32,
        attacker: Option<Attacker>,
    },
    Suffocation {
        in_liquid: bool,
        oxygen: u32,
    },
    PlayerLooking {
        player: String,
        distance: f64,
    },
    PlayerSpeaking {
        player: String,
        message: String,
    },
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::TimeChange { .. } => EventType::TimeChange,
            EventKind::WeatherChange { .. } => EventType::WeatherChange,
            EventKind::BiomeChange { .. } => EventType::BiomeChange,
            EventKind::Teleport { .. } => EventType::Teleport,
            EventKind::ItemGained { .. } => EventType::ItemGained,
            EventKind::HostileApproach { .. } => EventType::HostileApproach,
            EventKind::Damage { .. } => EventType::Damage,
            EventKind::Suffocation { .. } => EventType::Suffocation,
            EventKind::PlayerLooking { .. } => EventType::PlayerLooking,
            EventKind::PlayerSpeaking { .. } => EventType::PlayerSpeaking,
        }
    }
}

/// Payload-free discriminant of [`EventKind`], used as the reaction policy key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TimeChange,
    WeatherChange,
    BiomeChange,
    Teleport,
    ItemGained,
    HostileApproach,
    Damage,
    Suffocation,
    PlayerLooking,
    PlayerSpeaking,
}

impl EventType {
    pub const ALL: [EventType; 10] = [
        EventType::TimeChange,
        EventType::WeatherChange,
        EventType::BiomeChange,
        EventType::Teleport,
        EventType::ItemGained,
        EventType::HostileApproach,
        EventType::Damage,
        EventType::Suffocation,
        EventType::PlayerLooking,
        EventType::PlayerSpeaking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TimeChange => "time_change",
            EventType::WeatherChange => "weather_change",
            EventType::BiomeChange => "biome_change",
            EventType::Teleport => "teleport",
            EventType::ItemGained => "item_gained",
            EventType::HostileApproach => "hostile_approach",
            EventType::Damage => "damage",
            EventType::Suffocation => "suffocation",
            EventType::PlayerLooking => "player_looking",
            EventType::PlayerSpeaking => "player_speaking",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        EventType::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trip_names() {
        for t in EventType::ALL {
            assert_eq!(EventType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(EventType::from_str("earthquake"), None);
    }

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let event = Event::new(EventKind::Damage {
            damage: 9.0,
            current_health: 6.0,
            consecutive_count: 1,
            attacker: None,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"]["kind"], "damage");
        assert_eq!(value["kind"]["current_health"], 6.0);
        assert_eq!(event.event_type(), EventType::Damage);
    }
}
