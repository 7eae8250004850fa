use super::{EmergencyAction, EmergencyConfig};
use crate::types::{EventKind, Position};

/// Snapshot of the body taken at the start of an emergency response.
#[derive(Debug, Clone, PartialEq)]
pub struct Situation {
    pub position: Position,
    pub health: f32,
    pub food: f32,
    pub held_item: Option<String>,
    pub best_food: Option<String>,
    pub best_weapon: Option<String>,
}

/// Ordered reflex rules; `None` hands the decision to the model.
pub fn decide(event: &EventKind, situation: &Situation, config: &EmergencyConfig) -> Option<EmergencyAction> {
    match event {
        EventKind::Suffocation { in_liquid, .. } => Some(if *in_liquid {
            EmergencyAction::SwimUp
        } else {
            EmergencyAction::DigUp
        }),

        EventKind::Damage {
            current_health,
            consecutive_count,
            attacker,
            ..
        } => {
            if *current_health < config.critical_health {
                if let Some(item) = &situation.best_food {
                    return Some(EmergencyAction::Eat { item: item.clone() });
                }
            }
            if *consecutive_count >= config.burst_hits {
                let direction = attacker
                    .as_ref()
                    .and_then(|a| situation.position.horizontal_direction_from(&a.position));
                return Some(EmergencyAction::Flee { direction });
            }
            match (attacker, &situation.best_weapon) {
                (Some(_), Some(weapon)) => Some(EmergencyAction::Equip {
                    item: weapon.clone(),
                }),
                _ => None,
            }
        }

        EventKind::HostileApproach {
            count, positions, ..
        } => {
            if *count >= config.hostile_crowd {
                let direction = Position::centroid(positions)
                    .and_then(|c| situation.position.horizontal_direction_from(&c));
                return Some(EmergencyAction::Flee { direction });
            }
            situation
                .best_weapon
                .as_ref()
                .map(|weapon| EmergencyAction::Equip {
                    item: weapon.clone(),
                })
        }

        _ => None,
    }
}
