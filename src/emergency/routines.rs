use anyhow::{anyhow, Result};
use rand::Rng;
use std::time::Duration;

use super::{EmergencyAction, EmergencyConfig};
use crate::types::ActorKind;
use crate::world::{is_hostile, MotorControl, WorldState};

/// Fixed motor routine for one emergency action.
pub async fn execute(
    action: &EmergencyAction,
    world: &dyn WorldState,
    motor: &dyn MotorControl,
    config: &EmergencyConfig,
) -> Result<()> {
    match action {
        EmergencyAction::Flee { direction } => {
            let (dx, dz) = direction.unwrap_or_else(random_direction);
            let here = world.position().await?;
            let target = here.offset(dx * config.flee_distance, 0.0, dz * config.flee_distance);
            motor
                .move_toward(target, Duration::from_millis(config.flee_duration_ms))
                .await
        }
        EmergencyAction::Eat { item } => {
            motor.equip(item).await?;
            motor.consume().await
        }
        EmergencyAction::Equip { item } => motor.equip(item).await,
        EmergencyAction::Attack { entity } => {
            let target = match entity {
                Some(id) => *id,
                None => {
                    let me = world.position().await?;
                    world
                        .nearby_actors(config.attack_radius)
                        .await?
                        .into_iter()
                        .filter(|a| a.kind == ActorKind::Hostile || is_hostile(&a.name))
                        .min_by(|a, b| {
                            a.position
                                .distance_to(&me)
                                .total_cmp(&b.position.distance_to(&me))
                        })
                        .map(|a| a.id)
                        .ok_or_else(|| anyhow!("nothing to attack"))?
                }
            };
            motor.attack(target).await
        }
        EmergencyAction::DigUp => {
            motor.dig_block_above().await?;
            motor.jump(Duration::from_millis(300)).await
        }
        EmergencyAction::SwimUp => motor.jump(Duration::from_secs(1)).await,
        EmergencyAction::None => Ok(()),
    }
}

fn random_direction() -> (f64, f64) {
    let angle = rand::thread_rng().gen_range(0.0..std::f64::consts::TAU);
    (angle.cos(), angle.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Actor, Position};
    use crate::world::{MotorCommand, SimulatedWorld};

    #[tokio::test]
    async fn test_flee_moves_along_direction() {
        let world = SimulatedWorld::new();
        let config = EmergencyConfig::default();
        let action = EmergencyAction::Flee {
            direction: Some((1.0, 0.0)),
        };
        execute(&action, &world, &world, &config).await.unwrap();
        assert_eq!(
            world.commands(),
            vec![MotorCommand::MoveToward(Position::new(8.0, 64.0, 0.0))]
        );
    }

    #[tokio::test]
    async fn test_random_flee_keeps_distance() {
        let world = SimulatedWorld::new();
        let config = EmergencyConfig::default();
        execute(&EmergencyAction::Flee { direction: None }, &world, &world, &config)
            .await
            .unwrap();
        let moved = world.position().await.unwrap();
        assert!((moved.distance_to(&Position::new(0.0, 64.0, 0.0)) - 8.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_dig_up_then_jump() {
        let world = SimulatedWorld::new();
        execute(&EmergencyAction::DigUp, &world, &world, &EmergencyConfig::default())
            .await
            .unwrap();
        assert_eq!(
            world.commands(),
            vec![MotorCommand::DigBlockAbove, MotorCommand::Jump]
        );
    }

    #[tokio::test]
    async fn test_attack_picks_nearest_hostile() {
        let world = SimulatedWorld::new();
        world
            .set_actors(vec![
                Actor::new(1, "cow", ActorKind::Passive, Position::new(1.0, 64.0, 0.0)),
                Actor::new(2, "zombie", ActorKind::Hostile, Position::new(3.0, 64.0, 0.0)),
            ])
            .unwrap();
        execute(
            &EmergencyAction::Attack { entity: None },
            &world,
            &world,
            &EmergencyConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(world.commands(), vec![MotorCommand::Attack(2)]);
    }
}
