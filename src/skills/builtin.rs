use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{ContinuousSkill, OneShotSkill, ParamType, SkillContext, SkillParam, SkillScheduler};
use crate::types::{ActorKind, Position};
use crate::world::{best_food, best_weapon, is_hostile, WorldState};

/// Register every built-in skill with `scheduler`.
pub fn register_defaults(scheduler: &SkillScheduler) {
    scheduler.register_continuous(Arc::new(AutoEat::default()));
    scheduler.register_continuous(Arc::new(SelfDefense::default()));
    scheduler.register_one_shot(Arc::new(GoTo));
    scheduler.register_one_shot(Arc::new(AttackEntity));
    scheduler.register_one_shot(Arc::new(EquipItem));
}

/// Eats the best food in the inventory once hunger drops below a threshold.
pub struct AutoEat {
    pub hunger_threshold: f32,
}

impl Default for AutoEat {
    fn default() -> Self {
        Self {
            hunger_threshold: 14.0,
        }
    }
}

#[async_trait]
impl ContinuousSkill for AutoEat {
    fn name(&self) -> &str {
        "auto_eat"
    }

    fn description(&self) -> &str {
        "Eat when hungry"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(2)
    }

    fn priority(&self) -> i32 {
        3
    }

    async fn check(&self, world: &dyn WorldState) -> Result<Option<Value>> {
        let vitals = world.vitals().await?;
        if vitals.food >= self.hunger_threshold {
            return Ok(None);
        }
        let inventory = world.inventory().await?;
        Ok(best_food(&inventory).map(|item| json!({ "item": item })))
    }

    async fn run(&self, args: Value, ctx: &SkillContext) -> Result<()> {
        let item = args["item"]
            .as_str()
            .ok_or_else(|| anyhow!("auto_eat needs an item"))?;
        ctx.motor.equip(item).await?;
        ctx.checkpoint()?;
        ctx.motor.consume().await?;
        log::info!("auto_eat: ate {}", item);
        Ok(())
    }
}

/// Fights back against hostiles that get within melee range.
pub struct SelfDefense {
    pub range: f64,
}

impl Default for SelfDefense {
    fn default() -> Self {
        Self { range: 4.0 }
    }
}

#[async_trait]
impl ContinuousSkill for SelfDefense {
    fn name(&self) -> &str {
        "self_defense"
    }

    fn description(&self) -> &str {
        "Attack hostiles in melee range"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn priority(&self) -> i32 {
        8
    }

    fn involves_movement(&self) -> bool {
        true
    }

    async fn check(&self, world: &dyn WorldState) -> Result<Option<Value>> {
        let me = world.position().await?;
        let nearest = world
            .nearby_actors(self.range)
            .await?
            .into_iter()
            .filter(|a| a.kind == ActorKind::Hostile || is_hostile(&a.name))
            .min_by(|a, b| {
                a.position
                    .distance_to(&me)
                    .total_cmp(&b.position.distance_to(&me))
            });
        Ok(nearest.map(|a| json!({ "entity": a.id, "name": a.name })))
    }

    async fn run(&self, args: Value, ctx: &SkillContext) -> Result<()> {
        let Some(_lock) = ctx.state.try_lock_movement(self.name(), self.priority()) else {
            log::debug!("self_defense: movement lock refused");
            return Ok(());
        };
        let entity = args["entity"]
            .as_u64()
            .ok_or_else(|| anyhow!("self_defense needs an entity id"))? as u32;

        let inventory = ctx.world.inventory().await?;
        if let Some(weapon) = best_weapon(&inventory) {
            if ctx.world.held_item().await?.as_deref() != Some(weapon) {
                ctx.motor.equip(weapon).await?;
            }
        }
        ctx.checkpoint()?;
        ctx.motor.attack(entity).await?;
        log::info!("self_defense: attacked {}", args["name"]);
        Ok(())
    }
}

/// Walks to a coordinate in short legs, checking cancellation between legs.
pub struct GoTo;

const ARRIVAL_DISTANCE: f64 = 1.0;

#[async_trait]
impl OneShotSkill for GoTo {
    fn name(&self) -> &str {
        "go_to"
    }

    fn description(&self) -> &str {
        "Walk to the given coordinates"
    }

    fn params(&self) -> Vec<SkillParam> {
        vec![
            SkillParam::required("x", ParamType::Number, "target x"),
            SkillParam::required("y", ParamType::Number, "target y"),
            SkillParam::required("z", ParamType::Number, "target z"),
            SkillParam::optional("step", ParamType::Number, "blocks per leg", json!(4.0)),
        ]
    }

    async fn execute(&self, args: Value, ctx: &SkillContext) -> Result<String> {
        let coord = |key: &str| {
            args[key]
                .as_f64()
                .ok_or_else(|| anyhow!("'{}' must be a number", key))
        };
        let target = Position::new(coord("x")?, coord("y")?, coord("z")?);
        let step = coord("step")?.max(0.5);

        let start = ctx.world.position().await?;
        let max_legs = (start.distance_to(&target) / step).ceil() as usize + 5;

        for _ in 0..max_legs {
            ctx.checkpoint()?;
            let here = ctx.world.position().await?;
            let remaining = here.distance_to(&target);
            if remaining <= ARRIVAL_DISTANCE {
                return Ok(format!("arrived at {}", target));
            }
            let t = (step / remaining).min(1.0);
            let next = Position::new(
                here.x + (target.x - here.x) * t,
                here.y + (target.y - here.y) * t,
                here.z + (target.z - here.z) * t,
            );
            ctx.motor.move_toward(next, Duration::from_millis(250)).await?;
        }

        let here = ctx.world.position().await?;
        if here.distance_to(&target) <= ARRIVAL_DISTANCE {
            Ok(format!("arrived at {}", target))
        } else {
            Err(anyhow!("stuck at {} on the way to {}", here, target))
        }
    }
}

/// Attacks the nearest actor with the given name until it is gone.
pub struct AttackEntity;

#[async_trait]
impl OneShotSkill for AttackEntity {
    fn name(&self) -> &str {
        "attack_entity"
    }

    fn description(&self) -> &str {
        "Attack the nearest entity with the given name"
    }

    fn params(&self) -> Vec<SkillParam> {
        vec![
            SkillParam::required("name", ParamType::String, "entity name, e.g. zombie"),
            SkillParam::optional("max_hits", ParamType::Integer, "give up after this many hits", json!(5)),
        ]
    }

    async fn execute(&self, args: Value, ctx: &SkillContext) -> Result<String> {
        let name = args["name"].as_str().unwrap_or_default().to_string();
        let max_hits = args["max_hits"].as_u64().unwrap_or(5);

        let me = ctx.world.position().await?;
        let target = ctx
            .world
            .nearby_actors(16.0)
            .await?
            .into_iter()
            .filter(|a| a.name == name)
            .min_by(|a, b| {
                a.position
                    .distance_to(&me)
                    .total_cmp(&b.position.distance_to(&me))
            })
            .ok_or_else(|| anyhow!("no {} nearby", name))?;

        let inventory = ctx.world.inventory().await?;
        if let Some(weapon) = best_weapon(&inventory) {
            ctx.motor.equip(weapon).await?;
        }

        for hit in 1..=max_hits {
            ctx.checkpoint()?;
            ctx.motor.attack(target.id).await?;
            let still_there = ctx
                .world
                .nearby_actors(16.0)
                .await?
                .iter()
                .any(|a| a.id == target.id);
            if !still_there {
                return Ok(format!("defeated {} after {} hit(s)", name, hit));
            }
        }
        Ok(format!("hit {} {} times; it is still around", name, max_hits))
    }
}

pub struct EquipItem;

#[async_trait]
impl OneShotSkill for EquipItem {
    fn name(&self) -> &str {
        "equip_item"
    }

    fn description(&self) -> &str {
        "Hold an item from the inventory"
    }

    fn params(&self) -> Vec<SkillParam> {
        vec![SkillParam::required("item", ParamType::String, "item name")]
    }

    async fn execute(&self, args: Value, ctx: &SkillContext) -> Result<String> {
        let item = args["item"].as_str().unwrap_or_default();
        let count = ctx.world.inventory().await?.get(item).copied().unwrap_or(0);
        if count == 0 {
            anyhow::bail!("no {} in inventory", item);
        }
        ctx.motor.equip(item).await?;
        Ok(format!("now holding {}", item))
    }
}
