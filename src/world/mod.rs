pub mod items;
pub mod memory;

pub use items::{best_food, best_weapon, is_food, is_hostile, is_weapon};
pub use memory::{MotorCommand, SimulatedWorld};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::types::{Actor, EntityId, Position, Weather};

/// Item name to count.
pub type InventorySnapshot = HashMap<String, u32>;

/// Maximum health and food level of the agent's body.
pub const MAX_HEALTH: f32 = 20.0;
pub const MAX_OXYGEN: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub health: f32,
    pub food: f32,
    pub oxygen: u32,
    pub in_liquid: bool,
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            health: MAX_HEALTH,
            food: MAX_HEALTH,
            oxygen: MAX_OXYGEN,
            in_liquid: false,
        }
    }
}

/// Read side of the live game client.
#[async_trait]
pub trait WorldState: Send + Sync {
    async fn vitals(&self) -> Result<Vitals>;
    async fn position(&self) -> Result<Position>;
    /// Horizontal facing of the agent in degrees.
    async fn facing(&self) -> Result<f64>;
    async fn inventory(&self) -> Result<InventorySnapshot>;
    async fn held_item(&self) -> Result<Option<String>>;
    async fn nearby_actors(&self, radius: f64) -> Result<Vec<Actor>>;
    async fn biome_at(&self, position: &Position) -> Result<Option<String>>;
    async fn world_clock(&self) -> Result<u64>;
    async fn weather(&self) -> Result<Weather>;

    async fn health(&self) -> Result<f32> {
        Ok(self.vitals().await?.health)
    }
}

/// Write side of the live game client: the agent's body.
#[async_trait]
pub trait MotorControl: Send + Sync {
    async fn move_toward(&self, target: Position, duration: Duration) -> Result<()>;
    async fn jump(&self, duration: Duration) -> Result<()>;
    async fn dig_block_above(&self) -> Result<()>;
    async fn equip(&self, item: &str) -> Result<()>;
    async fn consume(&self) -> Result<()>;
    async fn attack(&self, entity: EntityId) -> Result<()>;
    async fn chat(&self, text: &str) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}
