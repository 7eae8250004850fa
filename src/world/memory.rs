use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use super::{InventorySnapshot, MotorControl, Vitals, WorldState, MAX_HEALTH};
use crate::types::{Actor, EntityId, Position, Weather};

/// Motor command as recorded by [`SimulatedWorld`].
#[derive(Debug, Clone, PartialEq)]
pub enum MotorCommand {
    MoveToward(Position),
    Jump,
    DigBlockAbove,
    Equip(String),
    Consume(String),
    Attack(EntityId),
    Chat(String),
    Stop,
}

#[derive(Debug, Clone)]
struct SimState {
    vitals: Vitals,
    position: Position,
    facing: f64,
    inventory: InventorySnapshot,
    held_item: Option<String>,
    actors: Vec<Actor>,
    biomes: Vec<(Position, f64, String)>,
    default_biome: Option<String>,
    clock: u64,
    weather: Weather,
    commands: Vec<MotorCommand>,
}

/// In-memory world used by the CLI demo and the test suites.
///
/// Motor commands mutate the state the way a real client would observe
/// them afterwards (moving updates the position, eating restores food)
/// and are recorded for inspection.
#[derive(Clone)]
pub struct SimulatedWorld {
    state: Arc<RwLock<SimState>>,
    motor_delay: Duration,
}

impl SimulatedWorld {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SimState {
                vitals: Vitals::default(),
                position: Position::new(0.0, 64.0, 0.0),
                facing: 0.0,
                inventory: HashMap::new(),
                held_item: None,
                actors: Vec::new(),
                biomes: Vec::new(),
                default_biome: Some("plains".to_string()),
                clock: 1_000,
                weather: Weather::Clear,
                commands: Vec::new(),
            })),
            motor_delay: Duration::ZERO,
        }
    }

    /// Every motor command sleeps this long before taking effect.
    pub fn with_motor_delay(mut self, delay: Duration) -> Self {
        self.motor_delay = delay;
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, SimState>> {
        self.state
            .read()
            .map_err(|_| anyhow!("simulated world lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, SimState>> {
        self.state
            .write()
            .map_err(|_| anyhow!("simulated world lock poisoned"))
    }

    pub fn set_health(&self, health: f32) -> Result<()> {
        self.write()?.vitals.health = health;
        Ok(())
    }

    pub fn set_food(&self, food: f32) -> Result<()> {
        self.write()?.vitals.food = food;
        Ok(())
    }

    pub fn set_oxygen(&self, oxygen: u32, in_liquid: bool) -> Result<()> {
        let mut state = self.write()?;
        state.vitals.oxygen = oxygen;
        state.vitals.in_liquid = in_liquid;
        Ok(())
    }

    pub fn set_position(&self, position: Position) -> Result<()> {
        self.write()?.position = position;
        Ok(())
    }

    pub fn set_item(&self, item: impl Into<String>, count: u32) -> Result<()> {
        self.write()?.inventory.insert(item.into(), count);
        Ok(())
    }

    pub fn set_actors(&self, actors: Vec<Actor>) -> Result<()> {
        self.write()?.actors = actors;
        Ok(())
    }

    pub fn add_actor(&self, actor: Actor) -> Result<()> {
        self.write()?.actors.push(actor);
        Ok(())
    }

    /// Everything within `radius` of `center` reports `biome`.
    pub fn add_biome_region(&self, center: Position, radius: f64, biome: impl Into<String>) -> Result<()> {
        self.write()?.biomes.push((center, radius, biome.into()));
        Ok(())
    }

    pub fn set_default_biome(&self, biome: Option<String>) -> Result<()> {
        self.write()?.default_biome = biome;
        Ok(())
    }

    pub fn set_clock(&self, clock: u64) -> Result<()> {
        self.write()?.clock = clock;
        Ok(())
    }

    pub fn set_weather(&self, weather: Weather) -> Result<()> {
        self.write()?.weather = weather;
        Ok(())
    }

    pub fn commands(&self) -> Vec<MotorCommand> {
        self.read().map(|s| s.commands.clone()).unwrap_or_default()
    }

    pub fn clear_commands(&self) -> Result<()> {
        self.write()?.commands.clear();
        Ok(())
    }

    async fn actuate(&self, command: MotorCommand) -> Result<()> {
        if !self.motor_delay.is_zero() {
            tokio::time::sleep(self.motor_delay).await;
        }
        self.write()?.commands.push(command);
        Ok(())
    }
}

impl Default for SimulatedWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorldState for SimulatedWorld {
    async fn vitals(&self) -> Result<Vitals> {
        Ok(self.read()?.vitals)
    }

    async fn position(&self) -> Result<Position> {
        Ok(self.read()?.position)
    }

    async fn facing(&self) -> Result<f64> {
        Ok(self.read()?.facing)
    }

    async fn inventory(&self) -> Result<InventorySnapshot> {
        Ok(self.read()?.inventory.clone())
    }

    async fn held_item(&self) -> Result<Option<String>> {
        Ok(self.read()?.held_item.clone())
    }

    async fn nearby_actors(&self, radius: f64) -> Result<Vec<Actor>> {
        let state = self.read()?;
        Ok(state
            .actors
            .iter()
            .filter(|a| a.position.distance_to(&state.position) <= radius)
            .cloned()
            .collect())
    }

    async fn biome_at(&self, position: &Position) -> Result<Option<String>> {
        let state = self.read()?;
        let region = state
            .biomes
            .iter()
            .find(|(center, radius, _)| center.distance_to(position) <= *radius)
            .map(|(_, _, biome)| biome.clone());
        Ok(region.or_else(|| state.default_biome.clone()))
    }

    async fn world_clock(&self) -> Result<u64> {
        Ok(self.read()?.clock)
    }

    async fn weather(&self) -> Result<Weather> {
        Ok(self.read()?.weather)
    }
}

#[async_trait]
impl MotorControl for SimulatedWorld {
    async fn move_toward(&self, target: Position, _duration: Duration) -> Result<()> {
        self.actuate(MotorCommand::MoveToward(target)).await?;
        self.write()?.position = target;
        Ok(())
    }

    async fn jump(&self, _duration: Duration) -> Result<()> {
        self.actuate(MotorCommand::Jump).await?;
        let mut state = self.write()?;
        state.position = state.position.offset(0.0, 1.0, 0.0);
        Ok(())
    }

    async fn dig_block_above(&self) -> Result<()> {
        self.actuate(MotorCommand::DigBlockAbove).await
    }

    async fn equip(&self, item: &str) -> Result<()> {
        {
            let state = self.read()?;
            if state.inventory.get(item).copied().unwrap_or(0) == 0 {
                return Err(anyhow!("no {} in inventory", item));
            }
        }
        self.actuate(MotorCommand::Equip(item.to_string())).await?;
        self.write()?.held_item = Some(item.to_string());
        Ok(())
    }

    async fn consume(&self) -> Result<()> {
        let item = self
            .read()?
            .held_item
            .clone()
            .ok_or_else(|| anyhow!("nothing held"))?;
        self.actuate(MotorCommand::Consume(item.clone())).await?;

        let mut state = self.write()?;
        let remaining = match state.inventory.get_mut(&item) {
            Some(count) if *count > 0 => {
                *count -= 1;
                *count
            }
            _ => return Err(anyhow!("no {} left", item)),
        };
        if remaining == 0 {
            state.held_item = None;
        }
        state.vitals.food = (state.vitals.food + 6.0).min(MAX_HEALTH);
        state.vitals.health = (state.vitals.health + 2.0).min(MAX_HEALTH);
        Ok(())
    }

    async fn attack(&self, entity: EntityId) -> Result<()> {
        self.actuate(MotorCommand::Attack(entity)).await?;
        self.write()?.actors.retain(|a| a.id != entity);
        Ok(())
    }

    async fn chat(&self, text: &str) -> Result<()> {
        self.actuate(MotorCommand::Chat(text.to_string())).await
    }

    async fn stop(&self) -> Result<()> {
        self.actuate(MotorCommand::Stop).await
    }
}
