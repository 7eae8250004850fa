use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::types::{
    ActorKind, Attacker, EntityId, Event, EventKind, Position, TimePhase, Weather,
};
use crate::world::{is_hostile, InventorySnapshot, WorldState};

/// Biomes too ordinary to mention.
pub const COMMON_BIOMES: &[&str] = &[
    "plains",
    "forest",
    "birch_forest",
    "taiga",
    "river",
    "ocean",
    "beach",
    "savanna",
    "desert",
    "swamp",
    "meadow",
];

/// Biomes worth getting excited about.
pub const RARE_BIOMES: &[&str] = &[
    "mushroom_fields",
    "ice_spikes",
    "badlands",
    "eroded_badlands",
    "cherry_grove",
    "bamboo_jungle",
    "deep_dark",
    "lush_caves",
    "flower_forest",
    "sunflower_plains",
];

pub fn is_common_biome(biome: &str) -> bool {
    COMMON_BIOMES.contains(&biome)
}

pub fn is_rare_biome(biome: &str) -> bool {
    RARE_BIOMES.contains(&biome)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub slow_period_ms: u64,
    pub fast_period_ms: u64,
    pub teleport_threshold: f64,
    pub hostile_radius: f64,
    /// Players this close when an item shows up are treated as the giver.
    pub giver_radius: f64,
    pub facing_radius: f64,
    pub facing_tolerance_deg: f64,
    pub attacker_radius: f64,
    /// Oxygen level (out of 300) below which a falling supply counts as suffocating.
    pub suffocation_oxygen: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            slow_period_ms: 1_000,
            fast_period_ms: 500,
            teleport_threshold: 50.0,
            hostile_radius: 16.0,
            giver_radius: 5.0,
            facing_radius: 6.0,
            facing_tolerance_deg: 20.0,
            attacker_radius: 6.0,
            suffocation_oxygen: 20,
        }
    }
}

/// Counts damage hits inside a rolling window.
#[derive(Debug)]
pub struct DamageTracker {
    window: Duration,
    hits: VecDeque<Instant>,
}

impl DamageTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            hits: VecDeque::new(),
        }
    }

    /// Record a hit at `now` and return how many hits fall inside the window.
    pub fn record(&mut self, now: Instant) -> u32 {
        self.hits.push_back(now);
        while let Some(&oldest) = self.hits.front() {
            if now.duration_since(oldest) > self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
        self.hits.len() as u32
    }
}

#[derive(Debug)]
struct Memory {
    phase: Option<TimePhase>,
    weather: Option<Weather>,
    biome: Option<String>,
    position: Option<Position>,
    inventory: Option<InventorySnapshot>,
    hostiles: HashSet<EntityId>,
    lookers: HashSet<EntityId>,
    health: Option<f32>,
    oxygen: Option<u32>,
    suffocating: bool,
    damage: DamageTracker,
}

/// Samples the world and turns transitions into [`Event`]s.
///
/// The first sample of clock, weather, position, inventory, health and
/// oxygen only establishes a baseline. Biomes and tracked actors report on
/// the first sample too.
pub struct EventDetector {
    world: Arc<dyn WorldState>,
    config: DetectorConfig,
    agent_name: String,
    memory: Mutex<Memory>,
}

impl EventDetector {
    pub fn new(world: Arc<dyn WorldState>, config: DetectorConfig, agent_name: impl Into<String>) -> Self {
        Self {
            world,
            config,
            agent_name: agent_name.into(),
            memory: Mutex::new(Memory {
                phase: None,
                weather: None,
                biome: None,
                position: None,
                inventory: None,
                hostiles: HashSet::new(),
                lookers: HashSet::new(),
                health: None,
                oxygen: None,
                suffocating: false,
                damage: DamageTracker::new(Duration::from_secs(3)),
            }),
        }
    }

    /// Window used to count consecutive damage hits.
    pub fn with_damage_window(self, window: Duration) -> Self {
        let memory = self.memory.into_inner();
        Self {
            memory: Mutex::new(Memory {
                damage: DamageTracker::new(window),
                ..memory
            }),
            ..self
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Time of day, weather, biome, teleport and inventory checks.
    pub async fn slow_tick(&self) -> Result<Vec<Event>> {
        let clock = self.world.world_clock().await?;
        let weather = self.world.weather().await?;
        let position = self.world.position().await?;
        let biome = self.world.biome_at(&position).await?;
        let inventory = self.world.inventory().await?;

        let mut memory = self.memory.lock().await;
        let mut events = Vec::new();

        let phase = TimePhase::from_clock(clock);
        if let Some(from) = memory.phase.replace(phase) {
            if from != phase {
                events.push(EventKind::TimeChange { from, to: phase });
            }
        }

        if let Some(from) = memory.weather.replace(weather) {
            if from != weather {
                events.push(EventKind::WeatherChange { from, to: weather });
            }
        }

        if let Some(to) = biome {
            if memory.biome.as_deref() != Some(to.as_str()) {
                let from = memory.biome.replace(to.clone());
                if !is_common_biome(&to) {
                    events.push(EventKind::BiomeChange {
                        from,
                        is_rare: is_rare_biome(&to),
                        to,
                    });
                }
            }
        }

        if let Some(from) = memory.position.replace(position) {
            let distance = from.distance_to(&position);
            if distance > self.config.teleport_threshold {
                events.push(EventKind::Teleport {
                    from,
                    to: position,
                    distance,
                });
            }
        }

        let gained = match memory.inventory.replace(inventory.clone()) {
            Some(previous) => inventory_gains(&previous, &inventory),
            None => Vec::new(),
        };
        drop(memory);

        if !gained.is_empty() {
            let nearby: Vec<String> = self
                .world
                .nearby_actors(self.config.giver_radius)
                .await?
                .into_iter()
                .filter(|a| a.kind == ActorKind::Player && a.name != self.agent_name)
                .map(|a| a.name)
                .collect();
            for (item, count) in gained {
                events.push(EventKind::ItemGained {
                    item,
                    count,
                    nearby: nearby.clone(),
                });
            }
        }

        Ok(emit(events))
    }

    /// Hostile proximity, staring players, health and oxygen checks.
    pub async fn fast_tick(&self) -> Result<Vec<Event>> {
        let me = self.world.position().await?;
        let vitals = self.world.vitals().await?;
        let radius = self.config.hostile_radius.max(self.config.facing_radius);
        let actors = self.world.nearby_actors(radius).await?;

        let mut memory = self.memory.lock().await;
        let mut events = Vec::new();

        let mut hostiles: Vec<_> = actors
            .iter()
            .filter(|a| a.kind == ActorKind::Hostile || is_hostile(&a.name))
            .filter(|a| a.position.distance_to(&me) <= self.config.hostile_radius)
            .collect();
        hostiles.sort_by(|a, b| {
            a.position
                .distance_to(&me)
                .total_cmp(&b.position.distance_to(&me))
        });
        let current: HashSet<EntityId> = hostiles.iter().map(|a| a.id).collect();
        let newcomers = current.difference(&memory.hostiles).count();
        if newcomers > 0 {
            if let Some(nearest) = hostiles.first() {
                events.push(EventKind::HostileApproach {
                    nearest: nearest.name.clone(),
                    distance: nearest.position.distance_to(&me),
                    count: hostiles.len(),
                    positions: hostiles.iter().map(|a| a.position).collect(),
                });
            }
        }
        memory.hostiles = current;

        let staring: Vec<_> = actors
            .iter()
            .filter(|a| a.kind == ActorKind::Player && a.name != self.agent_name)
            .filter(|a| a.position.distance_to(&me) <= self.config.facing_radius)
            .filter(|a| a.is_facing(&me, self.config.facing_tolerance_deg))
            .collect();
        for player in &staring {
            if !memory.lookers.contains(&player.id) {
                events.push(EventKind::PlayerLooking {
                    player: player.name.clone(),
                    distance: player.position.distance_to(&me),
                });
            }
        }
        memory.lookers = staring.iter().map(|a| a.id).collect();

        if let Some(previous) = memory.health.replace(vitals.health) {
            if vitals.health < previous {
                let damage = self.damage_event(&mut memory, previous, vitals.health, &actors, &me);
                events.push(damage);
            }
        }

        let previous_oxygen = memory.oxygen.replace(vitals.oxygen);
        if vitals.oxygen >= self.config.suffocation_oxygen {
            memory.suffocating = false;
        } else if let Some(previous) = previous_oxygen {
            if vitals.oxygen < previous && !memory.suffocating {
                memory.suffocating = true;
                events.push(EventKind::Suffocation {
                    in_liquid: vitals.in_liquid,
                    oxygen: vitals.oxygen,
                });
            }
        }

        Ok(emit(events))
    }

    /// Health callback from the client, outside the poll cycle.
    ///
    /// Compared against the last observed health, so a drop the fast timer
    /// already reported is not counted again.
    pub async fn on_health_change(&self, previous: f32, current: f32) -> Result<Option<Event>> {
        let me = self.world.position().await?;
        let actors = self.world.nearby_actors(self.config.attacker_radius).await?;

        let mut memory = self.memory.lock().await;
        let baseline = memory.health.replace(current).unwrap_or(previous);
        if current >= baseline {
            return Ok(None);
        }
        let kind = self.damage_event(&mut memory, baseline, current, &actors, &me);
        Ok(emit(vec![kind]).pop())
    }

    /// Chat callback; the agent's own lines are ignored.
    pub fn on_chat(&self, sender: &str, text: &str) -> Option<Event> {
        if sender == self.agent_name || text.trim().is_empty() {
            return None;
        }
        emit(vec![EventKind::PlayerSpeaking {
            player: sender.to_string(),
            message: text.trim().to_string(),
        }])
        .pop()
    }

    fn damage_event(
        &self,
        memory: &mut Memory,
        previous: f32,
        current: f32,
        actors: &[crate::types::Actor],
        me: &Position,
    ) -> EventKind {
        let consecutive_count = memory.damage.record(Instant::now());
        let attacker = actors
            .iter()
            .filter(|a| matches!(a.kind, ActorKind::Hostile | ActorKind::Player))
            .filter(|a| a.name != self.agent_name)
            .filter(|a| a.position.distance_to(me) <= self.config.attacker_radius)
            .min_by(|a, b| a.position.distance_to(me).total_cmp(&b.position.distance_to(me)))
            .map(|a| Attacker {
                name: a.name.clone(),
                position: a.position,
            });
        EventKind::Damage {
            damage: previous - current,
            current_health: current,
            consecutive_count,
            attacker,
        }
    }

    /// Sample on both timers until `cancel` fires, sending every event to `sink`.
    pub async fn run(self: Arc<Self>, sink: mpsc::Sender<Event>, cancel: CancellationToken) {
        let mut slow = tokio::time::interval(Duration::from_millis(self.config.slow_period_ms));
        let mut fast = tokio::time::interval(Duration::from_millis(self.config.fast_period_ms));
        slow.set_missed_tick_behavior(MissedTickBehavior::Skip);
        fast.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let sampled = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = slow.tick() => self.slow_tick().await,
                _ = fast.tick() => self.fast_tick().await,
            };
            match sampled {
                Ok(events) => {
                    for event in events {
                        if sink.send(event).await.is_err() {
                            log::debug!("event sink closed; detector stopping");
                            return;
                        }
                    }
                }
                Err(e) => log::warn!("world sample failed: {:#}", e),
            }
        }
    }
}

fn inventory_gains(previous: &InventorySnapshot, current: &InventorySnapshot) -> Vec<(String, u32)> {
    let mut gains: Vec<(String, u32)> = current
        .iter()
        .filter_map(|(item, &count)| {
            let before = previous.get(item).copied().unwrap_or(0);
            (count > before).then(|| (item.clone(), count - before))
        })
        .collect();
    gains.sort();
    gains
}

fn emit(kinds: Vec<EventKind>) -> Vec<Event> {
    kinds
        .into_iter()
        .map(|kind| {
            let event = Event::new(kind);
            log::debug!("event: {}", event.event_type().as_str());
            event
        })
        .collect()
}
