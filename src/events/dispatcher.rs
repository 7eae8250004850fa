use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, RwLock};

use super::{ReactionConfig, ReactionTable, ReactionType};
use crate::emergency::EmergencyAgent;
use crate::engine::TaskSubmitter;
use crate::skills::ExecutionState;
use crate::types::{AgentTask, ChatLine, Event, EventKind, EventType};
use crate::world::MAX_HEALTH;

/// What the dispatcher did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub handled: bool,
    pub reaction_type: Option<ReactionType>,
    pub message: Option<String>,
    /// Emergency action tag, when the emergency agent ran.
    pub action: Option<String>,
}

impl DispatchOutcome {
    fn dropped(reason: impl Into<String>) -> Self {
        Self {
            handled: false,
            reaction_type: None,
            message: Some(reason.into()),
            action: None,
        }
    }

    fn handled(reaction_type: ReactionType, message: impl Into<String>) -> Self {
        Self {
            handled: true,
            reaction_type: Some(reaction_type),
            message: Some(message.into()),
            action: None,
        }
    }
}

/// Routes events to the emergency agent, the task loop, or the log.
pub struct ReactionDispatcher {
    table: RwLock<ReactionTable>,
    state: Arc<ExecutionState>,
    emergency: Arc<EmergencyAgent>,
    tasks: Arc<dyn TaskSubmitter>,
    rng: Mutex<StdRng>,
}

impl ReactionDispatcher {
    pub fn new(
        table: ReactionTable,
        state: Arc<ExecutionState>,
        emergency: Arc<EmergencyAgent>,
        tasks: Arc<dyn TaskSubmitter>,
    ) -> Self {
        Self {
            table: RwLock::new(table),
            state,
            emergency,
            tasks,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic suppression rolls.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn set_config(&self, event_type: EventType, config: ReactionConfig) {
        log::info!("reaction for {} set to {:?}", event_type.as_str(), config);
        self.table
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .set(event_type, config);
    }

    /// Snapshot of the current policy table.
    pub fn configs(&self) -> ReactionTable {
        self.table.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn roll(&self) -> u8 {
        self.rng
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .gen_range(0..100)
    }

    pub async fn on_event(&self, event: &Event) -> DispatchOutcome {
        let event_type = event.event_type();
        let config = self
            .table
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event_type)
            .cloned();
        let Some(config) = config.filter(|c| c.enabled) else {
            log::debug!("dispatch {}: no enabled reaction", event_type.as_str());
            return DispatchOutcome::dropped("reaction disabled");
        };

        if config.idle_only && self.state.is_busy() {
            return match event_type {
                EventType::Damage => self.emergency(event).await,
                EventType::ItemGained => {
                    log::info!("while busy: {}", describe(event));
                    DispatchOutcome::handled(ReactionType::Info, describe(event))
                }
                _ => {
                    log::debug!("dispatch {}: dropped, agent busy", event_type.as_str());
                    DispatchOutcome::dropped("agent busy")
                }
            };
        }

        let rare_biome = matches!(event.kind, EventKind::BiomeChange { is_rare: true, .. });
        if !rare_biome {
            let roll = self.roll();
            if roll >= config.probability {
                log::debug!(
                    "dispatch {}: suppressed (roll {} >= {})",
                    event_type.as_str(),
                    roll,
                    config.probability
                );
                return DispatchOutcome::dropped("suppressed");
            }
        }

        log::debug!("dispatch {} -> {}", event_type.as_str(), config.reaction_type.as_str());
        match config.reaction_type {
            ReactionType::Emergency => self.emergency(event).await,
            ReactionType::Task => self.submit(event),
            ReactionType::Immediate => {
                DispatchOutcome::handled(ReactionType::Immediate, "left to continuous skills")
            }
            ReactionType::Info => match &event.kind {
                EventKind::ItemGained { nearby, .. } if !nearby.is_empty() => self.submit(event),
                _ => {
                    log::info!("{}", describe(event));
                    DispatchOutcome::handled(ReactionType::Info, describe(event))
                }
            },
        }
    }

    async fn emergency(&self, event: &Event) -> DispatchOutcome {
        let outcome = self.emergency.respond(event).await;
        let message = if outcome.already_responding {
            "emergency response already in flight".to_string()
        } else {
            format!("{} via {:?}", outcome.action.tag(), outcome.source).to_lowercase()
        };
        DispatchOutcome {
            handled: true,
            reaction_type: Some(ReactionType::Emergency),
            message: Some(message),
            action: Some(outcome.action.tag().to_string()),
        }
    }

    fn submit(&self, event: &Event) -> DispatchOutcome {
        let goal = goal_for(event);
        let mut task = AgentTask::new(goal.clone());
        if let EventKind::PlayerSpeaking { player, message } = &event.kind {
            task = task.with_history(vec![ChatLine::new(player.clone(), message.clone())]);
        }
        let id = self.tasks.submit(task);
        log::info!("submitted task {} for {}", id, event.event_type().as_str());
        DispatchOutcome::handled(ReactionType::Task, goal)
    }
}

/// Goal text for the task loop, one template per event kind.
pub fn goal_for(event: &Event) -> String {
    match &event.kind {
        EventKind::TimeChange { from, to } => format!(
            "It is now {} (it was {}). Decide whether anything needs doing, like finding shelter before night.",
            to.as_str(),
            from.as_str()
        ),
        EventKind::WeatherChange { from, to } => format!(
            "The weather changed from {} to {}. React if it matters to what you are doing.",
            from.as_str(),
            to.as_str()
        ),
        EventKind::BiomeChange { to, is_rare: true, .. } => format!(
            "You just entered a rare biome: {}! Look around and tell nearby players about it.",
            to
        ),
        EventKind::BiomeChange { to, .. } => {
            format!("You entered the {} biome. Take a look around.", to)
        }
        EventKind::Teleport { from, to, distance } => format!(
            "You were teleported {:.0} blocks from {} to {}. Get your bearings.",
            distance, from, to
        ),
        EventKind::ItemGained { item, count, nearby } => match nearby.first() {
            Some(giver) => format!(
                "{} gave you {} {}. Thank them and ask what they want you to do with it.",
                giver, count, item
            ),
            None => format!("You picked up {} {}.", count, item),
        },
        EventKind::HostileApproach {
            nearest,
            distance,
            count,
            ..
        } => format!(
            "{} is {:.1} blocks away and approaching, mobCount={}, handle it.",
            nearest, distance, count
        ),
        EventKind::Damage {
            damage,
            current_health,
            attacker,
            ..
        } => match attacker {
            Some(a) => format!(
                "{} hit you for {:.0} damage; health is {:.0}/{:.0}. Deal with it.",
                a.name, damage, current_health, MAX_HEALTH
            ),
            None => format!(
                "You took {:.0} damage; health is {:.0}/{:.0}. Find out why and stay safe.",
                damage, current_health, MAX_HEALTH
            ),
        },
        EventKind::Suffocation { .. } => "You are running out of air. Get to air now.".to_string(),
        EventKind::PlayerLooking { player, distance } => format!(
            "{} is looking at you from {:.1} blocks away. Greet them.",
            player, distance
        ),
        EventKind::PlayerSpeaking { player, message } => {
            format!("{} said: \"{}\". Respond appropriately.", player, message)
        }
    }
}

fn describe(event: &Event) -> String {
    match &event.kind {
        EventKind::ItemGained { item, count, .. } => format!("gained {} {}", count, item),
        _ => format!("observed {}", event.event_type().as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emergency::EmergencyConfig;
    use crate::providers::MockLLMProvider;
    use crate::types::{Position, TaskId, TimePhase};
    use crate::world::SimulatedWorld;

    #[derive(Default)]
    struct Recorder {
        tasks: Mutex<Vec<AgentTask>>,
    }

    impl Recorder {
        fn goals(&self) -> Vec<String> {
            self.tasks
                .lock()
                .unwrap()
                .iter()
                .map(|t| t.goal.clone())
                .collect()
        }
    }

    impl TaskSubmitter for Recorder {
        fn submit(&self, task: AgentTask) -> TaskId {
            let id = task.id;
            self.tasks.lock().unwrap().push(task);
            id
        }
    }

    fn build(world: &SimulatedWorld, state: Arc<ExecutionState>) -> (ReactionDispatcher, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let emergency = Arc::new(EmergencyAgent::new(
            Arc::new(world.clone()),
            Arc::new(world.clone()),
            Arc::new(MockLLMProvider::new()),
            EmergencyConfig::default(),
        ));
        let dispatcher = ReactionDispatcher::new(ReactionTable::default(), state, emergency, recorder.clone())
            .with_seed(7);
        (dispatcher, recorder)
    }

    fn hostile() -> Event {
        Event::new(EventKind::HostileApproach {
            nearest: "zombie".to_string(),
            distance: 7.5,
            count: 1,
            positions: vec![Position::new(7.5, 64.0, 0.0)],
        })
    }

    #[tokio::test]
    async fn test_task_reaction_submits_goal() {
        let world = SimulatedWorld::new();
        let (dispatcher, recorder) = build(&world, ExecutionState::new());

        let outcome = dispatcher.on_event(&hostile()).await;
        assert!(outcome.handled);
        assert_eq!(outcome.reaction_type, Some(ReactionType::Task));
        assert_eq!(
            recorder.goals(),
            vec!["zombie is 7.5 blocks away and approaching, mobCount=1, handle it."]
        );
    }

    #[tokio::test]
    async fn test_busy_agent_drops_idle_only_events() {
        let world = SimulatedWorld::new();
        let state = ExecutionState::new();
        let (dispatcher, recorder) = build(&world, state.clone());
        let _task = state.task_started();

        let outcome = dispatcher.on_event(&hostile()).await;
        assert!(!outcome.handled);
        assert!(recorder.goals().is_empty());

        let gift = Event::new(EventKind::ItemGained {
            item: "apple".to_string(),
            count: 1,
            nearby: vec!["alex".to_string()],
        });
        let outcome = dispatcher.on_event(&gift).await;
        assert!(outcome.handled);
        assert_eq!(outcome.reaction_type, Some(ReactionType::Info));
        assert!(recorder.goals().is_empty());
    }

    #[tokio::test]
    async fn test_gift_from_nearby_player_becomes_task() {
        let world = SimulatedWorld::new();
        let (dispatcher, recorder) = build(&world, ExecutionState::new());

        let gift = Event::new(EventKind::ItemGained {
            item: "apple".to_string(),
            count: 2,
            nearby: vec!["alex".to_string()],
        });
        let outcome = dispatcher.on_event(&gift).await;
        assert_eq!(outcome.reaction_type, Some(ReactionType::Task));
        assert!(recorder.goals()[0].starts_with("alex gave you 2 apple"));

        let pickup = Event::new(EventKind::ItemGained {
            item: "stick".to_string(),
            count: 1,
            nearby: vec![],
        });
        let outcome = dispatcher.on_event(&pickup).await;
        assert_eq!(outcome.reaction_type, Some(ReactionType::Info));
        assert_eq!(recorder.goals().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_probability_suppresses_but_rare_biome_passes() {
        let world = SimulatedWorld::new();
        let (dispatcher, recorder) = build(&world, ExecutionState::new());
        dispatcher.set_config(
            EventType::TimeChange,
            ReactionConfig::new(ReactionType::Task, 0, true),
        );
        dispatcher.set_config(
            EventType::BiomeChange,
            ReactionConfig::new(ReactionType::Task, 0, true),
        );

        let dusk = Event::new(EventKind::TimeChange {
            from: TimePhase::Day,
            to: TimePhase::Sunset,
        });
        assert!(!dispatcher.on_event(&dusk).await.handled);

        let rare = Event::new(EventKind::BiomeChange {
            from: Some("plains".to_string()),
            to: "ice_spikes".to_string(),
            is_rare: true,
        });
        assert!(dispatcher.on_event(&rare).await.handled);
        assert_eq!(recorder.goals().len(), 1);
        assert_eq!(
            dispatcher.configs().get(EventType::TimeChange).unwrap().probability,
            0
        );
    }

    #[tokio::test]
    async fn test_disabled_reaction_is_noop() {
        let world = SimulatedWorld::new();
        let (dispatcher, recorder) = build(&world, ExecutionState::new());
        dispatcher.set_config(
            EventType::HostileApproach,
            ReactionConfig::new(ReactionType::Task, 100, false).disabled(),
        );
        let outcome = dispatcher.on_event(&hostile()).await;
        assert!(!outcome.handled);
        assert!(recorder.goals().is_empty());
    }

    #[tokio::test]
    async fn test_chat_task_carries_history() {
        let world = SimulatedWorld::new();
        let (dispatcher, recorder) = build(&world, ExecutionState::new());
        let chat = Event::new(EventKind::PlayerSpeaking {
            player: "alex".to_string(),
            message: "follow me".to_string(),
        });
        dispatcher.on_event(&chat).await;
        let tasks = recorder.tasks.lock().unwrap();
        assert_eq!(tasks[0].history, vec![ChatLine::new("alex", "follow me")]);
    }
}
