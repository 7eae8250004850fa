//! End-to-end flows through the assembled control core, driven by the
//! simulated world and scripted model providers.

use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use golem::events::ReactionType;
use golem::providers::{Completion, LLMProvider, Message, MockLLMProvider, ToolSpec};
use golem::types::{AgentTask, Event, EventKind, TaskStatus};
use golem::world::{MotorCommand, SimulatedWorld};
use golem::{AgentCore, Config, CoreError};

/// Model that must never be consulted.
struct UnreachableModel;

#[async_trait::async_trait]
impl LLMProvider for UnreachableModel {
    async fn complete(&self, _messages: Vec<Message>, _tools: &[ToolSpec]) -> Result<Completion> {
        panic!("model consulted");
    }

    async fn complete_structured(&self, _messages: Vec<Message>, _schema: &Value) -> Result<Value> {
        panic!("model consulted");
    }
}

fn core_with(world: &SimulatedWorld, config: Config, llm: Arc<dyn LLMProvider>) -> AgentCore {
    AgentCore::new(config, Arc::new(world.clone()), Arc::new(world.clone()), llm)
}

#[tokio::test(start_paused = true)]
async fn test_low_health_damage_eats_without_model() {
    let world = SimulatedWorld::new();
    world.set_health(6.0).unwrap();
    world.set_item("bread", 2).unwrap();
    let core = core_with(&world, Config::default(), Arc::new(UnreachableModel));

    let event = Event::new(EventKind::Damage {
        damage: 9.0,
        current_health: 6.0,
        consecutive_count: 1,
        attacker: None,
    });
    let outcome = core.on_event(&event).await;

    assert!(outcome.handled);
    assert_eq!(outcome.reaction_type, Some(ReactionType::Emergency));
    assert_eq!(outcome.action.as_deref(), Some("eat"));
    assert_eq!(
        world.commands(),
        vec![
            MotorCommand::Equip("bread".to_string()),
            MotorCommand::Consume("bread".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_one_shots_are_exclusive() {
    let world = SimulatedWorld::new().with_motor_delay(Duration::from_millis(200));
    world.set_item("bread", 1).unwrap();
    let core = core_with(&world, Config::default(), Arc::new(MockLLMProvider::new()));
    let scheduler = core.scheduler();

    let (walk, equip) = tokio::join!(
        scheduler.run_one_shot("go_to", json!({"x": 12, "y": 64, "z": 0})),
        scheduler.run_one_shot("equip_item", json!({"item": "bread"})),
    );

    assert!(walk.success, "{}", walk.message);
    assert!(!equip.success);
    assert!(equip.is_busy());
    assert!(!scheduler.state().is_one_shot_executing());
}

#[tokio::test(start_paused = true)]
async fn test_task_stops_at_iteration_budget() {
    let world = SimulatedWorld::new();
    let mut config = Config::default();
    config.task_loop.max_iterations = 4;
    let llm = Arc::new(MockLLMProvider::with_script(
        vec![],
        Completion::tool_call("get_status", json!({})),
    ));
    let core = core_with(&world, config, llm);

    let result = core.run_task(AgentTask::new("look around forever")).await;

    assert_eq!(result.status, TaskStatus::Error);
    assert_eq!(result.iterations, 4);
    assert_eq!(result.error, Some(CoreError::IterationBudget { iterations: 4 }));
    assert!(result.steps.iter().all(|s| s.tool == "get_status"));
}

#[tokio::test(start_paused = true)]
async fn test_player_question_round_trip() {
    let world = SimulatedWorld::new();
    let llm = Arc::new(MockLLMProvider::with_script(
        vec![
            Completion::text("Do you want oak or birch?"),
            Completion::tool_call("chat", json!({"message": "On it."})),
        ],
        Completion::text("Brought the oak."),
    ));
    let core = core_with(&world, Config::default(), llm.clone());
    let mut results = core.take_results().unwrap();

    let outcome = core.on_chat("steve", "bring me some wood").await.unwrap();
    assert_eq!(outcome.reaction_type, Some(ReactionType::Task));

    while !core.reply_to("oak") {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let result = results.recv().await.unwrap();
    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.final_message.as_deref(), Some("Brought the oak."));
    assert_eq!(result.iterations, 1);
    assert!(world
        .commands()
        .contains(&MotorCommand::Chat("On it.".to_string())));
    assert!(llm.seen_messages()[1]
        .iter()
        .any(|m| m.role == "user" && m.content == "oak"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_running_task() {
    let world = SimulatedWorld::new();
    let llm = Arc::new(MockLLMProvider::new().with_delay(Duration::from_secs(10)));
    let core = core_with(&world, Config::default(), llm);
    let mut results = core.take_results().unwrap();

    core.submit(AgentTask::new("dig a tunnel"));
    tokio::time::sleep(Duration::from_secs(1)).await;
    core.shutdown().await;

    let result = results.recv().await.unwrap();
    assert!(result.forced_stop);
    assert_eq!(result.error, Some(CoreError::Cancelled));
}
