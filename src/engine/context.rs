use anyhow::Result;

use crate::providers::Message;
use crate::types::{ActorKind, AgentTask};
use crate::world::{WorldState, MAX_HEALTH};

/// Radius used for the "nearby" line of the live-state snapshot.
pub const SNAPSHOT_RADIUS: f64 = 16.0;

/// Compact, line-oriented description of the agent's body and surroundings.
pub async fn describe_world(world: &dyn WorldState) -> Result<String> {
    let position = world.position().await?;
    let facing = world.facing().await?;
    let vitals = world.vitals().await?;
    let held = world.held_item().await?;

    let mut inventory: Vec<(String, u32)> = world
        .inventory()
        .await?
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .collect();
    inventory.sort();
    let inventory = if inventory.is_empty() {
        "empty".to_string()
    } else {
        inventory
            .iter()
            .map(|(item, count)| format!("{} x{}", item, count))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut actors = world.nearby_actors(SNAPSHOT_RADIUS).await?;
    actors.sort_by(|a, b| {
        a.position
            .distance_to(&position)
            .total_cmp(&b.position.distance_to(&position))
    });
    let nearby = if actors.is_empty() {
        "nobody".to_string()
    } else {
        actors
            .iter()
            .map(|a| {
                let kind = match a.kind {
                    ActorKind::Player => "player",
                    ActorKind::Hostile => "hostile",
                    ActorKind::Passive => "animal",
                    ActorKind::Item => "item",
                };
                format!("{} ({}) {:.1} blocks", a.name, kind, a.position.distance_to(&position))
            })
            .collect::<Vec<_>>()
            .join(", ")
    };

    Ok(format!(
        "position: {}\nfacing: {:.0} degrees\nhealth: {:.0}/{:.0}, food: {:.0}/{:.0}\nholding: {}\ninventory: {}\nnearby: {}",
        position,
        facing,
        vitals.health,
        MAX_HEALTH,
        vitals.food,
        MAX_HEALTH,
        held.as_deref().unwrap_or("nothing"),
        inventory,
        nearby
    ))
}

fn system_prompt(agent_name: &str, emergency: bool) -> String {
    let mut prompt = format!(
        "You are {}, an autonomous agent living in a block world. \
Act through the provided tools, one step at a time, and read each result before the next step. \
Start by calling `plan` with a short plan. \
When the goal is done, answer with a one or two sentence summary and no tool calls. \
Only ask a question when you genuinely need a player's answer.",
        agent_name
    );
    if emergency {
        prompt.push_str(" This is an emergency: skip planning and act immediately.");
    }
    prompt
}

/// Initial message list for one task run.
pub async fn build_messages(
    task: &AgentTask,
    world: &dyn WorldState,
    agent_name: &str,
    history_window: usize,
) -> Vec<Message> {
    let snapshot = match describe_world(world).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            log::warn!("could not snapshot world state: {:#}", e);
            format!("unavailable ({})", e)
        }
    };

    let mut user = format!("Current state:\n{}\n", snapshot);
    let skip = task.history.len().saturating_sub(history_window);
    let recent = &task.history[skip..];
    if !recent.is_empty() {
        user.push_str("\nRecent chat:\n");
        for line in recent {
            user.push_str(&format!("<{}> {}\n", line.speaker, line.text));
        }
    }
    user.push_str(&format!("\nGoal: {}", task.goal));

    vec![
        Message::system(system_prompt(agent_name, task.is_emergency)),
        Message::user(user),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Actor, ChatLine, Position};
    use crate::world::SimulatedWorld;

    #[tokio::test]
    async fn test_snapshot_lists_inventory_and_neighbours() {
        let world = SimulatedWorld::new();
        world.set_item("dirt", 3).unwrap();
        world.set_item("bread", 2).unwrap();
        world
            .add_actor(Actor::new(1, "zombie", ActorKind::Hostile, Position::new(4.0, 64.0, 0.0)))
            .unwrap();

        let snapshot = describe_world(&world).await.unwrap();
        assert!(snapshot.contains("inventory: bread x2, dirt x3"));
        assert!(snapshot.contains("nearby: zombie (hostile) 4.0 blocks"));
        assert!(snapshot.contains("health: 20/20"));
    }

    #[tokio::test]
    async fn test_history_window_keeps_latest_lines() {
        let world = SimulatedWorld::new();
        let history = (0..5)
            .map(|i| ChatLine::new("alex", format!("line {}", i)))
            .collect();
        let task = AgentTask::new("wave").with_history(history).emergency();

        let messages = build_messages(&task, &world, "golem", 2).await;
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("emergency"));
        let user = &messages[1].content;
        assert!(!user.contains("line 2"));
        assert!(user.contains("<alex> line 3"));
        assert!(user.contains("<alex> line 4"));
        assert!(user.ends_with("Goal: wave"));
    }
}
