use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use golem::providers;
use golem::types::{Actor, ActorKind, AgentTask, Position};
use golem::world::SimulatedWorld;
use golem::{AgentCore, Config};

#[derive(Parser)]
#[command(name = "golem")]
#[command(about = "Reactive control core for a game-playing agent", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML config file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one goal through the task loop in a simulated world
    Run {
        #[arg(help = "Goal for the agent")]
        goal: String,
    },
    /// Start every timer in a simulated world and log what happens
    Watch {
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env(),
    };

    match cli.command {
        Commands::Run { goal } => run_goal(config, &goal).await?,
        Commands::Watch { seconds } => watch(config, seconds).await?,
        Commands::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}

fn build(config: Config, world: &SimulatedWorld) -> AgentCore {
    let llm = providers::from_config(&config);
    AgentCore::new(config, Arc::new(world.clone()), Arc::new(world.clone()), llm)
}

async fn run_goal(config: Config, goal: &str) -> Result<()> {
    let world = SimulatedWorld::new();
    let core = build(config, &world);

    println!("Running goal: {}", goal);
    let result = core.run_task(AgentTask::new(goal)).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if let Some(error) = &result.error {
        println!("Error: {}", error);
    }
    Ok(())
}

async fn watch(config: Config, seconds: u64) -> Result<()> {
    let world = SimulatedWorld::new();
    world.set_food(10.0)?;
    world.set_item("bread", 3)?;
    world.set_item("stone_sword", 1)?;
    world.add_actor(Actor::new(
        1,
        "zombie",
        ActorKind::Hostile,
        Position::new(6.0, 64.0, 0.0),
    ))?;

    let core = build(config, &world);
    let mut results = core.take_results();
    core.start();
    println!("Watching for {}s", seconds);

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            Some(result) = async {
                match results.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => None,
                }
            } => {
                println!("task {} finished: {:?}", result.task_id, result.status);
            }
        }
    }

    core.shutdown().await;
    for command in world.commands() {
        println!("{:?}", command);
    }
    Ok(())
}
