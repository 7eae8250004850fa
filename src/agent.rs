use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::emergency::{EmergencyAgent, EmergencyOutcome};
use crate::engine::{FeedbackOutcome, TaskLoop, TaskSpawner, TaskSubmitter};
use crate::events::{DispatchOutcome, EventDetector, ReactionDispatcher};
use crate::providers::LLMProvider;
use crate::skills::builtin::register_defaults;
use crate::skills::{ExecutionState, SkillScheduler};
use crate::tools::ToolRuntime;
use crate::types::{AgentTask, Event, TaskId, TaskResult};
use crate::world::{MotorControl, WorldState};

const EVENT_BUFFER: usize = 64;

/// The assembled control core for one agent body.
pub struct AgentCore {
    config: Config,
    scheduler: Arc<SkillScheduler>,
    emergency: Arc<EmergencyAgent>,
    task_loop: Arc<TaskLoop>,
    spawner: Arc<TaskSpawner>,
    dispatcher: Arc<ReactionDispatcher>,
    detector: Arc<EventDetector>,
    cancel: CancellationToken,
    results: Mutex<Option<mpsc::UnboundedReceiver<TaskResult>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl AgentCore {
    pub fn new(
        config: Config,
        world: Arc<dyn WorldState>,
        motor: Arc<dyn MotorControl>,
        llm: Arc<dyn LLMProvider>,
    ) -> Self {
        let state = ExecutionState::new();
        let scheduler = Arc::new(SkillScheduler::new(
            config.scheduler.clone(),
            Arc::clone(&world),
            Arc::clone(&motor),
            Arc::clone(&state),
        ));
        register_defaults(&scheduler);

        let tools = Arc::new(ToolRuntime::with_defaults(&scheduler));
        let emergency = Arc::new(EmergencyAgent::new(
            Arc::clone(&world),
            Arc::clone(&motor),
            Arc::clone(&llm),
            config.emergency.clone(),
        ));
        let task_loop = Arc::new(TaskLoop::new(
            llm,
            tools,
            Arc::clone(&world),
            motor,
            Arc::clone(&scheduler),
            config.task_loop.clone(),
            config.agent_name.clone(),
        ));

        let cancel = CancellationToken::new();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let spawner = Arc::new(
            TaskSpawner::new(Arc::clone(&task_loop), cancel.child_token()).with_results(results_tx),
        );
        let dispatcher = Arc::new(ReactionDispatcher::new(
            config.reaction_table(),
            state,
            Arc::clone(&emergency),
            Arc::clone(&spawner) as Arc<dyn TaskSubmitter>,
        ));
        let detector = Arc::new(
            EventDetector::new(world, config.detector.clone(), config.agent_name.clone())
                .with_damage_window(Duration::from_millis(config.emergency.burst_window_ms)),
        );

        Self {
            config,
            scheduler,
            emergency,
            task_loop,
            spawner,
            dispatcher,
            detector,
            cancel,
            results: Mutex::new(Some(results_rx)),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<SkillScheduler> {
        &self.scheduler
    }

    pub fn dispatcher(&self) -> &Arc<ReactionDispatcher> {
        &self.dispatcher
    }

    pub fn detector(&self) -> &Arc<EventDetector> {
        &self.detector
    }

    /// Results of tasks started by events or [`AgentCore::submit`]. Can be taken once.
    pub fn take_results(&self) -> Option<mpsc::UnboundedReceiver<TaskResult>> {
        self.results.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Start the skill timers, the detector and the event pump.
    pub fn start(&self) {
        let mut handles = self.scheduler.start();

        let (sink, mut events) = mpsc::channel::<Event>(EVENT_BUFFER);
        handles.push(tokio::spawn(
            Arc::clone(&self.detector).run(sink, self.cancel.child_token()),
        ));

        let dispatcher = Arc::clone(&self.dispatcher);
        let cancel = self.cancel.child_token();
        handles.push(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let outcome = dispatcher.on_event(&event).await;
                    log::debug!("{} -> {:?}", event.event_type().as_str(), outcome);
                });
            }
        }));

        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(handles);
        log::info!("{} started", self.config.agent_name);
    }

    pub async fn on_event(&self, event: &Event) -> DispatchOutcome {
        self.dispatcher.on_event(event).await
    }

    /// Chat from the world; dispatched as a speaking event unless it is our own line.
    pub async fn on_chat(&self, sender: &str, text: &str) -> Option<DispatchOutcome> {
        let event = self.detector.on_chat(sender, text)?;
        Some(self.dispatcher.on_event(&event).await)
    }

    pub async fn on_health_change(&self, previous: f32, current: f32) -> Option<DispatchOutcome> {
        match self.detector.on_health_change(previous, current).await {
            Ok(Some(event)) => Some(self.dispatcher.on_event(&event).await),
            Ok(None) => None,
            Err(e) => {
                log::warn!("damage sample failed: {:#}", e);
                None
            }
        }
    }

    pub async fn respond(&self, event: &Event) -> EmergencyOutcome {
        self.emergency.respond(event).await
    }

    /// Run a task to completion on the caller's task.
    pub async fn run_task(&self, task: AgentTask) -> TaskResult {
        self.task_loop.run(task, self.cancel.child_token()).await
    }

    /// Run a task in the background; its result arrives on [`AgentCore::take_results`].
    pub fn submit(&self, task: AgentTask) -> TaskId {
        self.spawner.submit(task)
    }

    pub fn inject_feedback(&self, text: impl Into<String>) -> FeedbackOutcome {
        self.task_loop.inject_feedback(text)
    }

    pub fn reply_to(&self, text: impl Into<String>) -> bool {
        self.task_loop.reply_to(text)
    }

    /// Cancel running tasks and skills, stop every timer and wait for them.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.scheduler.shutdown();
        let handles: Vec<JoinHandle<()>> = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                log::warn!("background task ended abnormally: {}", e);
            }
        }
        log::info!("{} stopped", self.config.agent_name);
    }
}
