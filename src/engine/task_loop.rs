use futures::FutureExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::context::build_messages;
use crate::error::CoreError;
use crate::providers::{Completion, LLMProvider, Message, ToolCallRequest, ToolSpec};
use crate::skills::SkillScheduler;
use crate::tools::{ToolContext, ToolRuntime, PLAN_TOOL};
use crate::types::{AgentTask, TaskId, TaskResult, TaskStatus, TaskStep};
use crate::world::{MotorControl, WorldState};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskLoopConfig {
    pub max_iterations: usize,
    /// Wall-clock budget for a whole run, reply waits included.
    pub task_budget_ms: u64,
    pub model_timeout_ms: u64,
    pub reply_wait_ms: u64,
    pub tool_timeout_ms: u64,
    /// Chat lines of history included in the prompt.
    pub history_window: usize,
}

impl Default for TaskLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            task_budget_ms: 300_000,
            model_timeout_ms: 30_000,
            reply_wait_ms: 90_000,
            tool_timeout_ms: 60_000,
            history_window: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackOutcome {
    Queued,
    NotRunning,
    /// A run is suspended; use [`TaskLoop::reply_to`] instead.
    AwaitingReply,
}

struct Suspended {
    task_id: TaskId,
    reply: oneshot::Sender<String>,
}

/// Model-driven tool-calling loop.
///
/// Several runs may be in flight at once; feedback goes to whichever run
/// reaches its next iteration first and replies go to the most recently
/// suspended run.
pub struct TaskLoop {
    llm: Arc<dyn LLMProvider>,
    tools: Arc<ToolRuntime>,
    world: Arc<dyn WorldState>,
    motor: Arc<dyn MotorControl>,
    scheduler: Arc<SkillScheduler>,
    config: TaskLoopConfig,
    agent_name: String,
    feedback: Mutex<VecDeque<String>>,
    suspended: Mutex<Vec<Suspended>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TaskLoop {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        tools: Arc<ToolRuntime>,
        world: Arc<dyn WorldState>,
        motor: Arc<dyn MotorControl>,
        scheduler: Arc<SkillScheduler>,
        config: TaskLoopConfig,
        agent_name: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            tools,
            world,
            motor,
            scheduler,
            config,
            agent_name: agent_name.into(),
            feedback: Mutex::new(VecDeque::new()),
            suspended: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &TaskLoopConfig {
        &self.config
    }

    pub fn is_waiting_for_reply(&self) -> bool {
        !lock(&self.suspended).is_empty()
    }

    /// Steer a running task; delivered as a user turn at its next iteration.
    pub fn inject_feedback(&self, text: impl Into<String>) -> FeedbackOutcome {
        if self.scheduler.state().active_tasks() == 0 {
            return FeedbackOutcome::NotRunning;
        }
        if self.is_waiting_for_reply() {
            return FeedbackOutcome::AwaitingReply;
        }
        lock(&self.feedback).push_back(text.into());
        FeedbackOutcome::Queued
    }

    /// Resume the most recently suspended run. Returns `false` if none waits.
    pub fn reply_to(&self, text: impl Into<String>) -> bool {
        let mut text = text.into();
        loop {
            let Some(waiting) = lock(&self.suspended).pop() else {
                return false;
            };
            match waiting.reply.send(text) {
                Ok(()) => {
                    log::info!("reply delivered to task {}", waiting.task_id);
                    return true;
                }
                // The run gave up waiting in the meantime; try the next one.
                Err(returned) => text = returned,
            }
        }
    }

    pub async fn run(&self, task: AgentTask, cancel: CancellationToken) -> TaskResult {
        let _active = self.scheduler.state().task_started();
        let started = Instant::now();
        log::info!("task {} started: {}", task.id, task.goal);

        let mut result = TaskResult::new(task.id);
        result.status = TaskStatus::InProgress;

        let budget = Duration::from_millis(self.config.task_budget_ms);
        let outcome = match tokio::time::timeout(budget, self.drive(&task, &cancel, &mut result)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CoreError::timeout("task", budget)),
        };

        match outcome {
            Ok(text) => {
                result.status = TaskStatus::Completed;
                result.final_message = Some(text);
                log::info!(
                    "task {} completed in {:?} after {} iteration(s)",
                    task.id,
                    started.elapsed(),
                    result.iterations
                );
            }
            Err(CoreError::Cancelled) => {
                result.status = TaskStatus::Error;
                result.forced_stop = true;
                result.final_message = Some("stopped before finishing".to_string());
                result.error = Some(CoreError::Cancelled);
                log::info!("task {} cancelled", task.id);
            }
            Err(e) => {
                result.status = TaskStatus::Error;
                result.final_message = Some(e.to_string());
                log::warn!("task {} failed: {}", task.id, e);
                result.error = Some(e);
            }
        }
        result
    }

    async fn drive(
        &self,
        task: &AgentTask,
        cancel: &CancellationToken,
        result: &mut TaskResult,
    ) -> Result<String, CoreError> {
        let mut messages =
            build_messages(task, self.world.as_ref(), &self.agent_name, self.config.history_window).await;
        let allowed = task.allowed_tools.as_deref();
        let specs = self.tools.get_schemas(allowed);
        let mut plan_seen = false;

        loop {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            if result.iterations >= self.config.max_iterations {
                return Err(CoreError::IterationBudget {
                    iterations: result.iterations,
                });
            }

            for feedback in lock(&self.feedback).drain(..) {
                messages.push(Message::user(format!("Feedback: {}", feedback)));
            }

            let completion = self.call_model(messages.clone(), &specs, cancel).await?;

            if completion.tool_calls.is_empty() {
                let text = completion.text.trim().to_string();
                let iterations_left = result.iterations + 1 < self.config.max_iterations;
                if iterations_left && is_conversational(&text) {
                    messages.push(Message::assistant(text.clone()));
                    match self.wait_for_reply(task.id, cancel).await? {
                        Some(reply) => {
                            messages.push(Message::user(reply));
                            continue;
                        }
                        None => {
                            log::info!("task {}: no reply, finishing with the question", task.id);
                            return Ok(text);
                        }
                    }
                }
                return Ok(text);
            }

            messages.push(Message::assistant_with_tools(
                completion.text.clone(),
                completion.tool_calls.clone(),
            ));
            for call in &completion.tool_calls {
                if cancel.is_cancelled() {
                    return Err(CoreError::Cancelled);
                }
                let step = self.execute_tool(task.id, call, allowed, cancel).await;
                let observation = match (&step.result, &step.failure_reason) {
                    (Some(output), _) => output.clone(),
                    (None, Some(reason)) => format!("Error: {}", reason),
                    (None, None) => String::new(),
                };
                messages.push(Message::tool(call.id.clone(), observation));

                if call.name == PLAN_TOOL && !plan_seen {
                    plan_seen = true;
                } else {
                    result.steps.push(step);
                }
            }

            result.iterations += 1;
        }
    }

    async fn call_model(
        &self,
        messages: Vec<Message>,
        specs: &[ToolSpec],
        cancel: &CancellationToken,
    ) -> Result<Completion, CoreError> {
        let limit = Duration::from_millis(self.config.model_timeout_ms);
        tokio::select! {
            _ = cancel.cancelled() => Err(CoreError::Cancelled),
            reply = tokio::time::timeout(limit, self.llm.complete(messages, specs)) => match reply {
                Ok(Ok(completion)) => Ok(completion),
                Ok(Err(e)) => Err(CoreError::Model(format!("{:#}", e))),
                Err(_) => Err(CoreError::timeout("model call", limit)),
            },
        }
    }

    /// Run one tool call to a step record. Never fails.
    async fn execute_tool(
        &self,
        task_id: TaskId,
        call: &ToolCallRequest,
        allowed: Option<&[String]>,
        cancel: &CancellationToken,
    ) -> TaskStep {
        if !ToolRuntime::is_allowed(&call.name, allowed) {
            let err = CoreError::UnknownTool(call.name.clone());
            return TaskStep::failed(&call.name, call.arguments.clone(), err.to_string());
        }

        let context = ToolContext {
            task_id,
            world: Arc::clone(&self.world),
            motor: Arc::clone(&self.motor),
            scheduler: Arc::clone(&self.scheduler),
            cancel: cancel.child_token(),
        };
        let limit = Duration::from_millis(self.config.tool_timeout_ms);
        let run = AssertUnwindSafe(self.tools.execute(call, &context)).catch_unwind();

        let failure = match tokio::time::timeout(limit, run).await {
            Ok(Ok(Ok(output))) if output.success => {
                return TaskStep::completed(&call.name, call.arguments.clone(), output.render());
            }
            Ok(Ok(Ok(output))) => output.render(),
            Ok(Ok(Err(e))) => match e.downcast::<CoreError>() {
                Ok(core) => core.to_string(),
                Err(e) => CoreError::ToolExecution {
                    tool: call.name.clone(),
                    message: format!("{:#}", e),
                }
                .to_string(),
            },
            Ok(Err(_)) => CoreError::ToolExecution {
                tool: call.name.clone(),
                message: "panicked".to_string(),
            }
            .to_string(),
            Err(_) => {
                context.cancel.cancel();
                CoreError::timeout(format!("tool '{}'", call.name), limit).to_string()
            }
        };
        log::warn!("task {}: tool {} failed: {}", task_id, call.name, failure);
        TaskStep::failed(&call.name, call.arguments.clone(), failure)
    }

    /// `Ok(None)` when the wait window closes without a reply.
    async fn wait_for_reply(
        &self,
        task_id: TaskId,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, CoreError> {
        let (tx, rx) = oneshot::channel();
        lock(&self.suspended).push(Suspended { task_id, reply: tx });
        let _waiting = SuspendedGuard {
            suspended: &self.suspended,
            task_id,
        };
        log::info!("task {} suspended waiting for a reply", task_id);

        let limit = Duration::from_millis(self.config.reply_wait_ms);
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(CoreError::Cancelled),
            reply = tokio::time::timeout(limit, rx) => Ok(match reply {
                Ok(Ok(text)) => Some(text),
                _ => None,
            }),
        };
        outcome
    }
}

/// Drops a run's waiting slot however the wait ends, including when the
/// whole run is dropped by the task budget.
struct SuspendedGuard<'a> {
    suspended: &'a Mutex<Vec<Suspended>>,
    task_id: TaskId,
}

impl Drop for SuspendedGuard<'_> {
    fn drop(&mut self) {
        lock(self.suspended).retain(|s| s.task_id != self.task_id);
    }
}

fn reply_request() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?i)\b(let me know|tell me|what do you think|should i|do you want|would you like|please (reply|respond|confirm|answer))\b",
            )
            .ok()
        })
        .as_ref()
}

/// Text that expects an answer: a question, or an explicit request for a reply.
pub fn is_conversational(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    if text.contains('?') || text.contains('\u{ff1f}') {
        return true;
    }
    reply_request().map_or(false, |re| re.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockLLMProvider;
    use crate::skills::builtin::register_defaults;
    use crate::skills::{ExecutionState, SchedulerConfig};
    use crate::types::StepStatus;
    use crate::world::SimulatedWorld;
    use serde_json::json;

    fn build(llm: Arc<MockLLMProvider>, config: TaskLoopConfig) -> Arc<TaskLoop> {
        let world = SimulatedWorld::new();
        let scheduler = Arc::new(SkillScheduler::new(
            SchedulerConfig::default(),
            Arc::new(world.clone()),
            Arc::new(world.clone()),
            ExecutionState::new(),
        ));
        register_defaults(&scheduler);
        let tools = Arc::new(ToolRuntime::with_defaults(&scheduler));
        Arc::new(TaskLoop::new(
            llm,
            tools,
            Arc::new(world.clone()),
            Arc::new(world),
            scheduler,
            config,
            "golem",
        ))
    }

    async fn wait_until_suspended(task_loop: &TaskLoop) {
        while !task_loop.is_waiting_for_reply() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_iteration_budget() {
        let llm = Arc::new(MockLLMProvider::with_script(
            vec![],
            Completion::tool_call("get_status", json!({})),
        ));
        let config = TaskLoopConfig {
            max_iterations: 3,
            ..TaskLoopConfig::default()
        };
        let task_loop = build(llm.clone(), config);

        let result = task_loop.run(AgentTask::new("wander"), CancellationToken::new()).await;
        assert_eq!(result.status, TaskStatus::Error);
        assert_eq!(result.iterations, 3);
        assert_eq!(result.steps.len(), 3);
        assert_eq!(result.error, Some(CoreError::IterationBudget { iterations: 3 }));
        assert!(!result.forced_stop);
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plan_skipped_and_disallowed_tool_fails() {
        let llm = Arc::new(MockLLMProvider::with_script(
            vec![Completion::tool_call("plan", json!({"steps": "walk"}))
                .with_tool_call("go_to", json!({"x": 1, "y": 64, "z": 1}))],
            Completion::text("Done."),
        ));
        let task_loop = build(llm.clone(), TaskLoopConfig::default());
        let task = AgentTask::new("walk").with_allowed_tools(["plan", "chat"]);

        let result = task_loop.run(task, CancellationToken::new()).await;
        assert!(result.is_completed());
        assert_eq!(result.final_message.as_deref(), Some("Done."));
        assert_eq!(result.iterations, 1);
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].tool, "go_to");
        assert_eq!(result.steps[0].status, StepStatus::Failed);
        assert_eq!(result.steps[0].failure_reason.as_deref(), Some("unknown tool: go_to"));

        let second_call = &llm.seen_messages()[1];
        let observation = second_call.last().map(|m| m.content.clone()).unwrap_or_default();
        assert_eq!(observation, "Error: unknown tool: go_to");
    }

    #[tokio::test(start_paused = true)]
    async fn test_question_suspends_until_reply() {
        let llm = Arc::new(MockLLMProvider::with_script(
            vec![Completion::text("Which way should I go?")],
            Completion::text("Heading north."),
        ));
        let task_loop = build(llm.clone(), TaskLoopConfig::default());

        let running = {
            let task_loop = Arc::clone(&task_loop);
            tokio::spawn(async move { task_loop.run(AgentTask::new("explore"), CancellationToken::new()).await })
        };
        wait_until_suspended(&task_loop).await;
        assert_eq!(task_loop.inject_feedback("hurry"), FeedbackOutcome::AwaitingReply);
        assert!(task_loop.reply_to("north"));

        let result = running.await.unwrap();
        assert!(result.is_completed());
        assert_eq!(result.final_message.as_deref(), Some("Heading north."));
        assert_eq!(result.iterations, 0);
        assert!(!task_loop.is_waiting_for_reply());

        let resumed = &llm.seen_messages()[1];
        assert_eq!(resumed.last().map(|m| m.content.as_str()), Some("north"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_question_finishes_with_it() {
        let llm = Arc::new(MockLLMProvider::with_response("Want me to build a hut?".to_string()));
        let task_loop = build(llm.clone(), TaskLoopConfig::default());

        let result = task_loop.run(AgentTask::new("idle"), CancellationToken::new()).await;
        assert!(result.is_completed());
        assert_eq!(result.final_message.as_deref(), Some("Want me to build a hut?"));
        assert_eq!(llm.call_count(), 1);
        assert!(!task_loop.reply_to("yes"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_expiry_while_waiting_clears_reply_slot() {
        let llm = Arc::new(MockLLMProvider::with_response("Which way should I go?".to_string()));
        let config = TaskLoopConfig {
            task_budget_ms: 1_000,
            reply_wait_ms: 90_000,
            ..TaskLoopConfig::default()
        };
        let task_loop = build(llm, config);

        let result = task_loop.run(AgentTask::new("explore"), CancellationToken::new()).await;
        assert_eq!(result.status, TaskStatus::Error);
        assert!(result.error.as_ref().map_or(false, CoreError::is_timeout));
        assert!(!task_loop.is_waiting_for_reply());
        assert!(!task_loop.reply_to("north"));

        let _other = task_loop.scheduler.state().task_started();
        assert_eq!(task_loop.inject_feedback("go left"), FeedbackOutcome::Queued);
    }

    #[tokio::test(start_paused = true)]
    async fn test_feedback_delivered_next_iteration() {
        let llm = Arc::new(
            MockLLMProvider::with_script(
                vec![Completion::tool_call("get_status", json!({}))],
                Completion::text("Done."),
            )
            .with_delay(Duration::from_secs(1)),
        );
        let task_loop = build(llm.clone(), TaskLoopConfig::default());
        assert_eq!(task_loop.inject_feedback("go left"), FeedbackOutcome::NotRunning);

        let running = {
            let task_loop = Arc::clone(&task_loop);
            tokio::spawn(async move { task_loop.run(AgentTask::new("explore"), CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(task_loop.inject_feedback("go left"), FeedbackOutcome::Queued);

        let result = running.await.unwrap();
        assert!(result.is_completed());
        let second_call = &llm.seen_messages()[1];
        assert!(second_call.iter().any(|m| m.role == "user" && m.content == "Feedback: go left"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_forced_stop() {
        let llm = Arc::new(MockLLMProvider::new().with_delay(Duration::from_secs(5)));
        let task_loop = build(llm, TaskLoopConfig::default());
        let cancel = CancellationToken::new();

        let running = {
            let task_loop = Arc::clone(&task_loop);
            let cancel = cancel.clone();
            tokio::spawn(async move { task_loop.run(AgentTask::new("dig"), cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let result = running.await.unwrap();
        assert_eq!(result.status, TaskStatus::Error);
        assert!(result.forced_stop);
        assert_eq!(result.error, Some(CoreError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_timeout() {
        let llm = Arc::new(MockLLMProvider::new().with_delay(Duration::from_secs(60)));
        let task_loop = build(llm, TaskLoopConfig::default());

        let result = task_loop.run(AgentTask::new("dig"), CancellationToken::new()).await;
        assert_eq!(result.status, TaskStatus::Error);
        assert!(!result.forced_stop);
        assert!(result.error.as_ref().map_or(false, CoreError::is_timeout));
    }

    #[test]
    fn test_conversational_detection() {
        assert!(is_conversational("Which way should I go?"));
        assert!(is_conversational("どこへ行けばいい？"));
        assert!(is_conversational("I found iron. Let me know if you want it."));
        assert!(!is_conversational("Done. I built the hut."));
        assert!(!is_conversational(""));
    }

    #[test]
    fn test_config_defaults() {
        let config = TaskLoopConfig::default();
        assert_eq!(config.max_iterations, 30);
        assert_eq!(config.reply_wait_ms, 90_000);
        assert_eq!(config.history_window, 10);
    }
}
