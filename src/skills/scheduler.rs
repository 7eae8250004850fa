use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{
    resolve_args, ContinuousSkill, ExecutionState, OneShotSkill, SkillContext, SkillRunResult,
};
use crate::error::CoreError;
use crate::world::{MotorControl, WorldState};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Bound on pending continuous runs; overflow evicts the lowest priority.
    pub queue_capacity: usize,
    pub ticker_period_ms: u64,
    pub continuous_timeout_ms: u64,
    pub one_shot_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            ticker_period_ms: 100,
            continuous_timeout_ms: 10_000,
            one_shot_timeout_ms: 120_000,
        }
    }
}

/// A pending run of a continuous skill.
pub struct ScheduledTask {
    pub skill: Arc<dyn ContinuousSkill>,
    pub enqueued_at: Instant,
    pub args: Value,
    priority: i32,
    seq: u64,
}

impl ScheduledTask {
    pub fn name(&self) -> &str {
        self.skill.name()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

// Max-heap order: higher priority first, then the earlier request.
impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// A run of this skill is already waiting.
    AlreadyQueued,
    Disabled,
    /// Queued; the named lower priority entry was dropped to make room.
    Evicted(String),
    /// The new entry was itself the lowest priority and was dropped.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContinuousRunOutcome {
    Completed,
    Failed(String),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuousRun {
    pub skill: String,
    pub outcome: ContinuousRunOutcome,
}

struct ContinuousEntry {
    skill: Arc<dyn ContinuousSkill>,
    enabled: AtomicBool,
}

/// Owns the skill catalog, the continuous-run queue and one-shot exclusion.
pub struct SkillScheduler {
    config: SchedulerConfig,
    world: Arc<dyn WorldState>,
    motor: Arc<dyn MotorControl>,
    state: Arc<ExecutionState>,
    continuous: RwLock<HashMap<String, Arc<ContinuousEntry>>>,
    one_shots: RwLock<HashMap<String, Arc<dyn OneShotSkill>>>,
    queue: Mutex<BinaryHeap<ScheduledTask>>,
    seq: AtomicU64,
    running_continuous: AtomicBool,
    current_one_shot: Mutex<Option<CancellationToken>>,
    shutdown: CancellationToken,
}

impl SkillScheduler {
    pub fn new(
        config: SchedulerConfig,
        world: Arc<dyn WorldState>,
        motor: Arc<dyn MotorControl>,
        state: Arc<ExecutionState>,
    ) -> Self {
        Self {
            config,
            world,
            motor,
            state,
            continuous: RwLock::new(HashMap::new()),
            one_shots: RwLock::new(HashMap::new()),
            queue: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            running_continuous: AtomicBool::new(false),
            current_one_shot: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> &Arc<ExecutionState> {
        &self.state
    }

    /// Returns `false` when a skill with the same name is already registered.
    pub fn register_continuous(&self, skill: Arc<dyn ContinuousSkill>) -> bool {
        let mut continuous = self.continuous.write().unwrap_or_else(|e| e.into_inner());
        let name = skill.name().to_string();
        if continuous.contains_key(&name) {
            log::debug!("continuous skill '{}' already registered", name);
            return false;
        }
        log::info!(
            "registered continuous skill '{}' (priority {}, movement {})",
            name,
            skill.priority(),
            skill.involves_movement()
        );
        continuous.insert(
            name,
            Arc::new(ContinuousEntry {
                skill,
                enabled: AtomicBool::new(true),
            }),
        );
        true
    }

    /// Returns `false` when a skill with the same name is already registered.
    pub fn register_one_shot(&self, skill: Arc<dyn OneShotSkill>) -> bool {
        let mut one_shots = self.one_shots.write().unwrap_or_else(|e| e.into_inner());
        let name = skill.name().to_string();
        if one_shots.contains_key(&name) {
            log::debug!("one-shot skill '{}' already registered", name);
            return false;
        }
        log::info!("registered one-shot skill '{}'", name);
        one_shots.insert(name, skill);
        true
    }

    pub fn one_shot_skills(&self) -> Vec<Arc<dyn OneShotSkill>> {
        let one_shots = self.one_shots.read().unwrap_or_else(|e| e.into_inner());
        let mut skills: Vec<_> = one_shots.values().cloned().collect();
        skills.sort_by(|a, b| a.name().cmp(b.name()));
        skills
    }

    pub fn continuous_skill_names(&self) -> Vec<String> {
        let continuous = self.continuous.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = continuous.keys().cloned().collect();
        names.sort();
        names
    }

    fn continuous_entry(&self, name: &str) -> Option<Arc<ContinuousEntry>> {
        self.continuous
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    fn one_shot(&self, name: &str) -> Option<Arc<dyn OneShotSkill>> {
        self.one_shots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), CoreError> {
        let entry = self
            .continuous_entry(name)
            .ok_or_else(|| CoreError::SkillNotFound(name.to_string()))?;
        entry.enabled.store(enabled, Ordering::Release);
        Ok(())
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.continuous_entry(name)
            .map(|e| e.enabled.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    fn queue(&self) -> MutexGuard<'_, BinaryHeap<ScheduledTask>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a run of the named continuous skill.
    pub fn request_continuous_run(&self, name: &str, args: Value) -> Result<EnqueueOutcome, CoreError> {
        let entry = self
            .continuous_entry(name)
            .ok_or_else(|| CoreError::SkillNotFound(name.to_string()))?;
        if !entry.enabled.load(Ordering::Acquire) {
            return Ok(EnqueueOutcome::Disabled);
        }

        let mut queue = self.queue();
        if queue.iter().any(|t| t.name() == name) {
            return Ok(EnqueueOutcome::AlreadyQueued);
        }

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        queue.push(ScheduledTask {
            priority: entry.skill.priority(),
            skill: Arc::clone(&entry.skill),
            enqueued_at: Instant::now(),
            args,
            seq,
        });

        if queue.len() <= self.config.queue_capacity {
            log::debug!("queued continuous skill '{}'", name);
            return Ok(EnqueueOutcome::Queued);
        }

        // Over capacity: drop the lowest priority entry (the newest among equals).
        let mut tasks = std::mem::take(&mut *queue).into_vec();
        let lowest = tasks
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.cmp(b.1))
            .map(|(i, _)| i);
        let evicted = lowest.map(|i| tasks.swap_remove(i));
        *queue = BinaryHeap::from(tasks);

        match evicted {
            Some(task) if task.seq == seq => {
                log::debug!("continuous queue full; dropped new request '{}'", name);
                Ok(EnqueueOutcome::Rejected)
            }
            Some(task) => {
                log::debug!(
                    "continuous queue full; evicted '{}' (priority {}) for '{}'",
                    task.name(),
                    task.priority,
                    name
                );
                Ok(EnqueueOutcome::Evicted(task.name().to_string()))
            }
            None => Ok(EnqueueOutcome::Queued),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue().len()
    }

    /// Names of queued skills, in the order they would run.
    pub fn queued(&self) -> Vec<String> {
        let queue = self.queue();
        let mut tasks: Vec<&ScheduledTask> = queue.iter().collect();
        tasks.sort_by(|a, b| b.cmp(a));
        tasks.into_iter().map(|t| t.name().to_string()).collect()
    }

    pub fn is_running_continuous(&self) -> bool {
        self.running_continuous.load(Ordering::Acquire)
    }

    fn context(&self, cancel: CancellationToken) -> SkillContext {
        SkillContext {
            world: Arc::clone(&self.world),
            motor: Arc::clone(&self.motor),
            state: Arc::clone(&self.state),
            cancel,
        }
    }

    /// Pop and run the highest priority pending task, if the scheduler is idle.
    ///
    /// Failures and timeouts are logged and reported; the scheduler always
    /// returns to idle.
    pub async fn run_next_continuous(&self) -> Option<ContinuousRun> {
        if self
            .running_continuous
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let next = self.queue().pop();
        let Some(task) = next else {
            self.running_continuous.store(false, Ordering::Release);
            return None;
        };

        let name = task.name().to_string();
        let cancel = self.shutdown.child_token();
        let ctx = self.context(cancel.clone());
        let timeout = Duration::from_millis(self.config.continuous_timeout_ms);

        let run = AssertUnwindSafe(task.skill.run(task.args.clone(), &ctx)).catch_unwind();
        let outcome = match tokio::time::timeout(timeout, run).await {
            Ok(Ok(Ok(()))) => ContinuousRunOutcome::Completed,
            Ok(Ok(Err(e))) => {
                log::warn!("continuous skill '{}' failed: {:#}", name, e);
                ContinuousRunOutcome::Failed(format!("{:#}", e))
            }
            Ok(Err(_)) => {
                log::error!("continuous skill '{}' panicked", name);
                ContinuousRunOutcome::Failed("panicked".to_string())
            }
            Err(_) => {
                cancel.cancel();
                log::warn!(
                    "continuous skill '{}' timed out after {}ms",
                    name,
                    timeout.as_millis()
                );
                ContinuousRunOutcome::TimedOut
            }
        };

        self.running_continuous.store(false, Ordering::Release);
        Some(ContinuousRun {
            skill: name,
            outcome,
        })
    }

    pub async fn run_one_shot(&self, name: &str, args: Value) -> SkillRunResult {
        self.run_one_shot_with_cancel(name, args, &CancellationToken::new())
            .await
    }

    /// Run a one-shot skill, refusing immediately if another one is running.
    ///
    /// Cancelling `parent` cancels the run at its next checkpoint.
    pub async fn run_one_shot_with_cancel(
        &self,
        name: &str,
        args: Value,
        parent: &CancellationToken,
    ) -> SkillRunResult {
        let Some(skill) = self.one_shot(name) else {
            return SkillRunResult::failed(CoreError::SkillNotFound(name.to_string()));
        };
        let args = match resolve_args(&skill.params(), args) {
            Ok(args) => args,
            Err(e) => return SkillRunResult::failed(e),
        };

        let _guard = match self.state.try_begin_one_shot(name) {
            Ok(guard) => guard,
            Err(e) => {
                log::info!("rejected one-shot '{}': {}", name, e);
                return SkillRunResult::failed(e);
            }
        };

        let cancel = parent.child_token();
        *self
            .current_one_shot
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(cancel.clone());
        let _current = CurrentOneShot(&self.current_one_shot);

        let ctx = self.context(cancel.clone());
        let timeout = Duration::from_millis(self.config.one_shot_timeout_ms);
        log::debug!("running one-shot '{}' with {}", name, args);

        let run = AssertUnwindSafe(skill.execute(args, &ctx)).catch_unwind();
        let result = match tokio::time::timeout(timeout, run).await {
            Ok(Ok(Ok(message))) => SkillRunResult::ok(message),
            Ok(Ok(Err(e))) => {
                let cancelled = cancel.is_cancelled()
                    || matches!(e.downcast_ref::<CoreError>(), Some(CoreError::Cancelled));
                if cancelled {
                    SkillRunResult::failed(CoreError::Cancelled)
                } else {
                    log::warn!("one-shot '{}' failed: {:#}", name, e);
                    SkillRunResult::failed_with(format!("{:#}", e))
                }
            }
            Ok(Err(_)) => {
                log::error!("one-shot '{}' panicked", name);
                SkillRunResult::failed_with(format!("skill '{}' panicked", name))
            }
            Err(_) => {
                cancel.cancel();
                SkillRunResult::failed(CoreError::timeout(format!("skill '{}'", name), timeout))
            }
        };
        result
    }

    /// Request the running one-shot skill to stop at its next checkpoint.
    pub fn interrupt(&self) -> bool {
        match self
            .current_one_shot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Spawn the ticker and one precondition poller per continuous skill.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let scheduler = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(scheduler.config.ticker_period_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = scheduler.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        scheduler.run_next_continuous().await;
                    }
                }
            }
        }));

        let entries: Vec<Arc<ContinuousEntry>> = self
            .continuous
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for entry in entries {
            let scheduler = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(entry.skill.interval());
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = scheduler.shutdown.cancelled() => break,
                        _ = interval.tick() => scheduler.poll_precondition(&entry).await,
                    }
                }
            }));
        }

        handles
    }

    async fn poll_precondition(&self, entry: &ContinuousEntry) {
        if !entry.enabled.load(Ordering::Acquire) {
            return;
        }
        let name = entry.skill.name();
        match entry.skill.check(self.world.as_ref()).await {
            Ok(Some(args)) => {
                if let Err(e) = self.request_continuous_run(name, args) {
                    log::warn!("could not enqueue '{}': {}", name, e);
                }
            }
            Ok(None) => {}
            Err(e) => log::debug!("precondition check for '{}' failed: {:#}", name, e),
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.interrupt();
    }
}

/// Forgets the running one-shot's token when the run ends or is dropped.
struct CurrentOneShot<'a>(&'a Mutex<Option<CancellationToken>>);

impl Drop for CurrentOneShot<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::{ParamType, SkillParam};
    use crate::world::SimulatedWorld;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct Counter {
        name: String,
        priority: i32,
        runs: Arc<AtomicUsize>,
        delay: Duration,
        fail: bool,
    }

    impl Counter {
        fn new(name: &str, priority: i32) -> Self {
            Self {
                name: name.to_string(),
                priority,
                runs: Arc::new(AtomicUsize::new(0)),
                delay: Duration::ZERO,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl ContinuousSkill for Counter {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "counts its runs"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(50)
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn check(&self, _world: &dyn WorldState) -> Result<Option<Value>> {
            Ok(Some(json!({})))
        }

        async fn run(&self, _args: Value, _ctx: &SkillContext) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                anyhow::bail!("flaky failure");
            }
            Ok(())
        }
    }

    struct Echo;

    #[async_trait]
    impl OneShotSkill for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "echo text back"
        }

        fn params(&self) -> Vec<SkillParam> {
            vec![SkillParam::required("text", ParamType::String, "what to say")]
        }

        async fn execute(&self, args: Value, _ctx: &SkillContext) -> Result<String> {
            Ok(args["text"].as_str().unwrap_or_default().to_string())
        }
    }

    struct Linger;

    #[async_trait]
    impl OneShotSkill for Linger {
        fn name(&self) -> &str {
            "linger"
        }

        fn description(&self) -> &str {
            "stand still for a minute"
        }

        fn params(&self) -> Vec<SkillParam> {
            Vec::new()
        }

        async fn execute(&self, _args: Value, ctx: &SkillContext) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            ctx.checkpoint()?;
            Ok("done".to_string())
        }
    }

    fn scheduler_with(config: SchedulerConfig) -> SkillScheduler {
        let world = Arc::new(SimulatedWorld::new());
        SkillScheduler::new(config, world.clone(), world, ExecutionState::new())
    }

    #[test]
    fn test_registration_is_idempotent() {
        let scheduler = scheduler_with(SchedulerConfig::default());
        assert!(scheduler.register_continuous(Arc::new(Counter::new("a", 1))));
        assert!(!scheduler.register_continuous(Arc::new(Counter::new("a", 5))));
        assert!(scheduler.register_one_shot(Arc::new(Echo)));
        assert!(!scheduler.register_one_shot(Arc::new(Echo)));
        assert_eq!(scheduler.continuous_skill_names(), vec!["a".to_string()]);
    }

    #[test]
    fn test_unknown_continuous_skill() {
        let scheduler = scheduler_with(SchedulerConfig::default());
        assert_eq!(
            scheduler.request_continuous_run("ghost", json!({})),
            Err(CoreError::SkillNotFound("ghost".to_string()))
        );
    }

    #[test]
    fn test_priority_eviction_drops_lowest_not_oldest() {
        let scheduler = scheduler_with(SchedulerConfig {
            queue_capacity: 3,
            ..SchedulerConfig::default()
        });
        for (name, priority) in [("old_mid", 5), ("low", 1), ("mid", 4), ("urgent", 9)] {
            scheduler.register_continuous(Arc::new(Counter::new(name, priority)));
        }

        for name in ["old_mid", "low", "mid"] {
            assert_eq!(
                scheduler.request_continuous_run(name, json!({})),
                Ok(EnqueueOutcome::Queued)
            );
        }
        assert_eq!(
            scheduler.request_continuous_run("urgent", json!({})),
            Ok(EnqueueOutcome::Evicted("low".to_string()))
        );
        assert_eq!(scheduler.queued(), vec!["urgent", "old_mid", "mid"]);
    }

    #[test]
    fn test_new_lowest_request_is_rejected_when_full() {
        let scheduler = scheduler_with(SchedulerConfig {
            queue_capacity: 1,
            ..SchedulerConfig::default()
        });
        scheduler.register_continuous(Arc::new(Counter::new("high", 7)));
        scheduler.register_continuous(Arc::new(Counter::new("low", 1)));

        scheduler.request_continuous_run("high", json!({})).unwrap();
        assert_eq!(
            scheduler.request_continuous_run("low", json!({})),
            Ok(EnqueueOutcome::Rejected)
        );
        assert_eq!(scheduler.queued(), vec!["high"]);
    }

    #[test]
    fn test_duplicate_and_disabled_requests() {
        let scheduler = scheduler_with(SchedulerConfig::default());
        scheduler.register_continuous(Arc::new(Counter::new("a", 1)));

        scheduler.request_continuous_run("a", json!({})).unwrap();
        assert_eq!(
            scheduler.request_continuous_run("a", json!({})),
            Ok(EnqueueOutcome::AlreadyQueued)
        );

        scheduler.set_enabled("a", false).unwrap();
        assert!(!scheduler.is_enabled("a"));
        assert_eq!(
            scheduler.request_continuous_run("a", json!({})),
            Ok(EnqueueOutcome::Disabled)
        );
    }

    #[tokio::test]
    async fn test_run_next_pops_highest_priority() {
        let scheduler = scheduler_with(SchedulerConfig::default());
        let low = Counter::new("low", 1);
        let high = Counter::new("high", 9);
        let high_runs = Arc::clone(&high.runs);
        scheduler.register_continuous(Arc::new(low));
        scheduler.register_continuous(Arc::new(high));

        scheduler.request_continuous_run("low", json!({})).unwrap();
        scheduler.request_continuous_run("high", json!({})).unwrap();

        let run = scheduler.run_next_continuous().await.unwrap();
        assert_eq!(run.skill, "high");
        assert_eq!(run.outcome, ContinuousRunOutcome::Completed);
        assert_eq!(high_runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.queue_len(), 1);
    }

    #[tokio::test]
    async fn test_continuous_failure_is_reported_not_raised() {
        let scheduler = scheduler_with(SchedulerConfig::default());
        let mut skill = Counter::new("flaky", 1);
        skill.fail = true;
        scheduler.register_continuous(Arc::new(skill));
        scheduler.request_continuous_run("flaky", json!({})).unwrap();

        let run = scheduler.run_next_continuous().await.unwrap();
        assert!(matches!(run.outcome, ContinuousRunOutcome::Failed(_)));
        assert!(!scheduler.is_running_continuous());
        assert!(scheduler.run_next_continuous().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_timeout_returns_to_idle() {
        let scheduler = scheduler_with(SchedulerConfig {
            continuous_timeout_ms: 1_000,
            ..SchedulerConfig::default()
        });
        let mut skill = Counter::new("slow", 1);
        skill.delay = Duration::from_secs(60);
        scheduler.register_continuous(Arc::new(skill));
        scheduler.request_continuous_run("slow", json!({})).unwrap();

        let run = scheduler.run_next_continuous().await.unwrap();
        assert_eq!(run.outcome, ContinuousRunOutcome::TimedOut);
        assert!(!scheduler.is_running_continuous());
    }

    #[tokio::test]
    async fn test_one_shot_results() {
        let scheduler = scheduler_with(SchedulerConfig::default());
        scheduler.register_one_shot(Arc::new(Echo));

        let ok = scheduler.run_one_shot("echo", json!({"text": "hi"})).await;
        assert!(ok.success);
        assert_eq!(ok.message, "hi");

        let missing = scheduler.run_one_shot("nope", json!({})).await;
        assert_eq!(missing.error, Some(CoreError::SkillNotFound("nope".to_string())));

        let invalid = scheduler.run_one_shot("echo", json!({})).await;
        assert!(matches!(invalid.error, Some(CoreError::InvalidArguments(_))));
        assert!(!scheduler.state().is_one_shot_executing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_one_shot_leaves_nothing_to_interrupt() {
        let scheduler = scheduler_with(SchedulerConfig::default());
        scheduler.register_one_shot(Arc::new(Linger));

        let dropped =
            tokio::time::timeout(Duration::from_secs(1), scheduler.run_one_shot("linger", json!({}))).await;
        assert!(dropped.is_err());
        assert!(!scheduler.state().is_one_shot_executing());
        assert!(!scheduler.interrupt());
    }
}
