use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::CoreError;

/// Shared "what is the body doing right now" state.
///
/// Owned by the scheduler and handed by reference to skills, the task loop
/// and the reaction dispatcher so independent instances never share flags.
#[derive(Debug, Default)]
pub struct ExecutionState {
    executing: AtomicBool,
    running_one_shot: Mutex<Option<String>>,
    movement_locks: Mutex<HashMap<String, i32>>,
    active_tasks: AtomicUsize,
}

impl ExecutionState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the global one-shot slot. Never blocks.
    pub fn try_begin_one_shot(self: &Arc<Self>, name: &str) -> Result<OneShotGuard, CoreError> {
        if self
            .executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let running = self
                .running_one_shot()
                .unwrap_or_else(|| "unknown".to_string());
            return Err(CoreError::SkillBusy { running });
        }
        *lock(&self.running_one_shot) = Some(name.to_string());
        Ok(OneShotGuard {
            state: Arc::clone(self),
        })
    }

    pub fn is_one_shot_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    pub fn running_one_shot(&self) -> Option<String> {
        lock(&self.running_one_shot).clone()
    }

    /// Cooperative guard for continuous skills that move the body.
    ///
    /// Refused while a one-shot skill runs, while a strictly higher priority
    /// movement skill holds its lock, or while `name` itself is locked.
    pub fn try_lock_movement(self: &Arc<Self>, name: &str, priority: i32) -> Option<MovementLock> {
        if self.is_one_shot_executing() {
            return None;
        }
        let mut locks = lock(&self.movement_locks);
        if locks.contains_key(name) {
            return None;
        }
        if locks.values().any(|&held| held > priority) {
            return None;
        }
        locks.insert(name.to_string(), priority);
        Some(MovementLock {
            state: Arc::clone(self),
            name: name.to_string(),
        })
    }

    pub fn is_locked(&self, name: &str) -> bool {
        lock(&self.movement_locks).contains_key(name)
    }

    pub fn locked_skills(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.movement_locks).keys().cloned().collect();
        names.sort();
        names
    }

    /// Marks a task loop run as active until the guard drops.
    pub fn task_started(self: &Arc<Self>) -> TaskActivityGuard {
        self.active_tasks.fetch_add(1, Ordering::AcqRel);
        TaskActivityGuard {
            state: Arc::clone(self),
        }
    }

    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::Acquire)
    }

    /// Not idle: a one-shot skill is executing or a task loop is running.
    pub fn is_busy(&self) -> bool {
        self.is_one_shot_executing() || self.active_tasks() > 0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases the one-shot slot on drop, whatever way the run ended.
#[derive(Debug)]
pub struct OneShotGuard {
    state: Arc<ExecutionState>,
}

impl Drop for OneShotGuard {
    fn drop(&mut self) {
        *lock(&self.state.running_one_shot) = None;
        self.state.executing.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct MovementLock {
    state: Arc<ExecutionState>,
    name: String,
}

impl Drop for MovementLock {
    fn drop(&mut self) {
        lock(&self.state.movement_locks).remove(&self.name);
    }
}

#[derive(Debug)]
pub struct TaskActivityGuard {
    state: Arc<ExecutionState>,
}

impl Drop for TaskActivityGuard {
    fn drop(&mut self) {
        self.state.active_tasks.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_shot_exclusion() {
        let state = ExecutionState::new();
        let guard = state.try_begin_one_shot("go_to").unwrap();
        assert!(state.is_one_shot_executing());
        assert_eq!(state.running_one_shot().as_deref(), Some("go_to"));

        let second = state.try_begin_one_shot("attack_entity").unwrap_err();
        assert_eq!(
            second,
            CoreError::SkillBusy {
                running: "go_to".to_string()
            }
        );

        drop(guard);
        assert!(!state.is_one_shot_executing());
        assert!(state.try_begin_one_shot("attack_entity").is_ok());
    }

    #[test]
    fn test_movement_lock_priority() {
        let state = ExecutionState::new();
        let high = state.try_lock_movement("self_defense", 8).unwrap();

        assert!(state.try_lock_movement("wander", 1).is_none());
        assert!(state.try_lock_movement("self_defense", 8).is_none());

        // Equal priority is not strictly higher.
        let peer = state.try_lock_movement("follow", 8);
        assert!(peer.is_some());

        drop(high);
        drop(peer);
        assert!(state.locked_skills().is_empty());
        assert!(state.try_lock_movement("wander", 1).is_some());
    }

    #[test]
    fn test_movement_refused_during_one_shot() {
        let state = ExecutionState::new();
        let _guard = state.try_begin_one_shot("go_to").unwrap();
        assert!(state.try_lock_movement("self_defense", 100).is_none());
    }

    #[test]
    fn test_busy_tracks_tasks() {
        let state = ExecutionState::new();
        assert!(!state.is_busy());

        let task = state.task_started();
        assert!(state.is_busy());
        assert_eq!(state.active_tasks(), 1);

        drop(task);
        assert!(!state.is_busy());
    }
}
