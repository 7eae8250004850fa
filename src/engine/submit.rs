use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::TaskLoop;
use crate::types::{AgentTask, TaskId, TaskResult};

/// Hands a task to something that will run it in the background.
pub trait TaskSubmitter: Send + Sync {
    fn submit(&self, task: AgentTask) -> TaskId;
}

/// Runs each submitted task on its own tokio task.
pub struct TaskSpawner {
    task_loop: Arc<TaskLoop>,
    cancel: CancellationToken,
    results: Option<mpsc::UnboundedSender<TaskResult>>,
}

impl TaskSpawner {
    /// Tasks are cancelled together with `cancel`.
    pub fn new(task_loop: Arc<TaskLoop>, cancel: CancellationToken) -> Self {
        Self {
            task_loop,
            cancel,
            results: None,
        }
    }

    /// Finished results are sent here.
    pub fn with_results(mut self, results: mpsc::UnboundedSender<TaskResult>) -> Self {
        self.results = Some(results);
        self
    }
}

impl TaskSubmitter for TaskSpawner {
    fn submit(&self, task: AgentTask) -> TaskId {
        let id = task.id;
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("cannot start task {} outside a runtime: {}", id, e);
                return id;
            }
        };

        let task_loop = Arc::clone(&self.task_loop);
        let cancel = self.cancel.child_token();
        let results = self.results.clone();
        handle.spawn(async move {
            let result = task_loop.run(task, cancel).await;
            if let Some(results) = results {
                // Receiver gone means nobody is listening any more.
                let _ = results.send(result);
            }
        });
        id
    }
}
