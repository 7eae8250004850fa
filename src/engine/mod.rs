pub mod context;
pub mod submit;
pub mod task_loop;

pub use context::{build_messages, describe_world};
pub use submit::{TaskSpawner, TaskSubmitter};
pub use task_loop::{is_conversational, FeedbackOutcome, TaskLoop, TaskLoopConfig};
