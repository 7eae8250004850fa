pub mod agent;
pub mod config;
pub mod emergency;
pub mod engine;
pub mod error;
pub mod events;
pub mod providers;
pub mod skills;
pub mod tools;
pub mod types;
pub mod world;

pub use agent::AgentCore;
pub use config::Config;
pub use error::CoreError;
pub use types::*;
