pub mod detector;
pub mod dispatcher;
pub mod reaction;

pub use detector::{is_common_biome, is_rare_biome, DamageTracker, DetectorConfig, EventDetector};
pub use dispatcher::{goal_for, DispatchOutcome, ReactionDispatcher};
pub use reaction::{ReactionConfig, ReactionTable, ReactionType};
