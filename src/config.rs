use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::emergency::EmergencyConfig;
use crate::engine::TaskLoopConfig;
use crate::events::{DetectorConfig, ReactionConfig, ReactionTable};
use crate::skills::SchedulerConfig;
use crate::types::EventType;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub anthropic_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub ollama_base_url: Option<String>,
    pub model: Option<String>,
    /// In-game name of the controlled agent; its own chat lines are ignored.
    pub agent_name: String,
    pub scheduler: SchedulerConfig,
    pub detector: DetectorConfig,
    pub emergency: EmergencyConfig,
    pub task_loop: TaskLoopConfig,
    /// Per event-type overrides keyed by the event type name (e.g. `damage`).
    pub reactions: BTreeMap<String, ReactionConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            openai_base_url: None,
            ollama_base_url: None,
            model: None,
            agent_name: "golem".to_string(),
            scheduler: SchedulerConfig::default(),
            detector: DetectorConfig::default(),
            emergency: EmergencyConfig::default(),
            task_loop: TaskLoopConfig::default(),
            reactions: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.merge_env();
        config
    }

    /// Load a TOML file; missing fields fall back to defaults and
    /// environment keys are applied on top.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)
            .with_context(|| format!("parse config {}", path.display()))?;
        config.merge_env();
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        for key in config.reactions.keys() {
            if EventType::from_str(key).is_none() {
                anyhow::bail!("unknown event type in [reactions]: {}", key);
            }
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Built-in reaction defaults with this config's overrides applied.
    pub fn reaction_table(&self) -> ReactionTable {
        let mut table = ReactionTable::default();
        for (key, reaction) in &self.reactions {
            if let Some(event_type) = EventType::from_str(key) {
                table.set(event_type, reaction.clone());
            }
        }
        table
    }

    fn merge_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.openai_base_url = Some(url);
        }
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            self.ollama_base_url = Some(url);
        }
        if let Ok(model) = std::env::var("GOLEM_MODEL") {
            self.model = Some(model);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ReactionType;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            agent_name = "bob"

            [scheduler]
            queue_capacity = 4

            [reactions.damage]
            enabled = true
            reaction_type = "emergency"
            probability = 100
            idle_only = false
            "#,
        )
        .unwrap();

        assert_eq!(config.agent_name, "bob");
        assert_eq!(config.scheduler.queue_capacity, 4);
        assert_eq!(config.scheduler.ticker_period_ms, 100);
        assert_eq!(config.task_loop.max_iterations, 30);

        let table = config.reaction_table();
        let damage = table.get(EventType::Damage).unwrap();
        assert_eq!(damage.reaction_type, ReactionType::Emergency);
        assert!(!damage.idle_only);
    }

    #[test]
    fn test_unknown_reaction_key_rejected() {
        let result = Config::from_toml_str(
            r#"
            [reactions.earthquake]
            enabled = true
            reaction_type = "info"
            probability = 100
            idle_only = false
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_to_toml_hides_keys() {
        let mut config = Config::default();
        config.openai_api_key = Some("sk-secret".to_string());
        let rendered = config.to_toml().unwrap();
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[scheduler]"));
    }
}
