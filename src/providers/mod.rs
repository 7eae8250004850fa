pub mod llm;
pub mod ollama;

pub use llm::{
    AnthropicProvider, Completion, LLMProvider, Message, MockLLMProvider, OpenAIProvider,
    ToolCallRequest, ToolSpec,
};
pub use ollama::OllamaProvider;

use std::sync::Arc;

use crate::config::Config;

/// Pick a provider from configuration: Anthropic, then OpenAI (or any
/// OpenAI-compatible endpoint), then a local Ollama server when its URL is
/// configured, falling back to the scripted mock for offline runs.
pub fn from_config(config: &Config) -> Arc<dyn LLMProvider> {
    if let Some(key) = &config.anthropic_api_key {
        let mut provider = AnthropicProvider::new(key.clone());
        if let Some(model) = &config.model {
            provider = provider.with_model(model.clone());
        }
        return Arc::new(provider);
    }
    if let Some(key) = &config.openai_api_key {
        let mut provider = OpenAIProvider::new(key.clone());
        if let Some(model) = &config.model {
            provider = provider.with_model(model.clone());
        }
        if let Some(url) = &config.openai_base_url {
            provider = provider.with_base_url(url.clone());
        }
        return Arc::new(provider);
    }
    if config.ollama_base_url.is_some() {
        return Arc::new(OllamaProvider::new(
            config.ollama_base_url.clone(),
            config.model.clone(),
        ));
    }
    log::warn!("no model provider configured; using the offline mock provider");
    Arc::new(MockLLMProvider::new())
}
