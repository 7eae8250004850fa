use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::providers::llm::{Completion, LLMProvider, Message, ToolCallRequest, ToolSpec};

/// Local model served by Ollama's `/api/chat` endpoint.
pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: model.unwrap_or_else(|| "llama3.1".to_string()),
            client: reqwest::Client::new(),
        }
    }

    /// Tool results carry `tool_name`, resolved from the assistant turn that
    /// issued the call with the same id.
    fn to_api_messages(messages: &[Message]) -> Vec<Value> {
        let mut call_names: HashMap<&str, &str> = HashMap::new();
        messages
            .iter()
            .map(|m| {
                let mut msg = json!({
                    "role": m.role.clone(),
                    "content": m.content.clone(),
                });
                if !m.tool_calls.is_empty() {
                    for call in &m.tool_calls {
                        call_names.insert(call.id.as_str(), call.name.as_str());
                    }
                    msg["tool_calls"] = m
                        .tool_calls
                        .iter()
                        .map(|c| json!({"function": {"name": c.name, "arguments": c.arguments}}))
                        .collect();
                }
                if let Some(name) = m.tool_call_id.as_deref().and_then(|id| call_names.get(id)) {
                    msg["tool_name"] = json!(name);
                }
                msg
            })
            .collect()
    }

    async fn chat(&self, request: Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            anyhow::bail!("Ollama error {}: {}", status, body);
        }

        let body: Value = response.json().await?;
        if body["message"].is_null() {
            return Err(anyhow!("Invalid Ollama response"));
        }
        Ok(body["message"].clone())
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn complete(&self, messages: Vec<Message>, tools: &[ToolSpec]) -> Result<Completion> {
        let mut request = json!({
            "model": self.model,
            "messages": Self::to_api_messages(&messages),
            "stream": false,
        });
        if !tools.is_empty() {
            request["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
        }

        let message = self.chat(request).await?;
        let tool_calls = message["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|c| {
                        let name = c["function"]["name"].as_str()?;
                        Some(ToolCallRequest::new(name, c["function"]["arguments"].clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Completion {
            text: message["content"].as_str().unwrap_or_default().to_string(),
            tool_calls,
        })
    }

    async fn complete_structured(&self, messages: Vec<Message>, schema: &Value) -> Result<Value> {
        let message = self
            .chat(json!({
                "model": self.model,
                "messages": Self::to_api_messages(&messages),
                "stream": false,
                "format": schema,
            }))
            .await?;
        let content = message["content"]
            .as_str()
            .ok_or_else(|| anyhow!("Invalid Ollama response"))?;
        Ok(serde_json::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_provider_creation() {
        let provider = OllamaProvider::new(None, Some("llama3.1".to_string()));
        assert_eq!(provider.model, "llama3.1");
        assert_eq!(provider.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_tool_calls_forwarded_as_objects() {
        let call = ToolCallRequest::new("go_to", json!({"x": 1, "y": 64, "z": 2}));
        let msgs = OllamaProvider::to_api_messages(&[Message::assistant_with_tools("", vec![call])]);
        assert_eq!(msgs[0]["tool_calls"][0]["function"]["name"], "go_to");
        assert_eq!(msgs[0]["tool_calls"][0]["function"]["arguments"]["y"], 64);
    }

    #[test]
    fn test_tool_results_name_their_tool() {
        let call = ToolCallRequest::new("get_status", json!({}));
        let id = call.id.clone();
        let msgs = OllamaProvider::to_api_messages(&[
            Message::assistant_with_tools("", vec![call]),
            Message::tool(id, "health: 20/20"),
            Message::tool("call_unknown", "orphan"),
        ]);
        assert_eq!(msgs[1]["role"], "tool");
        assert_eq!(msgs[1]["tool_name"], "get_status");
        assert!(msgs[2].get("tool_name").is_none());
    }
}
