use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content.into())
    }

    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls,
            ..Self::plain("assistant", content.into())
        }
    }

    /// Observation produced by executing the tool call `id`.
    pub fn tool(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(id.into()),
            ..Self::plain("tool", content.into())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
        }
    }
}

/// Tool description offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            text: String::new(),
            tool_calls: vec![ToolCallRequest::new(name, arguments)],
        }
    }

    pub fn with_tool_call(mut self, name: impl Into<String>, arguments: Value) -> Self {
        self.tool_calls.push(ToolCallRequest::new(name, arguments));
        self
    }
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, messages: Vec<Message>, tools: &[ToolSpec]) -> Result<Completion>;

    /// Completion constrained to a JSON object matching `schema`.
    ///
    /// Providers without native structured output fall back to instructing
    /// the model and extracting the first JSON object from its text.
    async fn complete_structured(&self, mut messages: Vec<Message>, schema: &Value) -> Result<Value> {
        messages.push(Message::user(format!(
            "Respond with a single JSON object matching this schema and nothing else:\n{}",
            schema
        )));
        let completion = self.complete(messages, &[]).await?;
        extract_json(&completion.text)
    }
}

/// Pull the outermost JSON object out of free-form model text.
pub fn extract_json(text: &str) -> Result<Value> {
    let start = text
        .find('{')
        .ok_or_else(|| anyhow!("no JSON object in response"))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| anyhow!("no JSON object in response"))?;
    if end < start {
        anyhow::bail!("no JSON object in response");
    }
    Ok(serde_json::from_str(&text[start..=end])?)
}

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: "claude-3-5-sonnet-20240620".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    fn to_api_messages(messages: Vec<Message>) -> (Option<String>, Vec<Value>) {
        let mut system = None;
        let mut api_messages: Vec<Value> = Vec::new();

        for m in messages {
            match m.role.as_str() {
                "system" => system = Some(m.content),
                "tool" => {
                    let block = json!({
                        "type": "tool_result",
                        "tool_use_id": m.tool_call_id.unwrap_or_default(),
                        "content": m.content,
                    });
                    // Results for one assistant turn travel in a single user message.
                    let merged = api_messages.last_mut().and_then(|last| {
                        let is_results = last["role"] == "user"
                            && last["content"]
                                .as_array()
                                .map(|blocks| blocks.iter().all(|b| b["type"] == "tool_result"))
                                .unwrap_or(false);
                        if is_results {
                            last["content"].as_array_mut()
                        } else {
                            None
                        }
                    });
                    match merged {
                        Some(blocks) => blocks.push(block),
                        None => api_messages.push(json!({"role": "user", "content": [block]})),
                    }
                }
                "assistant" if !m.tool_calls.is_empty() => {
                    let mut blocks = Vec::new();
                    if !m.content.is_empty() {
                        blocks.push(json!({"type": "text", "text": m.content}));
                    }
                    for call in m.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.arguments,
                        }));
                    }
                    api_messages.push(json!({"role": "assistant", "content": blocks}));
                }
                role => api_messages.push(json!({"role": role, "content": m.content})),
            }
        }

        (system, api_messages)
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn complete(&self, messages: Vec<Message>, tools: &[ToolSpec]) -> Result<Completion> {
        let (system, api_messages) = Self::to_api_messages(messages);

        let mut request = json!({
            "model": self.model,
            "messages": api_messages,
            "max_tokens": 4096,
        });
        if let Some(system) = system {
            request["system"] = json!(system);
        }
        if !tools.is_empty() {
            request["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
        }

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            anyhow::bail!("Anthropic API error {}: {}", status, body);
        }

        let result: Value = response.json().await?;
        let blocks = result["content"]
            .as_array()
            .ok_or_else(|| anyhow!("No content in response"))?;

        let mut completion = Completion::default();
        for block in blocks {
            match block["type"].as_str() {
                Some("text") => completion
                    .text
                    .push_str(block["text"].as_str().unwrap_or_default()),
                Some("tool_use") => completion.tool_calls.push(ToolCallRequest {
                    id: block["id"].as_str().unwrap_or_default().to_string(),
                    name: block["name"].as_str().unwrap_or_default().to_string(),
                    arguments: block["input"].clone(),
                }),
                _ => {}
            }
        }
        Ok(completion)
    }
}

#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAIToolCall>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    id: String,
    function: OpenAIFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunction {
    name: String,
    arguments: String,
}

impl OpenAIProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Point at any OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn to_api_messages(messages: Vec<Message>) -> Vec<Value> {
        messages
            .into_iter()
            .map(|m| {
                let mut msg = json!({"role": m.role, "content": m.content});
                if !m.tool_calls.is_empty() {
                    msg["tool_calls"] = m
                        .tool_calls
                        .iter()
                        .map(|c| {
                            json!({
                                "id": c.id,
                                "type": "function",
                                "function": {"name": c.name, "arguments": c.arguments.to_string()},
                            })
                        })
                        .collect();
                }
                if let Some(id) = m.tool_call_id {
                    msg["tool_call_id"] = json!(id);
                }
                msg
            })
            .collect()
    }

    async fn send(&self, request: Value) -> Result<OpenAIMessage> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            anyhow::bail!("OpenAI API error {}: {}", status, body);
        }

        let result: OpenAIResponse = response.json().await?;
        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| anyhow!("No choices in response"))
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn complete(&self, messages: Vec<Message>, tools: &[ToolSpec]) -> Result<Completion> {
        let mut request = json!({
            "model": self.model,
            "messages": Self::to_api_messages(messages),
            "max_tokens": 4096,
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

        let message = self.send(request).await?;
        let tool_calls = message
            .tool_calls
            .into_iter()
            .map(|c| ToolCallRequest {
                id: c.id,
                name: c.function.name,
                arguments: serde_json::from_str(&c.function.arguments).unwrap_or(Value::Null),
            })
            .collect();

        Ok(Completion {
            text: message.content.unwrap_or_default(),
            tool_calls,
        })
    }

    async fn complete_structured(&self, messages: Vec<Message>, schema: &Value) -> Result<Value> {
        let request = json!({
            "model": self.model,
            "messages": Self::to_api_messages(messages),
            "max_tokens": 256,
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": "decision", "schema": schema, "strict": true},
            },
        });
        let message = self.send(request).await?;
        let text = message
            .content
            .ok_or_else(|| anyhow!("No content in structured response"))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Scripted provider for tests and offline runs.
///
/// Returns queued completions in order, then repeats the fallback.
pub struct MockLLMProvider {
    script: Mutex<VecDeque<Completion>>,
    fallback: Completion,
    structured: Option<Value>,
    delay: Duration,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl MockLLMProvider {
    pub fn new() -> Self {
        Self::with_response("Done.".to_string())
    }

    pub fn with_response(response: String) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Completion::text(response),
            structured: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(script: Vec<Completion>, fallback: Completion) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            ..Self::new()
        }
    }

    pub fn with_structured(mut self, value: Value) -> Self {
        self.structured = Some(value);
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Message lists received so far, one entry per call.
    pub fn seen_messages(&self) -> Vec<Vec<Message>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for MockLLMProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMProvider for MockLLMProvider {
    async fn complete(&self, messages: Vec<Message>, _tools: &[ToolSpec]) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self
            .script
            .lock()
            .map_err(|_| anyhow!("mock script lock poisoned"))?
            .pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }

    async fn complete_structured(&self, messages: Vec<Message>, _schema: &Value) -> Result<Value> {
        match &self.structured {
            Some(value) => {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                Ok(value.clone())
            }
            None => {
                let completion = self.complete(messages, &[]).await?;
                extract_json(&completion.text)
            }
        }
    }
}
