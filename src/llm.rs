//! Model endpoint client.
//!
//! [`ModelClient`] is the narrow seam between responders and the language
//! model. The shipped implementation talks to Ollama's chat API:
//!
//! ```text
//! POST {host}/api/chat
//! { "model": "...", "messages": [...], "tools": [...], "stream": false }
//!   → { "message": { "role": "assistant", "content": "...",
//!                    "tool_calls": [{ "function": { "name", "arguments" } }] } }
//! ```
//!
//! No timeout is applied unless `[model].timeout_secs` is set.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::ModelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on `Role::Tool` messages: which tool produced the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool_result(tool: &str, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool.to_string()),
            ..Self::new(Role::Tool, content)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl FunctionCall {
    /// Arguments as a JSON object. Some models send them as an encoded string.
    pub fn arguments_object(&self) -> Value {
        match &self.arguments {
            Value::String(s) => serde_json::from_str(s).unwrap_or(Value::Null),
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        }
    }
}

/// A callable tool advertised to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    fn to_wire(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// One non-streaming completion. Returns the assistant message.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage>;
}

// ============ Ollama ============

pub struct OllamaChatClient {
    host: String,
    client: reqwest::Client,
}

impl OllamaChatClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            host: config.host.trim_end_matches('/').to_string(),
            client: builder.build()?,
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl ModelClient for OllamaChatClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage> {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "stream": false,
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(ToolSpec::to_wire).collect());
        }
        debug!(model = %request.model, messages = request.messages.len(), tools = request.tools.len(), "chat request");

        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Ollama connection error (is Ollama running at {}?)",
                    self.host
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Ollama chat error {}: {}", status, text);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Invalid Ollama chat response")?;
        if let Some(err) = parsed.error {
            bail!("Ollama chat error: {}", err);
        }
        parsed
            .message
            .ok_or_else(|| anyhow!("Invalid Ollama chat response: missing message"))
    }
}
