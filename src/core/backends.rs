//! LLM backends.
//!
//! Each backend wraps one third-party completion API behind [`LlmBackend`].
//! A backend only exists when its credential is configured; the assistant
//! iterates whatever was registered without knowing the concrete providers.

use crate::config::BackendSettings;
use crate::core::assistant::{Conversation, Role};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

pub const ANTHROPIC: &str = "anthropic";
pub const OPENAI: &str = "openai";

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Stable identifier, matched against the preferred-backend hint.
    fn id(&self) -> &str;

    /// Human readable name reported to clients.
    fn label(&self) -> &str;

    /// One bounded attempt. Never retries.
    async fn complete(&self, conversation: &Conversation) -> Result<Completion, BackendError>;
}

/// Maps a user-facing alias to a backend id.
pub fn normalize_backend_id(alias: &str) -> Option<&'static str> {
    match alias.trim().to_ascii_lowercase().as_str() {
        "anthropic" | "claude" => Some(ANTHROPIC),
        "openai" | "gpt" | "chatgpt" => Some(OPENAI),
        _ => None,
    }
}

async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl AnthropicBackend {
    pub fn new(
        client: Client,
        api_key: String,
        settings: &BackendSettings,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_owned(),
            model: settings.model.clone(),
            max_tokens,
            timeout,
        }
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    fn id(&self) -> &str {
        ANTHROPIC
    }

    fn label(&self) -> &str {
        "Claude (Anthropic)"
    }

    async fn complete(&self, conversation: &Conversation) -> Result<Completion, BackendError> {
        let messages: Vec<_> = conversation
            .messages
            .iter()
            .map(|m| json!({ "role": role_name(m.role), "content": m.content }))
            .collect();

        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": conversation.system,
            "messages": messages,
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .timeout(self.timeout)
            .header("x-api-key", self.api_key.as_str())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let parsed: AnthropicResponse = check(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        let content: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect();
        if content.trim().is_empty() {
            return Err(BackendError::Malformed("no text content".to_owned()));
        }

        Ok(Completion {
            content,
            usage: parsed
                .usage
                .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens)),
        })
    }
}

pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(
        client: Client,
        api_key: String,
        settings: &BackendSettings,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_owned(),
            model: settings.model.clone(),
            max_tokens,
            timeout,
        }
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: Option<u32>,
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn id(&self) -> &str {
        OPENAI
    }

    fn label(&self) -> &str {
        "GPT (OpenAI)"
    }

    async fn complete(&self, conversation: &Conversation) -> Result<Completion, BackendError> {
        let mut messages = Vec::with_capacity(conversation.messages.len() + 1);
        messages.push(json!({ "role": "system", "content": conversation.system }));
        messages.extend(
            conversation
                .messages
                .iter()
                .map(|m| json!({ "role": role_name(m.role), "content": m.content })),
        );

        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": messages,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let parsed: OpenAiResponse = check(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| BackendError::Malformed("no choices".to_owned()))?;

        Ok(Completion {
            content,
            usage: parsed.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                total_tokens: u
                    .total_tokens
                    .unwrap_or(u.prompt_tokens.saturating_add(u.completion_tokens)),
            }),
        })
    }
}
