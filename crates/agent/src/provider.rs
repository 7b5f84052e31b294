//! The LLM provider seam and its OpenAI-compatible adapter.
//!
//! The platform only needs one capability from a model: JSON-mode chat
//! completion. Anything speaking the OpenAI chat-completions contract
//! (OpenAI, Azure, vLLM, Together, local gateways) works through
//! [`OpenAiCompatProvider`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use rv_domain::config::LlmConfig;
use rv_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A chat-completion model constrained to JSON output.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one completion and return the raw model text (expected to be
    /// a JSON document).
    async fn complete_json(&self, req: &ChatRequest) -> Result<String>;

    /// The model identifier this provider answers with.
    fn model(&self) -> &str;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OpenAI-compatible adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_retries: u32,
}

impl OpenAiCompatProvider {
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            max_retries: cfg.max_retries,
        })
    }

    fn body(&self, req: &ChatRequest) -> Value {
        serde_json::json!({
            "model": self.model,
            "messages": req.messages,
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
            "response_format": { "type": "json_object" },
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn complete_json(&self, req: &ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.body(req);
        let mut last_err = Error::Llm("no attempt made".into());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(200 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }

            let mut rb = self.http.post(&url).json(&body);
            if let Some(key) = &self.api_key {
                rb = rb.bearer_auth(key);
            }

            match rb.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_server_error() || status.as_u16() == 429 {
                        let text = resp.text().await.unwrap_or_default();
                        last_err = Error::Llm(format!("provider returned {status}: {text}"));
                        continue;
                    }
                    if !status.is_success() {
                        let text = resp.text().await.unwrap_or_default();
                        return Err(Error::Llm(format!("provider returned {status}: {text}")));
                    }
                    let json: Value = resp
                        .json()
                        .await
                        .map_err(|e| Error::Llm(format!("invalid provider response: {e}")))?;
                    let content = json["choices"][0]["message"]["content"]
                        .as_str()
                        .ok_or_else(|| Error::Llm("provider response has no content".into()))?;
                    return Ok(content.to_owned());
                }
                Err(e) if e.is_timeout() => {
                    last_err = Error::Timeout(format!("llm: {e}"));
                }
                Err(e) => {
                    last_err = Error::Llm(e.to_string());
                }
            }
        }

        Err(last_err)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
