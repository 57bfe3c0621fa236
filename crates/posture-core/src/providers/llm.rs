//! Chat-completion provider boundary. One trait, one production client;
//! tests script their own implementations.

use async_trait::async_trait;
use serde_json::json;

use crate::errors::CallError;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
    pub model: String,
    pub tokens_prompt: i64,
    pub tokens_completion: i64,
    pub finish_reason: Option<String>,
}

/// A chat-completion backend. The request is a single user message with
/// JSON-mode output; no streaming.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, api_key: &str, req: &ChatRequest)
        -> Result<ChatResponse, CallError>;

    fn provider_name(&self) -> &'static str;
}

pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(timeout: std::time::Duration) -> Self {
        Self::with_base_url("https://api.openai.com/v1", timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn complete(
        &self,
        api_key: &str,
        req: &ChatRequest,
    ) -> Result<ChatResponse, CallError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = json!({
            "model": req.model,
            "messages": [{ "role": "user", "content": req.prompt }],
            "response_format": { "type": "json_object" },
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallError::Timeout { seconds: 0 }
                } else {
                    CallError::Network {
                        detail: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CallError::from_status(status.as_u16(), text));
        }

        let payload: serde_json::Value = resp.json().await.map_err(|e| CallError::MalformedJson {
            detail: e.to_string(),
        })?;

        let text = payload
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CallError::MalformedJson {
                detail: "response missing choices[0].message.content".into(),
            })?
            .to_string();

        Ok(ChatResponse {
            text,
            model: payload
                .get("model")
                .and_then(|v| v.as_str())
                .unwrap_or(&req.model)
                .to_string(),
            tokens_prompt: payload
                .pointer("/usage/prompt_tokens")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(0),
            tokens_completion: payload
                .pointer("/usage/completion_tokens")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(0),
            finish_reason: payload
                .pointer("/choices/0/finish_reason")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
