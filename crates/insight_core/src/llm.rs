//! Pluggable LLM backend. The pipeline depends only on [`LlmBackend`];
//! [`LlamaStackClient`] talks to a LlamaStack server through its
//! OpenAI-compatible endpoint.

use crate::error::LlmError;
use crate::history::ChatMessage;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "http://localhost:8321";
pub const DEFAULT_MODEL: &str = "ollama/llama3.3:70b";

/// Bounded wait per round-trip; expiry surfaces as an error, never a hang.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            model: DEFAULT_MODEL.into(),
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var("LLAMASTACK_API_URL") {
            cfg.api_url = url;
        }
        if let Ok(model) = std::env::var("LLAMASTACK_MODEL") {
            cfg.model = model;
        }
        cfg
    }
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError>;

    /// Minimal completion to verify the backend is reachable and answering.
    async fn probe(&self) -> bool {
        match self.chat_completion(&[ChatMessage::user("hi")], 0.0, 8).await {
            Ok(reply) => !reply.is_empty(),
            Err(err) => {
                debug!(error = %err, "LLM availability probe failed");
                false
            }
        }
    }
}

pub struct LlamaStackClient {
    cfg: LlmConfig,
    http: reqwest::Client,
}

impl LlamaStackClient {
    pub fn new(cfg: LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()?;
        Ok(Self { cfg, http })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/openai/v1/chat/completions",
            self.cfg.api_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl LlmBackend for LlamaStackClient {
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let body = json!({
            "model": self.cfg.model,
            "messages": messages
                .iter()
                .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
                .collect::<Vec<_>>(),
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        debug!(model = %self.cfg.model, n_messages = messages.len(), "sending chat completion");
        let resp = self.http.post(self.endpoint()).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Backend { status, body });
        }

        let v: serde_json::Value = resp.json().await?;
        v.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| LlmError::Malformed(v.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_strips_trailing_slash() {
        let client = LlamaStackClient::new(LlmConfig {
            api_url: "http://localhost:8321/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:8321/v1/openai/v1/chat/completions"
        );
    }
}
