// src/llm/mod.rs

use crate::config::ApiConfig;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("response missing choices[0].message.content")]
    MalformedResponse,
}

/// Blocking client for an OpenAI-compatible chat-completions endpoint.
pub struct ChatClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    pub model: String,
    temperature: f64,
    max_tokens: u32,
}

impl ChatClient {
    pub fn new(config: &ApiConfig) -> Result<Self, LlmError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn payload(&self, messages: &[Value]) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "top_p": 1,
            "stream": false
        })
    }

    /// Sends one completion request and returns the assistant message text.
    pub fn complete(&self, messages: &[Value]) -> Result<String, LlmError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(messages))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            error!("response status {}: {}", status, body);
            return Err(LlmError::Status { status, body });
        }

        let body: Value = response.json()?;
        let content = extract_content(&body).ok_or(LlmError::MalformedResponse)?;
        debug!("model reply: {}", content);
        Ok(content)
    }
}

pub fn extract_content(body: &Value) -> Option<String> {
    body.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|c| c.to_string())
}
