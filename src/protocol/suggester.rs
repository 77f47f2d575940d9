// src/protocol/suggester.rs

use crate::capture::EncodedImage;
use crate::config::{ApiConfig, Config};
use crate::llm::{ChatClient, LlmError};
use crate::protocol::RawAction;
use crate::protocol::prompt::vision_messages;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const REQUIRED_FIELDS: [&str; 4] = ["action", "parameters", "reasoning", "confidence"];

#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("no JSON object in reply")]
    NoJson,
    #[error("reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("reply is missing fields: {0:?}")]
    MissingFields(Vec<&'static str>),
}

/// Asks a vision model for the next action. Owns its own retry policy.
pub trait VisionSuggester {
    fn next_action(
        &mut self,
        image: &EncodedImage,
        task: &str,
        context: &str,
        max_retries: u32,
    ) -> Option<RawAction>;

    /// Successful requests so far.
    fn request_count(&self) -> u64;
}

pub struct GroqSuggester {
    client: ChatClient,
    request_count: u64,
    retry_pause: Duration,
    error_pause: Duration,
}

impl GroqSuggester {
    pub fn new(config: &ApiConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: ChatClient::new(config)?,
            request_count: 0,
            retry_pause: Duration::from_secs(1),
            error_pause: Duration::from_secs(2),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        Self::new(&config.api)
    }

    pub fn model(&self) -> &str {
        &self.client.model
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_configured()
    }
}

impl VisionSuggester for GroqSuggester {
    fn next_action(
        &mut self,
        image: &EncodedImage,
        task: &str,
        context: &str,
        max_retries: u32,
    ) -> Option<RawAction> {
        let messages = vision_messages(image, task, context);
        let attempts = max_retries.max(1);

        for attempt in 1..=attempts {
            info!("requesting next action (attempt {}/{})", attempt, attempts);
            match self.client.complete(&messages) {
                Ok(content) => match parse_action_response(&content) {
                    Ok(action) => {
                        self.request_count += 1;
                        return Some(action);
                    }
                    Err(e) => {
                        warn!("attempt {} unusable: {} [reply]: {}", attempt, e, content);
                        if attempt < attempts {
                            thread::sleep(self.retry_pause);
                        }
                    }
                },
                Err(e) => {
                    error!("API request failed (attempt {}): {}", attempt, e);
                    if attempt < attempts {
                        thread::sleep(self.error_pause);
                    }
                }
            }
        }

        error!("all {} attempts failed", attempts);
        None
    }

    fn request_count(&self) -> u64 {
        self.request_count
    }
}

fn json_block() -> &'static Regex {
    static BLOCK: OnceLock<Regex> = OnceLock::new();
    BLOCK.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static regex"))
}

/// Parses a model reply into a [`RawAction`], tolerating prose around the JSON.
/// Only the reply schema is checked here; action policy belongs to the validator.
pub fn parse_action_response(content: &str) -> Result<RawAction, SuggestError> {
    let value: Value = match serde_json::from_str(content.trim()) {
        Ok(value) => value,
        Err(_) => {
            let block = json_block()
                .find(content)
                .map(|m| m.as_str())
                .ok_or(SuggestError::NoJson)?;
            serde_json::from_str(block)?
        }
    };

    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| value.get(field).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(SuggestError::MissingFields(missing));
    }

    let mut action: RawAction = serde_json::from_value(value)?;
    action.is_critical.get_or_insert(false);

    info!(
        "parsed action: {} (confidence: {})",
        action.action.as_deref().unwrap_or("?"),
        action.confidence.unwrap_or_default()
    );
    debug!("reasoning: {}", action.reasoning.as_deref().unwrap_or(""));
    Ok(action)
}
