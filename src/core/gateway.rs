//! Gateway Client for an OpenAI-compatible chat-completion endpoint
//!
//! `complete` never fails: without a key it answers in local test mode,
//! and every upstream failure becomes one of `FALLBACK_RESPONSES`.
//! One request per call, no retries.

use std::time::Duration;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::GatewayError;
use crate::types::{ConversationTurn, Speaker};
use crate::{
    CONNECT_TIMEOUT_SECS, DEFAULT_GATEWAY_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    DEFAULT_TEMPERATURE, HISTORY_TURNS, LOCAL_PREVIEW_CHARS, REQUEST_TIMEOUT_SECS,
};

/// Canned replies used when the gateway cannot answer
pub const FALLBACK_RESPONSES: [&str; 4] = [
    "我需要时间思考你说的话...",
    "这是个有趣的观点，让我想想...",
    "你的话让我陷入了沉思。",
    "我感觉需要更多时间来理解你的意思。",
];

/// Prefix of every local test mode reply
pub const LOCAL_MODE_PREFIX: &str = "本地测试模式：AI回复模拟 - ";

/// Gateway connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Force local test mode even when a key is present
    pub local_mode: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            local_mode: false,
        }
    }
}

impl GatewayConfig {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Wire message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// LLM gateway client
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build tuned HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self { client, config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// True when calls actually go out over the network
    pub fn is_live(&self) -> bool {
        !self.config.local_mode && self.config.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Completion text, never an error
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        history: &[ConversationTurn],
    ) -> String {
        if !self.is_live() {
            debug!("gateway in local test mode");
            return local_test_reply(user_message);
        }

        match self.try_complete(system_prompt, user_message, history).await {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "gateway call failed, using fallback reply");
                fallback_response().to_string()
            }
        }
    }

    /// One completion call with the error exposed
    pub async fn try_complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        history: &[ConversationTurn],
    ) -> Result<String, GatewayError> {
        let api_key = match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() && !self.config.local_mode => key,
            _ => return Err(GatewayError::NoApiKey),
        };

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: build_messages(system_prompt, user_message, history),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status, message });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(GatewayError::EmptyCompletion);
        }
        Ok(text)
    }
}

/// system, last history turns, then the new user turn
pub fn build_messages(
    system_prompt: &str,
    user_message: &str,
    history: &[ConversationTurn],
) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(HISTORY_TURNS);
    let mut messages = Vec::with_capacity(history.len() - start + 2);

    messages.push(ChatMessage::new("system", system_prompt));
    for turn in &history[start..] {
        let role = match turn.speaker {
            Speaker::User => "user",
            Speaker::Npc => "assistant",
        };
        messages.push(ChatMessage::new(role, turn.text.clone()));
    }
    messages.push(ChatMessage::new("user", user_message));

    messages
}

/// Local test mode reply embedding the head of the message
pub fn local_test_reply(user_message: &str) -> String {
    let preview: String = user_message.chars().take(LOCAL_PREVIEW_CHARS).collect();
    format!("{}{}...", LOCAL_MODE_PREFIX, preview)
}

/// Random canned reply
pub fn fallback_response() -> &'static str {
    FALLBACK_RESPONSES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FALLBACK_RESPONSES[0])
}

// =============================================================================
// TESTS
// =============================================================================
