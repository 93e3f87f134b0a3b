use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, Role};

/// Trait for completion services.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Send a completion request and return the response text.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;
}

/// One role-tagged turn of a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for ChatTurn {
    fn from(msg: &ChatMessage) -> Self {
        Self::new(msg.sender, msg.text.clone())
    }
}

/// Request to a completion service.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub system_prompt: String,
    /// Ordered turns, oldest first. Does not include the system prompt.
    pub turns: Vec<ChatTurn>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Response from a completion service.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub tokens_used: u64,
    pub latency_ms: u64,
}
