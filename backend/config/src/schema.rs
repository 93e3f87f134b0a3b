//! ChatRelay runtime configuration schema.
//!
//! Every section and field has a serde default, so a missing or partial
//! `config.yaml` still yields a runnable configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub conversation: ConversationConfig,
    pub twilio: TwilioSection,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Seconds a conversation worker waits for new messages before exiting.
    pub mailbox_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            mailbox_idle_secs: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Defaults to `<config dir>/chatrelay.db` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Completion service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `openai`, `openrouter`, `ollama` or `mock`.
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: None,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub history_window_size: usize,
    pub summary_token_threshold: usize,
    pub summary_max_tokens: u32,
    pub recent_messages_kept_after_summary: usize,
    pub system_prompt: String,
    pub completion_temperature: f32,
    pub completion_max_tokens: u32,
    pub incremental_summary: bool,
    pub fallback_reply: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_window_size: 10,
            summary_token_threshold: 2000,
            summary_max_tokens: 300,
            recent_messages_kept_after_summary: 3,
            system_prompt: "You are a helpful assistant replying over WhatsApp. \
                            Keep answers short and friendly."
                .to_string(),
            completion_temperature: 0.7,
            completion_max_tokens: 500,
            incremental_summary: false,
            fallback_reply: "AI response failed".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Twilio
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwilioSection {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender number, with or without the `whatsapp:` prefix.
    pub whatsapp_number: String,
    /// Public base URL Twilio calls; part of the signed payload.
    pub public_url: String,
    pub webhook_path: String,
    pub verify_signature: bool,
    /// Log replies instead of sending them.
    pub dry_run: bool,
    /// Per-request timeout for the Twilio REST API.
    pub timeout_secs: u64,
}

impl Default for TwilioSection {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            whatsapp_number: String::new(),
            public_url: "http://localhost:3000".to_string(),
            webhook_path: "/twilio".to_string(),
            verify_signature: true,
            dry_run: false,
            timeout_secs: 15,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for rolling NDJSON log files; console only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            json: false,
        }
    }
}
