//! Config validation with path-tagged errors and warnings.

use crate::schema::RelayConfig;
use thiserror::Error;

const KNOWN_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "mock"];

#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// All errors and warnings found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

pub fn validate(config: &RelayConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_server(config, &mut report);
    validate_llm(config, &mut report);
    validate_conversation(config, &mut report);
    validate_twilio(config, &mut report);
    report
}

fn validate_server(config: &RelayConfig, report: &mut ValidationReport) {
    let server = &config.server;
    if server.port == 0 {
        report.error("server.port", "port must be > 0");
    } else if server.port < 1024 {
        report.warn(
            "server.port",
            format!("Port {} requires elevated privileges; consider a port >= 1024", server.port),
        );
    }
    if server.mailbox_idle_secs == 0 {
        report.error("server.mailbox_idle_secs", "mailbox_idle_secs must be >= 1");
    }
}

fn validate_llm(config: &RelayConfig, report: &mut ValidationReport) {
    let llm = &config.llm;
    if !KNOWN_PROVIDERS.contains(&llm.provider.as_str()) {
        report.error(
            "llm.provider",
            format!(
                "Unknown provider '{}'. Use one of: {}",
                llm.provider,
                KNOWN_PROVIDERS.join(", ")
            ),
        );
    }
    if matches!(llm.provider.as_str(), "openai" | "openrouter")
        && llm.api_key.as_deref().is_none_or(str::is_empty)
    {
        report.error("llm.api_key", "An api key is required for this provider");
    }
    if llm.model.trim().is_empty() {
        report.error("llm.model", "model cannot be empty");
    }
    if llm.timeout_secs == 0 {
        report.error("llm.timeout_secs", "timeout_secs must be >= 1");
    }
}

fn validate_conversation(config: &RelayConfig, report: &mut ValidationReport) {
    let conv = &config.conversation;
    if conv.history_window_size == 0 {
        report.error("conversation.history_window_size", "history_window_size must be >= 1");
    }
    if conv.summary_token_threshold == 0 {
        report.error(
            "conversation.summary_token_threshold",
            "summary_token_threshold must be >= 1",
        );
    }
    if conv.summary_max_tokens == 0 {
        report.error("conversation.summary_max_tokens", "summary_max_tokens must be >= 1");
    }
    if conv.completion_max_tokens == 0 {
        report.error("conversation.completion_max_tokens", "completion_max_tokens must be >= 1");
    }
    if !(0.0..=2.0).contains(&conv.completion_temperature) {
        report.error(
            "conversation.completion_temperature",
            "completion_temperature must be between 0.0 and 2.0",
        );
    }
    if conv.recent_messages_kept_after_summary >= conv.history_window_size {
        report.warn(
            "conversation.recent_messages_kept_after_summary",
            "Keeping at least the whole window after a summary makes summaries grow the prompt",
        );
    }
    if conv.fallback_reply.trim().is_empty() {
        report.error("conversation.fallback_reply", "fallback_reply cannot be empty");
    }
    if conv.system_prompt.trim().is_empty() {
        report.warn("conversation.system_prompt", "system_prompt is empty");
    }
}

fn validate_twilio(config: &RelayConfig, report: &mut ValidationReport) {
    let twilio = &config.twilio;
    if !twilio.webhook_path.starts_with('/') {
        report.error("twilio.webhook_path", "webhook_path must start with '/'");
    }
    if twilio.verify_signature && twilio.auth_token.is_empty() {
        report.error(
            "twilio.auth_token",
            "auth_token is required while verify_signature is enabled",
        );
    }
    if !twilio.verify_signature {
        report.warn("twilio.verify_signature", "Webhook signatures are not verified");
    }
    if twilio.dry_run {
        report.warn("twilio.dry_run", "Replies are logged, not sent");
        return;
    }
    if twilio.timeout_secs == 0 {
        report.error("twilio.timeout_secs", "timeout_secs must be >= 1");
    }
    if twilio.account_sid.is_empty() {
        report.error("twilio.account_sid", "account_sid is required to send replies");
    }
    if twilio.auth_token.is_empty() {
        report.error("twilio.auth_token", "auth_token is required to send replies");
    }
    if twilio.whatsapp_number.is_empty() {
        report.error("twilio.whatsapp_number", "whatsapp_number is required to send replies");
    }
}
