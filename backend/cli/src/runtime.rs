//! Component wiring: turns a validated [`RelayConfig`] into live clients.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use chatrelay_agent::{ConversationOrchestrator, TurnSettings, WindowManager, WindowPolicy};
use chatrelay_channels::{MockSender, OutboundChannel, TwilioConfig, TwilioWhatsAppSender};
use chatrelay_config::{default_db_path, RelayConfig, StorageBackend};
use chatrelay_core::LlmProvider;
use chatrelay_memory::{HistoryStore, InMemoryHistoryStore, SqliteHistoryStore};
use chatrelay_providers::{create_provider, ProviderSettings};

pub fn db_path(config: &RelayConfig) -> PathBuf {
    config.storage.db_path.clone().unwrap_or_else(default_db_path)
}

pub fn open_sqlite(config: &RelayConfig) -> Result<SqliteHistoryStore> {
    let path = db_path(config);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
    }
    SqliteHistoryStore::open(&path)
        .with_context(|| format!("Failed to open history database: {}", path.display()))
}

pub fn open_store(config: &RelayConfig) -> Result<Arc<dyn HistoryStore>> {
    Ok(match config.storage.backend {
        StorageBackend::Sqlite => Arc::new(open_sqlite(config)?),
        StorageBackend::Memory => {
            info!("Using in-memory history; conversations are lost on restart");
            Arc::new(InMemoryHistoryStore::new())
        }
    })
}

pub fn build_provider(config: &RelayConfig) -> Result<Arc<dyn LlmProvider>> {
    let llm = &config.llm;
    let provider = create_provider(&ProviderSettings {
        kind: llm.provider.clone(),
        base_url: llm.base_url.clone(),
        api_key: llm.api_key.clone(),
        timeout: Some(Duration::from_secs(llm.timeout_secs)),
    })?;
    info!(provider = provider.name(), model = %llm.model, "Completion provider ready");
    Ok(provider)
}

pub fn build_sender(config: &RelayConfig) -> Result<Arc<dyn OutboundChannel>> {
    if config.twilio.dry_run {
        info!("Dry run: replies are logged, not sent");
        return Ok(Arc::new(MockSender::new()));
    }
    let twilio = &config.twilio;
    let sender = TwilioWhatsAppSender::new(
        TwilioConfig {
            account_sid: twilio.account_sid.clone(),
            auth_token: twilio.auth_token.clone(),
            whatsapp_number: twilio.whatsapp_number.clone(),
        },
        sender_timeout(config),
    )?;
    Ok(Arc::new(sender))
}

/// Delivery has its own budget, separate from the completion service.
pub fn sender_timeout(config: &RelayConfig) -> Duration {
    Duration::from_secs(config.twilio.timeout_secs)
}

pub fn window_policy(config: &RelayConfig) -> WindowPolicy {
    let conv = &config.conversation;
    WindowPolicy {
        summary_token_threshold: conv.summary_token_threshold,
        summary_max_tokens: conv.summary_max_tokens,
        keep_recent: conv.recent_messages_kept_after_summary,
        model: config.llm.model.clone(),
        incremental: conv.incremental_summary,
        ..WindowPolicy::default()
    }
}

pub fn turn_settings(config: &RelayConfig) -> TurnSettings {
    let conv = &config.conversation;
    TurnSettings {
        system_prompt: conv.system_prompt.clone(),
        model: config.llm.model.clone(),
        temperature: conv.completion_temperature,
        max_tokens: conv.completion_max_tokens,
        history_window_size: conv.history_window_size,
        fallback_reply: conv.fallback_reply.clone(),
    }
}

pub fn build_orchestrator(
    config: &RelayConfig,
    store: Arc<dyn HistoryStore>,
    provider: Arc<dyn LlmProvider>,
    outbound: Arc<dyn OutboundChannel>,
) -> ConversationOrchestrator {
    let window_manager = WindowManager::new(provider.clone(), store.clone(), window_policy(config));
    ConversationOrchestrator::new(store, window_manager, provider, outbound, turn_settings(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_values_flow_into_settings() {
        let mut config = RelayConfig::default();
        config.llm.model = "llama3".into();
        config.conversation.history_window_size = 6;
        config.conversation.recent_messages_kept_after_summary = 2;
        config.conversation.incremental_summary = true;
        config.conversation.fallback_reply = "sorry".into();

        let policy = window_policy(&config);
        assert_eq!(policy.keep_recent, 2);
        assert_eq!(policy.model, "llama3");
        assert!(policy.incremental);

        let settings = turn_settings(&config);
        assert_eq!(settings.history_window_size, 6);
        assert_eq!(settings.fallback_reply, "sorry");
    }

    #[test]
    fn dry_run_uses_mock_sender() {
        let mut config = RelayConfig::default();
        config.twilio.dry_run = true;
        assert_eq!(build_sender(&config).unwrap().name(), "mock");
    }

    #[test]
    fn sender_timeout_ignores_llm_timeout() {
        let mut config = RelayConfig::default();
        config.llm.timeout_secs = 120;
        config.twilio.timeout_secs = 10;
        assert_eq!(sender_timeout(&config), Duration::from_secs(10));
        assert_eq!(build_sender(&config).unwrap().name(), "twilio-whatsapp");
    }

    #[test]
    fn memory_backend_needs_no_files() {
        let mut config = RelayConfig::default();
        config.storage.backend = StorageBackend::Memory;
        assert!(open_store(&config).is_ok());
    }
}
