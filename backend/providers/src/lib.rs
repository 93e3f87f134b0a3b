//! Completion-service clients.
//!
//! Each provider implements [`chatrelay_core::LlmProvider`]; [`create_provider`]
//! picks one by name at startup.

pub mod mock;
pub mod ollama;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chatrelay_core::LlmProvider;

pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatProvider;

/// Connection settings for building a provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    /// One of `openai`, `openrouter`, `ollama`, `mock`.
    pub kind: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
}

/// Build the provider named by `settings.kind`.
pub fn create_provider(settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>> {
    let timeout = settings.timeout.unwrap_or(Duration::from_secs(60));
    let provider: Arc<dyn LlmProvider> = match settings.kind.as_str() {
        "openai" | "openrouter" => {
            let Some(api_key) = settings.api_key.as_deref().filter(|k| !k.is_empty()) else {
                bail!("provider '{}' requires an api key", settings.kind);
            };
            let default_url = if settings.kind == "openrouter" {
                openai::OPENROUTER_BASE_URL
            } else {
                openai::OPENAI_BASE_URL
            };
            let base_url = settings.base_url.as_deref().unwrap_or(default_url);
            Arc::new(
                OpenAiCompatProvider::new(settings.kind.clone(), api_key, timeout)?
                    .with_base_url(base_url),
            )
        }
        "ollama" => {
            let provider = OllamaProvider::new(timeout)?;
            match &settings.base_url {
                Some(url) => Arc::new(provider.with_base_url(url)),
                None => Arc::new(provider),
            }
        }
        "mock" => Arc::new(MockProvider::new("mock")),
        other => bail!("unknown completion provider '{other}'"),
    };
    Ok(provider)
}
