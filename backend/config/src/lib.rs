//! `chatrelay-config`: ChatRelay runtime configuration.
//!
//! Provides:
//! - Typed config schema with defaults for every field
//! - YAML loading from `~/.chatrelay/config.yaml` or an explicit path
//! - `${ENV_VAR}` substitution and deployment env overrides
//! - Validation with path-tagged errors and warnings
//! - Redaction for safe display

pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use env::{
    apply_env_overrides, apply_env_overrides_with, resolve_env_vars, resolve_env_vars_with,
    MissingEnvVarError,
};
pub use io::{config_dir, config_file_path, default_db_path, load_raw_config};
pub use redact::redact;
pub use schema::{
    ConversationConfig, LlmConfig, LoggingConfig, RelayConfig, ServerConfig, StorageBackend,
    StorageConfig, TwilioSection,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Load, substitute env vars, apply overrides and validate, without failing
/// on validation errors.
pub async fn load_config(path: &Path) -> Result<(RelayConfig, ValidationReport)> {
    let raw = load_raw_config(path).await?;
    let value = resolve_env_vars(&raw).context("Failed to resolve env vars in config")?;

    let mut config: RelayConfig =
        serde_json::from_value(value).context("Failed to deserialize config")?;
    apply_env_overrides(&mut config)?;

    let report = validate(&config);
    Ok((config, report))
}

/// Log warnings and errors from a report; fails if it holds any error.
pub fn log_report(report: &ValidationReport) -> Result<()> {
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if let Some(first) = report.errors.first() {
        bail!(
            "invalid configuration ({} error(s)); first: {}",
            report.errors.len(),
            first
        );
    }
    Ok(())
}

/// Redacted JSON snapshot of a config.
pub fn redacted_snapshot(config: &RelayConfig) -> Result<serde_json::Value> {
    let value = serde_json::to_value(config).context("Failed to serialize config")?;
    Ok(redact(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_config_substitutes_and_types_values() {
        std::env::set_var("CHATRELAY_TEST_PROMPT", "Be brief.");
        let path = std::env::temp_dir().join(format!("chatrelay-lib-{}.yaml", std::process::id()));
        tokio::fs::write(
            &path,
            "conversation:\n  history_window_size: 4\n  system_prompt: \"${CHATRELAY_TEST_PROMPT}\"\nllm:\n  provider: mock\n",
        )
        .await
        .unwrap();

        let (config, report) = load_config(&path).await.unwrap();
        let _ = tokio::fs::remove_file(&path).await;

        assert_eq!(config.conversation.history_window_size, 4);
        assert_eq!(config.conversation.system_prompt, "Be brief.");
        assert!(!report.errors.iter().any(|e| e.path.starts_with("llm")));
    }

    #[test]
    fn log_report_fails_on_errors_only() {
        let mut report = ValidationReport::default();
        report.warnings.push(ConfigValidationError {
            path: "twilio.dry_run".into(),
            message: "dry run".into(),
        });
        assert!(log_report(&report).is_ok());
        report.errors.push(ConfigValidationError {
            path: "llm.model".into(),
            message: "empty".into(),
        });
        assert!(log_report(&report).is_err());
    }

    #[test]
    fn snapshot_hides_tokens() {
        let mut config = RelayConfig::default();
        config.twilio.auth_token = "supersecrettoken".into();
        let snapshot = redacted_snapshot(&config).unwrap();
        assert_eq!(snapshot["twilio"]["auth_token"], "supe***");
        assert_eq!(snapshot["server"]["port"], 3000);
    }
}
