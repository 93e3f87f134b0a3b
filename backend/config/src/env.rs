//! Environment handling for config values.
//!
//! Two mechanisms, applied in order at load time:
//! - `${VAR_NAME}` references inside YAML string values are substituted from
//!   the process environment (`$${VAR}` stays a literal `${VAR}`).
//! - Well-known deployment variables (`PORT`, `TWILIO_*`, ...) override the
//!   parsed fields directly.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use crate::schema::RelayConfig;

/// `${VAR}` with an optional leading `$` marking an escape.
static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?)\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern"));

#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute `${VAR}` references across a config value tree.
///
/// Fails if a referenced variable is unset or empty.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    substitute_value(value, &std::env::vars().collect(), "")
}

/// Same as [`resolve_env_vars`] with an explicit environment.
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    substitute_value(value, env, "")
}

fn substitute_value(value: &Value, env: &HashMap<String, String>, path: &str) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, env, path)?)),
        Value::Array(arr) => arr
            .iter()
            .enumerate()
            .map(|(i, v)| substitute_value(v, env, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (k, v) in map {
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                result.insert(k.clone(), substitute_value(v, env, &child_path)?);
            }
            Ok(Value::Object(result))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(s: &str, env: &HashMap<String, String>, path: &str) -> Result<String> {
    if !s.contains("${") {
        return Ok(s.to_string());
    }

    let mut missing: Option<MissingEnvVarError> = None;
    let substituted = ENV_VAR_PATTERN.replace_all(s, |caps: &regex::Captures| {
        let var_name = &caps[2];
        if !caps[1].is_empty() {
            return format!("${{{var_name}}}");
        }
        match env.get(var_name) {
            Some(val) if !val.is_empty() => val.clone(),
            _ => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: var_name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });

    if let Some(err) = missing {
        bail!(err);
    }
    Ok(substituted.into_owned())
}

// ---------------------------------------------------------------------------
// Deployment overrides
// ---------------------------------------------------------------------------

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut RelayConfig) -> Result<()> {
    apply_env_overrides_with(config, &std::env::vars().collect())
}

/// Apply overrides from an explicit environment. Empty values are ignored.
pub fn apply_env_overrides_with(
    config: &mut RelayConfig,
    env: &HashMap<String, String>,
) -> Result<()> {
    let get = |name: &str| env.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

    if let Some(port) = get("PORT") {
        config.server.port = match port.parse() {
            Ok(port) => port,
            Err(_) => bail!("PORT must be a number between 0 and 65535, got '{port}'"),
        };
    }
    if let Some(sid) = get("TWILIO_ACCOUNT_SID") {
        config.twilio.account_sid = sid.to_string();
    }
    if let Some(token) = get("TWILIO_AUTH_TOKEN") {
        config.twilio.auth_token = token.to_string();
    }
    if let Some(number) = get("TWILIO_WHATSAPP_NUMBER") {
        config.twilio.whatsapp_number = number.to_string();
    }
    if let Some(url) = get("PUBLIC_URL") {
        config.twilio.public_url = url.to_string();
    }
    if let Some(key) = get("OPENAI_API_KEY") {
        if config.llm.api_key.as_deref().is_none_or(str::is_empty) {
            config.llm.api_key = Some(key.to_string());
        }
    }
    if let Some(db) = get("CHATRELAY_DB") {
        config.storage.db_path = Some(PathBuf::from(db));
    }

    debug!("Applied environment overrides");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitutes_nested_var() {
        let v = json!({"llm": {"api_key": "${OPENAI_API_KEY}"}});
        let result = resolve_env_vars_with(&v, &env(&[("OPENAI_API_KEY", "sk-abc123")])).unwrap();
        assert_eq!(result["llm"]["api_key"], "sk-abc123");
    }

    #[test]
    fn substitutes_inside_larger_string() {
        let v = json!({"url": "https://${HOST}/twilio"});
        let result = resolve_env_vars_with(&v, &env(&[("HOST", "relay.example.com")])).unwrap();
        assert_eq!(result["url"], "https://relay.example.com/twilio");
    }

    #[test]
    fn error_names_missing_var_and_path() {
        let v = json!({"twilio": {"auth_token": "${MISSING_VAR}"}});
        let err = resolve_env_vars_with(&v, &HashMap::new()).unwrap_err().to_string();
        assert!(err.contains("MISSING_VAR"));
        assert!(err.contains("twilio.auth_token"));
    }

    #[test]
    fn escaped_reference_stays_literal() {
        let v = json!({"prompt": "say $${NAME}"});
        let result = resolve_env_vars_with(&v, &HashMap::new()).unwrap();
        assert_eq!(result["prompt"], "say ${NAME}");
    }

    #[test]
    fn overrides_replace_config_fields() {
        let mut cfg = RelayConfig::default();
        apply_env_overrides_with(
            &mut cfg,
            &env(&[
                ("PORT", "8081"),
                ("TWILIO_AUTH_TOKEN", "tok"),
                ("PUBLIC_URL", "https://relay.example.com"),
                ("OPENAI_API_KEY", "sk-env"),
                ("CHATRELAY_DB", "/tmp/relay.db"),
                ("TWILIO_ACCOUNT_SID", ""),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.server.port, 8081);
        assert_eq!(cfg.twilio.auth_token, "tok");
        assert_eq!(cfg.twilio.public_url, "https://relay.example.com");
        assert_eq!(cfg.llm.api_key.as_deref(), Some("sk-env"));
        assert_eq!(cfg.storage.db_path, Some(PathBuf::from("/tmp/relay.db")));
        assert!(cfg.twilio.account_sid.is_empty());
    }

    #[test]
    fn configured_api_key_wins_over_env() {
        let mut cfg = RelayConfig::default();
        cfg.llm.api_key = Some("sk-file".into());
        apply_env_overrides_with(&mut cfg, &env(&[("OPENAI_API_KEY", "sk-env")])).unwrap();
        assert_eq!(cfg.llm.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut cfg = RelayConfig::default();
        assert!(apply_env_overrides_with(&mut cfg, &env(&[("PORT", "http")])).is_err());
    }
}
