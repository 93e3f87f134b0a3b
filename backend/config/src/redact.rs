//! Config redaction: safe-to-print snapshots with secrets and phone numbers masked.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Field names whose values are always secrets.
static SECRET_KEYS: &[&str] = &[
    "api_key",
    "apiKey",
    "auth_token",
    "authToken",
    "token",
    "secret",
    "password",
];

/// A bare or `whatsapp:`-prefixed phone number.
static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(whatsapp:)?\+?[0-9]{10,15}$").expect("valid phone pattern"));

/// Redact a config value tree, keeping a short prefix as a hint.
pub fn redact(value: &Value) -> Value {
    redact_recursive(value, "")
}

fn is_secret_key(key: &str) -> bool {
    SECRET_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

fn mask(s: &str) -> String {
    let hint: String = s.chars().take(4).collect();
    if s.chars().count() > 4 {
        format!("{hint}***")
    } else {
        "***".to_string()
    }
}

fn redact_recursive(value: &Value, key: &str) -> Value {
    match value {
        Value::String(s) if !s.is_empty() && (is_secret_key(key) || PHONE_PATTERN.is_match(s)) => {
            Value::String(mask(s))
        }
        Value::Array(arr) => Value::Array(arr.iter().map(|v| redact_recursive(v, key)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), redact_recursive(v, k)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_secrets_by_key() {
        let v = json!({
            "llm": { "api_key": "sk-abcdef123456" },
            "twilio": { "auth_token": "0123456789abcdef", "account_sid": "AC42" }
        });
        let redacted = redact(&v);
        assert_eq!(redacted["llm"]["api_key"], "sk-a***");
        assert!(!redacted["twilio"]["auth_token"].as_str().unwrap().contains("abcdef"));
        assert_eq!(redacted["twilio"]["account_sid"], "AC42");
    }

    #[test]
    fn redacts_phone_numbers_anywhere() {
        let v = json!({ "twilio": { "whatsapp_number": "whatsapp:+14155238886" } });
        assert_eq!(redact(&v)["twilio"]["whatsapp_number"], "what***");
    }

    #[test]
    fn short_secret_is_fully_masked() {
        assert_eq!(redact(&json!({ "token": "abc" }))["token"], "***");
    }

    #[test]
    fn passthrough_non_sensitive() {
        let v = json!({ "logging": { "level": "debug" }, "server": { "port": 3000 } });
        assert_eq!(redact(&v), v);
    }
}
