//! Log Redaction Layer
//!
//! Scrubs phone numbers, API keys, and Twilio credentials from strings prior to logging.

use regex::Regex;
use std::sync::LazyLock;

static TELEPHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+\d{7,15}|(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}")
        .expect("valid phone regex")
});
static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(sk-[a-zA-Z0-9\-_]{20,})|(Bearer\s+[a-zA-Z0-9\-\._~+/]+=*)|(AC[0-9a-fA-F]{32})")
        .expect("valid token regex")
});

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    // Tokens first: SIDs and keys contain digit runs that look like phone numbers.
    let redacted = API_KEY_RE.replace_all(input, "[REDACTED_TOKEN]");
    TELEPHONE_RE
        .replace_all(&redacted, "[REDACTED_PHONE]")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redaction() {
        let raw = "Sending to +1-555-123-4567 with Bearer eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";
        let clean = redact_sensitive_data(raw);
        assert!(!clean.contains("+1-555-123-4567"));
        assert!(!clean.contains("Bearer eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9"));
    }

    #[test]
    fn test_whatsapp_address_redacted() {
        let clean = redact_sensitive_data("whatsapp:+447700900123");
        assert_eq!(clean, "whatsapp:[REDACTED_PHONE]");
    }

    #[test]
    fn test_twilio_sid_redacted() {
        let clean = redact_sensitive_data("account ACabcdef0123456789abcdef0123456789");
        assert_eq!(clean, "account [REDACTED_TOKEN]");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(redact_sensitive_data("see you at 5pm"), "see you at 5pm");
    }
}
