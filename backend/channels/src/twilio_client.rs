/// Twilio REST client for outbound WhatsApp messages.
///
/// Required config:
///   account_sid      Twilio account SID (AC...)
///   auth_token       Twilio auth token, used for basic auth
///   whatsapp_number  the sandbox or business sender, e.g. `+14155238886`
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{error, info, warn};

use crate::OutboundChannel;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Twilio rejects WhatsApp bodies longer than this many characters.
pub const MAX_BODY_CHARS: usize = 1600;

#[derive(Clone, Debug)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub whatsapp_number: String,
}

pub struct TwilioWhatsAppSender {
    config: TwilioConfig,
    http_client: Client,
    api_base: String,
}

impl TwilioWhatsAppSender {
    pub fn new(config: TwilioConfig, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            http_client,
            api_base: TWILIO_API_BASE.to_string(),
        })
    }

    /// Point the sender at another Twilio-compatible API root.
    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.api_base, self.config.account_sid
        )
    }

    async fn send_chunk(&self, from: &str, to: &str, body: &str) -> Result<()> {
        let res = self
            .http_client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("From", from), ("To", to), ("Body", body)])
            .send()
            .await
            .context("Twilio HTTP request failed")?;

        if !res.status().is_success() {
            let status = res.status();
            let err = res.text().await.unwrap_or_default();
            error!("[WhatsApp] Twilio send failed: {} {}", status, err);
            anyhow::bail!("Twilio returned {}: {}", status, err);
        }
        Ok(())
    }
}

#[async_trait]
impl OutboundChannel for TwilioWhatsAppSender {
    fn name(&self) -> &str {
        "twilio-whatsapp"
    }

    /// Parts go out in order. A failure stops the send, but parts already
    /// accepted by Twilio stay delivered.
    async fn send(&self, to: &str, body: &str) -> Result<()> {
        let from = whatsapp_address(&self.config.whatsapp_number);
        let to = whatsapp_address(to);
        let chunks = split_body(body, MAX_BODY_CHARS);
        let parts = chunks.len();
        for (index, chunk) in chunks.iter().enumerate() {
            if let Err(e) = self.send_chunk(&from, &to, chunk).await {
                if index > 0 {
                    warn!(
                        failed_part = index + 1,
                        parts,
                        "[WhatsApp] Reply partially delivered"
                    );
                }
                anyhow::bail!("reply part {}/{} not sent: {:#}", index + 1, parts, e);
            }
        }
        info!(parts, "[WhatsApp] Reply sent");
        Ok(())
    }
}

/// Prefix a bare phone number with Twilio's `whatsapp:` channel marker.
pub fn whatsapp_address(number: &str) -> String {
    let number = number.trim();
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{number}")
    }
}

/// Split a reply into pieces of at most `max_chars` characters, preferring to
/// break after whitespace.
pub fn split_body(body: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    if chars.len() <= max_chars || max_chars == 0 {
        return vec![body.to_string()];
    }

    let mut parts = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let hard_end = (start + max_chars).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            chars[start..hard_end]
                .iter()
                .rposition(|c| c.is_whitespace())
                .map(|i| start + i + 1)
                .filter(|&e| e > start)
                .unwrap_or(hard_end)
        };
        parts.push(chars[start..end].iter().collect());
        start = end;
    }
    parts
}
