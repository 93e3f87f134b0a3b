/// WhatsApp inbound adapter for Twilio's messaging webhook.
///
/// Twilio posts `application/x-www-form-urlencoded` callbacks carrying
/// `From` (e.g. `whatsapp:+15551234567`) and `Body`. Each callback is
/// verified against `X-Twilio-Signature`, acknowledged immediately with an
/// empty TwiML response, and forwarded on the inbound channel for processing.
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use axum::{
    Form, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::post,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::{ChannelAdapter, InboundMessage};

const EMPTY_TWIML: &str = "<Response></Response>";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct WhatsAppWebhookConfig {
    /// Twilio auth token, the HMAC key for request signatures.
    pub auth_token: String,
    /// Externally visible base URL, e.g. `https://relay.example.com`.
    pub public_url: String,
    /// Path the webhook is mounted at (default `/twilio`).
    pub webhook_path: String,
    pub verify_signature: bool,
}

impl WhatsAppWebhookConfig {
    /// The full URL Twilio signs: the one configured in the Twilio console.
    pub fn signed_url(&self) -> String {
        format!(
            "{}{}",
            self.public_url.trim_end_matches('/'),
            self.webhook_path
        )
    }
}

// ---------------------------------------------------------------------------
// Axum state
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    config: WhatsAppWebhookConfig,
    inbound_tx: mpsc::Sender<InboundMessage>,
}

// ---------------------------------------------------------------------------
// Adapter struct
// ---------------------------------------------------------------------------

pub struct WhatsAppAdapter {
    config: WhatsAppWebhookConfig,
    inbound_tx: mpsc::Sender<InboundMessage>,
}

impl WhatsAppAdapter {
    pub fn new(config: WhatsAppWebhookConfig, inbound_tx: mpsc::Sender<InboundMessage>) -> Self {
        Self { config, inbound_tx }
    }
}

#[async_trait]
impl ChannelAdapter for WhatsAppAdapter {
    fn name(&self) -> &str {
        "whatsapp"
    }

    fn build_router(&self) -> Router {
        let state = AppState {
            config: self.config.clone(),
            inbound_tx: self.inbound_tx.clone(),
        };
        Router::new()
            .route(&self.config.webhook_path, post(handle_twilio_webhook))
            .with_state(state)
    }

    async fn start(&self) -> anyhow::Result<()> {
        if !self.config.verify_signature {
            warn!("[WhatsApp] Signature verification is disabled");
        }
        info!(
            path = %self.config.webhook_path,
            "[WhatsApp] Adapter ready (webhook-based)"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Webhook handler
// ---------------------------------------------------------------------------

async fn handle_twilio_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    // 1. Verify the Twilio signature
    if state.config.verify_signature {
        let signature = headers
            .get("x-twilio-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_twilio_signature(
            &state.config.auth_token,
            &state.config.signed_url(),
            &params,
            signature,
        ) {
            warn!("[WhatsApp] Invalid signature, rejecting webhook");
            return (StatusCode::FORBIDDEN, "invalid signature").into_response();
        }
    }

    // 2. Extract sender and text
    let Some(from) = params.get("From").filter(|f| !f.trim().is_empty()) else {
        warn!("[WhatsApp] Callback without a From field");
        return (StatusCode::BAD_REQUEST, "missing From").into_response();
    };
    let text = params.get("Body").cloned().unwrap_or_default();

    info!(chars = text.chars().count(), "[WhatsApp] Inbound message received");

    // 3. Hand off and acknowledge immediately
    let inbound = InboundMessage {
        from: from.clone(),
        text,
    };
    if let Err(e) = state.inbound_tx.send(inbound).await {
        error!("[WhatsApp] Inbound pipeline closed: {}", e);
        return (StatusCode::SERVICE_UNAVAILABLE, "unavailable").into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        EMPTY_TWIML,
    )
        .into_response()
}

/// Compute Twilio's request signature: base64(HMAC-SHA1(auth_token, url +
/// each POST parameter name and value, sorted by name)).
pub fn twilio_signature(auth_token: &str, url: &str, params: &HashMap<String, String>) -> String {
    signing_mac(auth_token, url, params)
        .map(|mac| STANDARD.encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

/// Verify an `X-Twilio-Signature` header value in constant time.
pub fn verify_twilio_signature(
    auth_token: &str,
    url: &str,
    params: &HashMap<String, String>,
    signature: &str,
) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    match signing_mac(auth_token, url, params) {
        Some(mac) => mac.verify_slice(&expected).is_ok(),
        None => false,
    }
}

fn signing_mac(
    auth_token: &str,
    url: &str,
    params: &HashMap<String, String>,
) -> Option<Hmac<Sha1>> {
    let mut mac = Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(signing_payload(url, params).as_bytes());
    Some(mac)
}

fn signing_payload(url: &str, params: &HashMap<String, String>) -> String {
    let sorted: BTreeMap<&str, &str> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let mut payload = url.to_string();
    for (key, value) in sorted {
        payload.push_str(key);
        payload.push_str(value);
    }
    payload
}
