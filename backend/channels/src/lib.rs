use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod mock;
pub mod twilio_client;
pub mod whatsapp;

pub use mock::MockSender;
pub use twilio_client::{TwilioConfig, TwilioWhatsAppSender};
pub use whatsapp::{WhatsAppAdapter, WhatsAppWebhookConfig};

/// An inbound chat message that has passed webhook verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Stable sender address, used as the conversation id.
    pub from: String,
    pub text: String,
}

/// All inbound channel adapters implement this trait.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Human-readable adapter name for logging.
    fn name(&self) -> &str;

    /// Build an Axum sub-router for inbound webhook endpoints.
    fn build_router(&self) -> axum::Router {
        axum::Router::new()
    }

    /// Start any background work the adapter needs.
    async fn start(&self) -> anyhow::Result<()>;
}

/// Outbound delivery of a reply to a sender.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver `body` to `to`. An `Err` means the message was not delivered.
    async fn send(&self, to: &str, body: &str) -> anyhow::Result<()>;
}
