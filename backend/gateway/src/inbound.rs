//! Inbound pump: verified webhook deliveries into the conversation mailbox.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use chatrelay_agent::ConversationMailbox;
use chatrelay_channels::InboundMessage;
use chatrelay_core::RelayError;
use chatrelay_logging::redact_sensitive_data;

/// Drain `rx` until every sender is dropped. Each message is queued on its
/// conversation's mailbox and its outcome logged from a detached task, so a
/// slow conversation never holds up the pump.
pub fn spawn_inbound_pump(
    mut rx: mpsc::Receiver<InboundMessage>,
    mailbox: ConversationMailbox,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Inbound pump started");
        while let Some(InboundMessage { from, text }) = rx.recv().await {
            let pending = mailbox.dispatch(&from, text).await;
            tokio::spawn(async move {
                let who = redact_sensitive_data(&from);
                match pending.await {
                    Ok(Ok(outcome)) => info!(
                        conversation = %who,
                        turn = %outcome.turn_id,
                        summarized = outcome.summarized,
                        fallback = outcome.fallback_used,
                        "Turn completed"
                    ),
                    Ok(Err(RelayError::EmptyMessage)) => {
                        debug!(conversation = %who, "Ignored empty message")
                    }
                    Ok(Err(e)) => warn!(conversation = %who, error = %e, "Turn failed"),
                    Err(_) => error!(conversation = %who, "Conversation worker dropped the turn"),
                }
            });
        }
        info!("Inbound pump stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chatrelay_agent::{ConversationOrchestrator, TurnSettings, WindowManager, WindowPolicy};
    use chatrelay_channels::MockSender;
    use chatrelay_memory::InMemoryHistoryStore;
    use chatrelay_providers::MockProvider;

    #[tokio::test]
    async fn test_pump_delivers_replies_and_stops_when_closed() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let provider = Arc::new(MockProvider::new("mock").with_response("Hi there!"));
        let sender = Arc::new(MockSender::new());
        let orchestrator = ConversationOrchestrator::new(
            store.clone(),
            WindowManager::new(provider.clone(), store.clone(), WindowPolicy::default()),
            provider,
            sender.clone(),
            TurnSettings::default(),
        );
        let mailbox = ConversationMailbox::new(Arc::new(orchestrator), Duration::from_secs(60));

        let (tx, rx) = mpsc::channel(8);
        let pump = spawn_inbound_pump(rx, mailbox);
        for (from, text) in [("whatsapp:+1555", "Hello"), ("whatsapp:+1666", "  ")] {
            tx.send(InboundMessage {
                from: from.into(),
                text: text.into(),
            })
            .await
            .unwrap();
        }
        drop(tx);
        pump.await.unwrap();

        for _ in 0..50 {
            if !sender.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            sender.sent(),
            vec![("whatsapp:+1555".to_string(), "Hi there!".to_string())]
        );
        assert_eq!(store.message_count("whatsapp:+1666"), 0);
    }
}
