//! Conversation turn orchestration.
//!
//! One inbound message drives one strictly sequential turn:
//! store the user message, build the window, complete, deliver, then record
//! the assistant reply. Store failures abort the turn, completion failures
//! degrade to a fixed reply, and delivery failures are reported without
//! recording the undelivered reply.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use chatrelay_channels::OutboundChannel;
use chatrelay_core::{LlmProvider, RelayError, Role, TurnOutcome, TurnStage};
use chatrelay_logging::{TurnEvent, TurnEventLogger, redact_sensitive_data};
use chatrelay_memory::HistoryStore;

use crate::context_window::WindowManager;
use crate::system_prompt::PromptBuilder;

pub const DEFAULT_FALLBACK_REPLY: &str = "AI response failed";

/// Per-turn completion settings.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub system_prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Prior messages fetched as context, not counting the current one.
    pub history_window_size: usize,
    pub fallback_reply: String,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful assistant replying over WhatsApp. \
                            Keep answers short and friendly."
                .to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            history_window_size: 10,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }
}

pub struct ConversationOrchestrator {
    store: Arc<dyn HistoryStore>,
    window_manager: WindowManager,
    provider: Arc<dyn LlmProvider>,
    outbound: Arc<dyn OutboundChannel>,
    settings: TurnSettings,
}

/// Stage trail for one turn, mirrored to the turn event log.
struct TurnTrace<'a> {
    conversation_id: &'a str,
    turn_id: Uuid,
    stages: Vec<TurnStage>,
}

impl<'a> TurnTrace<'a> {
    fn new(conversation_id: &'a str) -> Self {
        Self {
            conversation_id,
            turn_id: Uuid::new_v4(),
            stages: Vec::with_capacity(6),
        }
    }

    fn mark(&mut self, stage: TurnStage) {
        TurnEventLogger::stage(self.conversation_id, self.turn_id, stage);
        self.stages.push(stage);
    }

    fn fail(&self, err: &RelayError) {
        TurnEventLogger::error(self.conversation_id, self.turn_id, err.to_string());
    }
}

impl ConversationOrchestrator {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        window_manager: WindowManager,
        provider: Arc<dyn LlmProvider>,
        outbound: Arc<dyn OutboundChannel>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            store,
            window_manager,
            provider,
            outbound,
            settings,
        }
    }

    /// Run one conversation turn for an inbound message.
    ///
    /// Returns the delivered reply, or the first fatal error: `EmptyMessage`,
    /// `StoreUnavailable`, or `SendFailed`.
    #[instrument(skip_all, fields(conversation = %redact_sensitive_data(conversation_id)))]
    pub async fn handle_inbound_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<TurnOutcome, RelayError> {
        let mut trace = TurnTrace::new(conversation_id);

        // 1. Reject degenerate input before anything is stored
        let text = text.trim();
        if text.is_empty() {
            let err = RelayError::EmptyMessage;
            trace.fail(&err);
            warn!("Ignoring empty inbound message");
            return Err(err);
        }
        trace.mark(TurnStage::Received);
        TurnEventLogger::log_event(
            conversation_id,
            trace.turn_id,
            TurnEvent::Message {
                role: Role::User.to_string(),
                content: text.to_string(),
            },
        );

        // 2. Persist the user message
        let handle = self
            .store
            .append(conversation_id, Role::User, text)
            .await
            .inspect_err(|e| trace.fail(e))?;
        trace.mark(TurnStage::Stored);

        // 3. Prior history, without the message just stored
        let mut history = self
            .store
            .fetch_recent(conversation_id, self.settings.history_window_size + 1)
            .await
            .inspect_err(|e| trace.fail(e))?;
        history.retain(|m| m.id != Some(handle.id));
        if history.len() > self.settings.history_window_size {
            history.drain(..history.len() - self.settings.history_window_size);
        }

        // 4. Apply the window budget
        let window = self
            .window_manager
            .process(conversation_id, history)
            .await
            .inspect_err(|e| trace.fail(e))?;
        trace.mark(TurnStage::WindowBuilt);

        // 5-6. Complete, degrading to the fixed reply
        let request = PromptBuilder::build(&self.settings, &window, text);
        let (reply, fallback_used) = match self.provider.complete(&request).await {
            Ok(response) if !response.content.trim().is_empty() => {
                info!(
                    provider = %response.provider,
                    tokens = response.tokens_used,
                    latency_ms = response.latency_ms,
                    "Completion succeeded"
                );
                trace.mark(TurnStage::Completed);
                (response.content.trim().to_string(), false)
            }
            outcome => {
                let err = match outcome {
                    Err(e) => RelayError::CompletionFailed(e.to_string()),
                    Ok(_) => RelayError::CompletionFailed("empty completion".into()),
                };
                warn!(error = %err, "Completion failed, using fallback reply");
                trace.fail(&err);
                trace.mark(TurnStage::FallbackReply);
                (self.settings.fallback_reply.clone(), true)
            }
        };

        // 7. Deliver
        if let Err(e) = self.outbound.send(conversation_id, &reply).await {
            let err = RelayError::SendFailed {
                to: redact_sensitive_data(conversation_id),
                reason: e.to_string(),
            };
            error!(error = %err, channel = self.outbound.name(), "Reply delivery failed");
            trace.mark(TurnStage::SendFailed);
            trace.fail(&err);
            return Err(err);
        }
        trace.mark(TurnStage::Sent);

        // 8. Record only what was actually delivered
        self.store
            .append(conversation_id, Role::Assistant, &reply)
            .await
            .inspect_err(|e| trace.fail(e))?;
        trace.mark(TurnStage::Logged);

        Ok(TurnOutcome {
            turn_id: trace.turn_id,
            conversation_id: conversation_id.to_string(),
            reply,
            summarized: window.summarized,
            fallback_used,
            stages: trace.stages,
        })
    }
}
