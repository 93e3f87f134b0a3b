//! Turn Event Logger
//!
//! Structured per-turn events (stage transitions, messages, errors) emitted on
//! the `turn_events` tracing target, which the file layer writes as NDJSON.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use chatrelay_core::TurnStage;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    Stage {
        stage: TurnStage,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Message {
        role: String,
        content: String,
    },
    Error {
        error_msg: String,
    },
}

#[derive(Debug, Serialize)]
pub struct TurnEventEntry {
    pub conversation_id: String,
    pub turn_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: TurnEvent,
}

pub struct TurnEventLogger;

impl TurnEventLogger {
    /// Redact and emit one turn event.
    pub fn log_event(conversation_id: &str, turn_id: Uuid, mut event: TurnEvent) {
        match &mut event {
            TurnEvent::Stage { detail, .. } => {
                if let Some(detail) = detail {
                    *detail = redact_sensitive_data(detail);
                }
            }
            TurnEvent::Message { content, .. } => {
                *content = redact_sensitive_data(content);
            }
            TurnEvent::Error { error_msg } => {
                *error_msg = redact_sensitive_data(error_msg);
            }
        }

        let entry = Self::entry(conversation_id, turn_id, event);
        let json = serde_json::to_string(&entry).unwrap_or_default();
        info!(target: "turn_events", event = %json, "Turn event");
    }

    pub fn stage(conversation_id: &str, turn_id: Uuid, stage: TurnStage) {
        Self::log_event(conversation_id, turn_id, TurnEvent::Stage { stage, detail: None });
    }

    pub fn error(conversation_id: &str, turn_id: Uuid, error_msg: impl Into<String>) {
        Self::log_event(
            conversation_id,
            turn_id,
            TurnEvent::Error {
                error_msg: error_msg.into(),
            },
        );
    }

    fn entry(conversation_id: &str, turn_id: Uuid, event: TurnEvent) -> TurnEventEntry {
        TurnEventEntry {
            conversation_id: redact_sensitive_data(conversation_id),
            turn_id,
            timestamp: Utc::now(),
            event,
        }
    }
}
