use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Linear stages a conversation turn moves through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    /// Inbound text accepted
    Received,
    /// User message appended to history
    Stored,
    /// Effective window computed
    WindowBuilt,
    /// Completion service produced a reply
    Completed,
    /// Completion failed; fixed fallback reply substituted
    FallbackReply,
    /// Reply delivered to the sender
    Sent,
    /// Delivery failed
    SendFailed,
    /// Assistant reply appended to history
    Logged,
}

impl std::fmt::Display for TurnStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| format!("{:?}", self));
        write!(f, "{}", s)
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub turn_id: Uuid,
    pub conversation_id: String,
    pub reply: String,
    /// A summary was spliced into the window this turn.
    pub summarized: bool,
    /// The fixed fallback reply was used instead of a completion.
    pub fallback_used: bool,
    pub stages: Vec<TurnStage>,
}
