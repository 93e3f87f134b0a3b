use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A single message in a conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Store-assigned id; `None` for synthetic messages that were never persisted.
    pub id: Option<i64>,
    pub sender: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// An unsaved message stamped with the current time.
    pub fn new(sender: Role, text: impl Into<String>) -> Self {
        Self {
            id: None,
            sender,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// `sender: text`, the line format used when serializing a dialog.
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.sender, self.text)
    }
}

/// Returned by a store after a successful append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHandle {
    pub id: i64,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
}

/// The rolling summary kept for a conversation. At most one per conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub conversation_id: String,
    pub summary_text: String,
    pub last_updated: DateTime<Utc>,
    /// Id of the newest message folded into the summary.
    pub covered_through: Option<i64>,
}

/// What will be sent to the completion service for one turn, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationWindow {
    pub messages: Vec<ChatMessage>,
    /// True when the leading message is a synthesized summary.
    pub summarized: bool,
}

impl ConversationWindow {
    pub fn raw(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            summarized: false,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
