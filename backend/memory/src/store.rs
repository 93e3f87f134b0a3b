use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use chatrelay_core::{ChatMessage, MessageHandle, RelayError, Role, SummaryRecord};

/// Abstract interface for conversation history storage.
///
/// Every failure surfaces as [`RelayError::StoreUnavailable`]; nothing is
/// retried here.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a message with a server-assigned timestamp.
    async fn append(
        &self,
        conversation_id: &str,
        sender: Role,
        text: &str,
    ) -> Result<MessageHandle, RelayError>;

    /// The `limit` most recent messages, oldest first.
    async fn fetch_recent(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RelayError>;

    async fn get_summary(&self, conversation_id: &str)
        -> Result<Option<SummaryRecord>, RelayError>;

    /// Upsert: replaces any previous summary for the conversation.
    /// `covered_through` is the id of the newest summarized message.
    async fn put_summary(
        &self,
        conversation_id: &str,
        summary_text: &str,
        timestamp: DateTime<Utc>,
        covered_through: Option<i64>,
    ) -> Result<(), RelayError>;
}

#[derive(Default)]
struct Conversation {
    messages: Vec<ChatMessage>,
    summary: Option<SummaryRecord>,
}

/// Simple in-memory history store for tests and `storage.backend: memory`.
pub struct InMemoryHistoryStore {
    conversations: Arc<RwLock<HashMap<String, Conversation>>>,
    next_id: Arc<RwLock<i64>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(RwLock::new(1)),
        }
    }

    /// Number of stored messages for a conversation.
    pub fn message_count(&self, conversation_id: &str) -> usize {
        self.conversations
            .read()
            .map(|c| c.get(conversation_id).map_or(0, |c| c.messages.len()))
            .unwrap_or(0)
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(
        &self,
        conversation_id: &str,
        sender: Role,
        text: &str,
    ) -> Result<MessageHandle, RelayError> {
        let mut conversations = self.conversations.write().map_err(RelayError::store)?;
        let mut next_id = self.next_id.write().map_err(RelayError::store)?;

        let conversation = conversations.entry(conversation_id.to_string()).or_default();
        let now = Utc::now();
        let timestamp = match conversation.messages.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };

        let id = *next_id;
        *next_id += 1;

        conversation.messages.push(ChatMessage {
            id: Some(id),
            sender,
            text: text.to_string(),
            timestamp,
        });

        Ok(MessageHandle {
            id,
            conversation_id: conversation_id.to_string(),
            timestamp,
        })
    }

    async fn fetch_recent(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RelayError> {
        let conversations = self.conversations.read().map_err(RelayError::store)?;
        let Some(conversation) = conversations.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let start = conversation.messages.len().saturating_sub(limit);
        Ok(conversation.messages[start..].to_vec())
    }

    async fn get_summary(
        &self,
        conversation_id: &str,
    ) -> Result<Option<SummaryRecord>, RelayError> {
        let conversations = self.conversations.read().map_err(RelayError::store)?;
        Ok(conversations
            .get(conversation_id)
            .and_then(|c| c.summary.clone()))
    }

    async fn put_summary(
        &self,
        conversation_id: &str,
        summary_text: &str,
        timestamp: DateTime<Utc>,
        covered_through: Option<i64>,
    ) -> Result<(), RelayError> {
        let mut conversations = self.conversations.write().map_err(RelayError::store)?;
        conversations
            .entry(conversation_id.to_string())
            .or_default()
            .summary = Some(SummaryRecord {
            conversation_id: conversation_id.to_string(),
            summary_text: summary_text.to_string(),
            last_updated: timestamp,
            covered_through,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_recent_returns_tail_oldest_first() {
        let store = InMemoryHistoryStore::new();
        for i in 0..5 {
            store
                .append("alice", Role::User, &format!("msg {i}"))
                .await
                .unwrap();
        }

        let window = store.fetch_recent("alice", 3).await.unwrap();
        let texts: Vec<_> = window.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["msg 2", "msg 3", "msg 4"]);
        assert!(window.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_empty() {
        let store = InMemoryHistoryStore::new();
        assert!(store.fetch_recent("nobody", 10).await.unwrap().is_empty());
        assert!(store.get_summary("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_appends_after_fetch_are_not_earlier() {
        let store = InMemoryHistoryStore::new();
        store.append("bob", Role::User, "first").await.unwrap();
        let fetched = store.fetch_recent("bob", 10).await.unwrap();
        let handle = store.append("bob", Role::Assistant, "second").await.unwrap();
        assert!(fetched.last().unwrap().timestamp <= handle.timestamp);
        assert!(handle.id > fetched.last().unwrap().id.unwrap());
    }

    #[tokio::test]
    async fn test_put_summary_overwrites() {
        let store = InMemoryHistoryStore::new();
        store.put_summary("carol", "first", Utc::now(), Some(1)).await.unwrap();
        store.put_summary("carol", "second", Utc::now(), Some(4)).await.unwrap();
        let summary = store.get_summary("carol").await.unwrap().unwrap();
        assert_eq!(summary.summary_text, "second");
        assert_eq!(summary.conversation_id, "carol");
        assert_eq!(summary.covered_through, Some(4));
    }

    #[tokio::test]
    async fn test_conversations_are_isolated() {
        let store = InMemoryHistoryStore::new();
        store.append("a", Role::User, "for a").await.unwrap();
        store.append("b", Role::User, "for b").await.unwrap();
        assert_eq!(store.message_count("a"), 1);
        assert_eq!(store.fetch_recent("b", 10).await.unwrap()[0].text, "for b");
    }
}
