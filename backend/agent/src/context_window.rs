//! Context window budgeting and summarization.
//!
//! A fetched window whose estimated size stays within the threshold passes
//! through untouched. Above it, the whole window is summarized in one
//! completion call and the effective window becomes the summary followed by
//! the last few raw messages. Summarization failures fail open.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use chatrelay_core::{
    CharRatioEstimator, ChatMessage, ChatTurn, ConversationWindow, LlmProvider, LlmRequest,
    RelayError, Role, SummaryRecord, TokenEstimator,
};
use chatrelay_memory::HistoryStore;

/// Prefix of the synthetic system message carrying a summary.
pub const SUMMARY_LABEL: &str = "Summary: ";

/// Budget settings for one conversation window.
#[derive(Debug, Clone)]
pub struct WindowPolicy {
    /// Estimated tokens above which the window is summarized.
    pub summary_token_threshold: usize,
    /// Ceiling handed to the summarization call.
    pub summary_max_tokens: u32,
    /// Raw messages kept verbatim after the summary.
    pub keep_recent: usize,
    pub model: String,
    pub temperature: f32,
    /// Extend the stored summary with newer messages instead of
    /// re-summarizing the whole window.
    pub incremental: bool,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            summary_token_threshold: 2000,
            summary_max_tokens: 300,
            keep_recent: 3,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            incremental: false,
        }
    }
}

pub struct WindowManager {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn HistoryStore>,
    estimator: Arc<dyn TokenEstimator>,
    policy: WindowPolicy,
}

impl WindowManager {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn HistoryStore>,
        policy: WindowPolicy,
    ) -> Self {
        Self {
            provider,
            store,
            estimator: Arc::new(CharRatioEstimator::default()),
            policy,
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Approximate token cost of a sequence of messages.
    pub fn estimate(&self, messages: &[ChatMessage]) -> usize {
        messages.iter().map(|m| self.estimator.estimate(&m.text)).sum()
    }

    /// Turn a fetched window into the window sent to the completion service.
    ///
    /// Only store failures are returned as errors.
    pub async fn process(
        &self,
        conversation_id: &str,
        fetched: Vec<ChatMessage>,
    ) -> Result<ConversationWindow, RelayError> {
        let total = self.estimate(&fetched);
        if total <= self.policy.summary_token_threshold {
            debug!(total, messages = fetched.len(), "Window within budget");
            return Ok(ConversationWindow::raw(fetched));
        }

        info!(
            total,
            threshold = self.policy.summary_token_threshold,
            messages = fetched.len(),
            "Window over budget, summarizing"
        );

        let prior = if self.policy.incremental {
            self.store.get_summary(conversation_id).await?
        } else {
            None
        };

        let summary = match self.summarize(&fetched, prior.as_ref()).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Summarization failed, using raw window");
                return Ok(ConversationWindow::raw(fetched));
            }
        };

        let covered_until = fetched.last().map_or_else(Utc::now, |m| m.timestamp);
        let covered_through = fetched.iter().rev().find_map(|m| m.id);
        self.store
            .put_summary(conversation_id, &summary, covered_until, covered_through)
            .await?;

        let keep_from = fetched.len().saturating_sub(self.policy.keep_recent);
        let summary_timestamp = fetched
            .get(keep_from)
            .map_or(covered_until, |m| m.timestamp);

        let mut messages = Vec::with_capacity(1 + fetched.len() - keep_from);
        messages.push(ChatMessage {
            id: None,
            sender: Role::System,
            text: format!("{SUMMARY_LABEL}{summary}"),
            timestamp: summary_timestamp,
        });
        messages.extend(fetched.into_iter().skip(keep_from));

        Ok(ConversationWindow {
            messages,
            summarized: true,
        })
    }

    async fn summarize(
        &self,
        fetched: &[ChatMessage],
        prior: Option<&SummaryRecord>,
    ) -> Result<String, RelayError> {
        let request = self.summary_request(fetched, prior);
        let response = self
            .provider
            .complete(&request)
            .await
            .map_err(|e| RelayError::SummarizationFailed(e.to_string()))?;

        let summary = response.content.trim();
        if summary.is_empty() {
            return Err(RelayError::SummarizationFailed(
                "provider returned an empty summary".into(),
            ));
        }
        Ok(summary.to_string())
    }

    /// One user turn holding the dialog as `sender: text` lines, oldest first.
    fn summary_request(
        &self,
        fetched: &[ChatMessage],
        prior: Option<&SummaryRecord>,
    ) -> LlmRequest {
        let mut lines = Vec::with_capacity(fetched.len() + 1);
        match prior {
            Some(prior) => {
                lines.push(format!("Previous summary: {}", prior.summary_text));
                lines.extend(
                    fetched
                        .iter()
                        .filter(|m| not_yet_summarized(m, prior))
                        .map(ChatMessage::transcript_line),
                );
            }
            None => lines.extend(fetched.iter().map(ChatMessage::transcript_line)),
        }

        LlmRequest {
            model: self.policy.model.clone(),
            system_prompt: format!(
                "Summarize the following dialog in no more than {} tokens. \
                 Keep names, facts, decisions and open questions. \
                 Reply with the summary only.",
                self.policy.summary_max_tokens
            ),
            turns: vec![ChatTurn::new(Role::User, lines.join("\n"))],
            max_tokens: self.policy.summary_max_tokens,
            temperature: self.policy.temperature,
        }
    }
}

/// Coverage is tracked by message id. Summaries stored without one fall back
/// to the timestamp, keeping ties so no message is dropped.
fn not_yet_summarized(message: &ChatMessage, prior: &SummaryRecord) -> bool {
    match (message.id, prior.covered_through) {
        (Some(id), Some(covered)) => id > covered,
        _ => message.timestamp >= prior.last_updated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatrelay_memory::{InMemoryHistoryStore, SqliteHistoryStore};
    use chatrelay_providers::MockProvider;

    const CONV: &str = "whatsapp:+15550001111";

    /// Ten alternating messages of 1000 chars each: 2500 estimated tokens.
    async fn seed_long_history(store: &InMemoryHistoryStore) -> Vec<ChatMessage> {
        for i in 0..10 {
            let sender = if i % 2 == 0 { Role::User } else { Role::Assistant };
            let text = format!("{i}{}", "x".repeat(999));
            store.append(CONV, sender, &text).await.unwrap();
        }
        store.fetch_recent(CONV, 10).await.unwrap()
    }

    fn manager(provider: Arc<MockProvider>, store: Arc<InMemoryHistoryStore>) -> WindowManager {
        WindowManager::new(provider, store, WindowPolicy::default())
    }

    fn incremental() -> WindowPolicy {
        WindowPolicy {
            incremental: true,
            ..WindowPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_under_budget_is_unchanged() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let provider = Arc::new(MockProvider::new("mock"));
        store.append(CONV, Role::User, "hello").await.unwrap();
        store.append(CONV, Role::Assistant, "hi").await.unwrap();
        let fetched = store.fetch_recent(CONV, 10).await.unwrap();

        let window = manager(provider.clone(), store.clone())
            .process(CONV, fetched.clone())
            .await
            .unwrap();

        assert_eq!(window.messages, fetched);
        assert!(!window.summarized);
        assert_eq!(provider.call_count(), 0);
        assert!(store.get_summary(CONV).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_over_budget_summarizes_once_and_keeps_tail() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let provider = Arc::new(MockProvider::new("mock").with_response("X"));
        let fetched = seed_long_history(&store).await;

        let manager = manager(provider.clone(), store.clone());
        assert_eq!(manager.estimate(&fetched), 2500);
        let window = manager.process(CONV, fetched.clone()).await.unwrap();

        assert_eq!(provider.call_count(), 1);
        assert!(window.summarized);
        assert_eq!(window.len(), 1 + 3);
        assert_eq!(window.messages[0].sender, Role::System);
        assert_eq!(window.messages[0].text, "Summary: X");
        assert_eq!(&window.messages[1..], &fetched[7..]);
        assert!(window.messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let stored = store.get_summary(CONV).await.unwrap().unwrap();
        assert_eq!(stored.summary_text, "X");
        assert_eq!(stored.last_updated, fetched[9].timestamp);
        assert_eq!(stored.covered_through, fetched[9].id);
    }

    #[tokio::test]
    async fn test_summary_request_serializes_whole_window_oldest_first() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let provider = Arc::new(MockProvider::new("mock").with_response("X"));
        let fetched = seed_long_history(&store).await;

        manager(provider.clone(), store).process(CONV, fetched).await.unwrap();

        let request = &provider.requests()[0];
        assert_eq!(request.max_tokens, 300);
        assert!(request.system_prompt.contains("300 tokens"));
        assert_eq!(request.turns.len(), 1);
        let lines: Vec<_> = request.turns[0].content.lines().collect();
        assert_eq!(lines.len(), 10);
        assert!(lines[0].starts_with("user: 0x"));
        assert!(lines[9].starts_with("assistant: 9x"));
    }

    #[tokio::test]
    async fn test_short_window_over_budget_keeps_everything() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let provider = Arc::new(MockProvider::new("mock").with_response("gist"));
        store.append(CONV, Role::User, &"y".repeat(9000)).await.unwrap();
        store.append(CONV, Role::Assistant, "ok").await.unwrap();
        let fetched = store.fetch_recent(CONV, 10).await.unwrap();

        let window = manager(provider, store).process(CONV, fetched).await.unwrap();
        assert_eq!(window.len(), 1 + 2);
    }

    #[tokio::test]
    async fn test_summarization_failure_fails_open() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let provider = Arc::new(MockProvider::new("mock").failing("upstream 500"));
        let fetched = seed_long_history(&store).await;

        let window = manager(provider.clone(), store.clone())
            .process(CONV, fetched.clone())
            .await
            .unwrap();

        assert_eq!(window, ConversationWindow::raw(fetched));
        assert_eq!(provider.call_count(), 1);
        assert!(store.get_summary(CONV).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_summary_fails_open() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let provider = Arc::new(MockProvider::new("mock").with_response("   "));
        let fetched = seed_long_history(&store).await;

        let window = manager(provider, store).process(CONV, fetched.clone()).await.unwrap();
        assert!(!window.summarized);
        assert_eq!(window.messages, fetched);
    }

    #[tokio::test]
    async fn test_incremental_summary_only_sends_new_messages() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let provider = Arc::new(MockProvider::new("mock").with_response("merged"));
        let fetched = seed_long_history(&store).await;
        store
            .put_summary(CONV, "earlier gist", fetched[5].timestamp, fetched[5].id)
            .await
            .unwrap();

        let manager = WindowManager::new(provider.clone(), store.clone(), incremental());
        let window = manager.process(CONV, fetched.clone()).await.unwrap();

        assert_eq!(window.messages[0].text, "Summary: merged");
        let content = &provider.requests()[0].turns[0].content;
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "Previous summary: earlier gist");
        assert_eq!(lines.len(), 1 + 4);
        assert!(lines[1].starts_with("assistant: 6x"));
        assert!(lines[4].starts_with("assistant: 9x"));

        let stored = store.get_summary(CONV).await.unwrap().unwrap();
        assert_eq!(stored.covered_through, fetched[9].id);
    }

    #[tokio::test]
    async fn test_incremental_summary_keeps_messages_sharing_a_timestamp() {
        // SQLite keeps millisecond timestamps, so a burst of appends ties.
        let store = Arc::new(SqliteHistoryStore::in_memory().unwrap());
        let provider = Arc::new(MockProvider::new("mock").with_response("merged"));
        for i in 0..10 {
            let text = format!("{i}{}", "x".repeat(999));
            store.append(CONV, Role::User, &text).await.unwrap();
        }
        let mut fetched = store.fetch_recent(CONV, 10).await.unwrap();
        let shared = fetched[5].timestamp;
        for message in &mut fetched {
            message.timestamp = shared;
        }
        store
            .put_summary(CONV, "earlier gist", shared, fetched[5].id)
            .await
            .unwrap();

        WindowManager::new(provider.clone(), store, incremental())
            .process(CONV, fetched)
            .await
            .unwrap();

        let content = &provider.requests()[0].turns[0].content;
        let lines: Vec<_> = content.lines().skip(1).collect();
        let leading: Vec<_> = lines.iter().map(|l| &l[6..7]).collect();
        assert_eq!(leading, vec!["6", "7", "8", "9"]);
    }

    #[tokio::test]
    async fn test_incremental_summary_without_coverage_keeps_ties() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let provider = Arc::new(MockProvider::new("mock").with_response("merged"));
        let fetched = seed_long_history(&store).await;
        store
            .put_summary(CONV, "earlier gist", fetched[5].timestamp, None)
            .await
            .unwrap();

        WindowManager::new(provider.clone(), store, incremental())
            .process(CONV, fetched.clone())
            .await
            .unwrap();

        let content = &provider.requests()[0].turns[0].content;
        let kept = fetched
            .iter()
            .filter(|m| m.timestamp >= fetched[5].timestamp)
            .count();
        assert!(kept >= 5);
        assert_eq!(content.lines().count(), 1 + kept);
    }

    #[tokio::test]
    async fn test_custom_estimator_controls_threshold() {
        struct WordCount;
        impl TokenEstimator for WordCount {
            fn estimate(&self, text: &str) -> usize {
                text.split_whitespace().count()
            }
        }

        let store = Arc::new(InMemoryHistoryStore::new());
        let provider = Arc::new(MockProvider::new("mock").with_response("short"));
        store.append(CONV, Role::User, "one two three").await.unwrap();
        let fetched = store.fetch_recent(CONV, 10).await.unwrap();

        let policy = WindowPolicy {
            summary_token_threshold: 2,
            ..WindowPolicy::default()
        };
        let window = WindowManager::new(provider.clone(), store, policy)
            .with_estimator(Arc::new(WordCount))
            .process(CONV, fetched)
            .await
            .unwrap();
        assert!(window.summarized);
        assert_eq!(provider.call_count(), 1);
    }
}
