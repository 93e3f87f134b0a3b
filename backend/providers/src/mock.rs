use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chatrelay_core::{LlmProvider, LlmRequest, LlmResponse};

/// A mock completion provider with canned or scripted responses.
///
/// Records every request it receives so tests can inspect prompts.
pub struct MockProvider {
    name: String,
    fixed_response: Option<String>,
    always_fail: Option<String>,
    script: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<LlmRequest>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fixed_response: None,
            always_fail: None,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.fixed_response = Some(response.into());
        self
    }

    /// Every call fails with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.always_fail = Some(message.into());
        self
    }

    /// Responses consumed in order; `Err` entries fail that call. Once the
    /// script runs out the fixed response is used.
    pub fn with_script<I>(self, script: I) -> Self
    where
        I: IntoIterator<Item = Result<String, String>>,
    {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(script);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Highest number of overlapping `complete` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_result(&self) -> Result<String> {
        if let Some(message) = &self.always_fail {
            return Err(anyhow!(message.clone()));
        }
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match scripted {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(self
                .fixed_response
                .clone()
                .unwrap_or_else(|| "Mock response".to_string())),
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, req: &LlmRequest) -> Result<LlmResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(req.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let content = self.next_result()?;
        Ok(LlmResponse {
            content,
            provider: self.name.clone(),
            model: "mock".to_string(),
            tokens_used: 0,
            latency_ms: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> LlmRequest {
        LlmRequest {
            model: "m".into(),
            system_prompt: String::new(),
            turns: vec![],
            max_tokens: 10,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_script_then_fixed() {
        let provider = MockProvider::new("mock")
            .with_response("fixed")
            .with_script([Ok("first".to_string()), Err("boom".to_string())]);

        assert_eq!(provider.complete(&req()).await.unwrap().content, "first");
        assert!(provider.complete(&req()).await.is_err());
        assert_eq!(provider.complete(&req()).await.unwrap().content, "fixed");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failing_always_errors() {
        let provider = MockProvider::new("mock").failing("down");
        let err = provider.complete(&req()).await.unwrap_err();
        assert_eq!(err.to_string(), "down");
    }
}
