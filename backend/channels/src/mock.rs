use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tracing::info;

use crate::OutboundChannel;

/// Records outbound messages instead of delivering them. Used for dry runs
/// and tests; `failing()` makes every send fail.
pub struct MockSender {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl MockSender {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// `(to, body)` pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for MockSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutboundChannel for MockSender {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, to: &str, body: &str) -> Result<()> {
        if self.fail {
            bail!("mock delivery failure");
        }
        info!(chars = body.chars().count(), "[Mock] Would send reply");
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}
