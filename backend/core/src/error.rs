use thiserror::Error;

/// Top-level error type for the ChatRelay runtime.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("completion failed: {0}")]
    CompletionFailed(String),

    #[error("send to {to} failed: {reason}")]
    SendFailed { to: String, reason: String },

    #[error("inbound message is empty")]
    EmptyMessage,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RelayError {
    /// Wrap any displayable storage failure.
    pub fn store(err: impl std::fmt::Display) -> Self {
        RelayError::StoreUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_helper_wraps_message() {
        let err = RelayError::store("disk full");
        assert!(matches!(err, RelayError::StoreUnavailable(ref m) if m == "disk full"));
        assert_eq!(err.to_string(), "store unavailable: disk full");
    }

    #[test]
    fn send_failed_display_names_recipient() {
        let err = RelayError::SendFailed {
            to: "whatsapp:+15550001111".into(),
            reason: "401".into(),
        };
        assert_eq!(err.to_string(), "send to whatsapp:+15550001111 failed: 401");
    }
}
