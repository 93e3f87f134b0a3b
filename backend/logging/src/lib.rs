//! Telemetry and structured logging components for ChatRelay.
//!
//! Handles log redaction, console/NDJSON output, file rotation, and per-turn event logging.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{TurnEvent, TurnEventEntry, TurnEventLogger};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;
